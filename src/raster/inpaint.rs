//! Fast-marching hole filling (Telea-style).
//!
//! Masked pixels are reconstructed from the boundary inward, in order of their distance to the
//! known region. Each pixel is a weighted average of already-known pixels within `radius`,
//! weighted by direction (alignment with the distance gradient), geometric distance and level-set
//! distance.

use std::{cmp::Ordering, collections::BinaryHeap};

use image::{GrayImage, RgbImage};

use crate::foundation::error::{MatteError, MatteResult};

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Known,
    Band,
    Inside,
}

#[derive(Clone, Copy, PartialEq)]
struct Entry {
    t: f32,
    idx: usize,
}

impl Eq for Entry {}

impl Ord for Entry {
    // Min-heap on arrival time.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

const FAR: f32 = 1.0e6;

/// Reconstruct every pixel where `mask != 0`, returning a new frame.
pub fn inpaint(frame: &RgbImage, mask: &GrayImage, radius: u32) -> MatteResult<RgbImage> {
    if frame.dimensions() != mask.dimensions() {
        return Err(MatteError::validation(format!(
            "inpaint mask is {:?} but frame is {:?}",
            mask.dimensions(),
            frame.dimensions()
        )));
    }
    let (w, h) = frame.dimensions();
    let (wu, hu) = (w as usize, h as usize);
    let mut out = frame.clone();
    if w == 0 || h == 0 {
        return Ok(out);
    }

    let mut state = vec![State::Known; wu * hu];
    let mut t = vec![0.0f32; wu * hu];
    for (i, &m) in mask.as_raw().iter().enumerate() {
        if m != 0 {
            state[i] = State::Inside;
            t[i] = FAR;
        }
    }
    if !state.contains(&State::Inside) {
        return Ok(out);
    }

    let neighbors = |idx: usize| {
        let x = idx % wu;
        let y = idx / wu;
        let mut n = [None; 4];
        if x > 0 {
            n[0] = Some(idx - 1);
        }
        if x + 1 < wu {
            n[1] = Some(idx + 1);
        }
        if y > 0 {
            n[2] = Some(idx - wu);
        }
        if y + 1 < hu {
            n[3] = Some(idx + wu);
        }
        n
    };

    // Known pixels touching the hole form the initial narrow band.
    let mut heap = BinaryHeap::new();
    for idx in 0..wu * hu {
        if state[idx] != State::Known {
            continue;
        }
        let touches_hole = neighbors(idx)
            .iter()
            .flatten()
            .any(|&n| state[n] == State::Inside);
        if touches_hole {
            state[idx] = State::Band;
            heap.push(Entry { t: 0.0, idx });
        }
    }

    let radius = radius.max(1) as i64;
    while let Some(Entry { idx, .. }) = heap.pop() {
        if state[idx] == State::Known {
            continue;
        }
        state[idx] = State::Known;

        for n in neighbors(idx).into_iter().flatten() {
            if state[n] != State::Inside {
                continue;
            }
            let nx = n % wu;
            let ny = n / wu;
            let arrival = solve_eikonal(&t, &state, wu, hu, nx, ny);
            t[n] = arrival;
            fill_pixel(&mut out, &t, &state, nx, ny, radius);
            state[n] = State::Band;
            heap.push(Entry { t: arrival, idx: n });
        }
    }

    Ok(out)
}

fn solve_pair(t: &[f32], state: &[State], a: Option<usize>, b: Option<usize>) -> f32 {
    let known = |i: Option<usize>| i.filter(|&i| state[i] != State::Inside).map(|i| t[i]);
    match (known(a), known(b)) {
        (Some(ta), Some(tb)) => {
            let d = 2.0 - (ta - tb) * (ta - tb);
            if d > 0.0 {
                let r = d.sqrt();
                let s = ((ta + tb) - r) * 0.5;
                let s = if s >= ta && s >= tb { s } else { ((ta + tb) + r) * 0.5 };
                if s >= ta && s >= tb { s } else { ta.min(tb) + 1.0 }
            } else {
                ta.min(tb) + 1.0
            }
        }
        (Some(ta), None) => ta + 1.0,
        (None, Some(tb)) => tb + 1.0,
        (None, None) => FAR,
    }
}

fn solve_eikonal(t: &[f32], state: &[State], w: usize, h: usize, x: usize, y: usize) -> f32 {
    let idx = y * w + x;
    let left = (x > 0).then(|| idx - 1);
    let right = (x + 1 < w).then(|| idx + 1);
    let up = (y > 0).then(|| idx - w);
    let down = (y + 1 < h).then(|| idx + w);
    [
        solve_pair(t, state, up, left),
        solve_pair(t, state, down, left),
        solve_pair(t, state, up, right),
        solve_pair(t, state, down, right),
    ]
    .into_iter()
    .fold(FAR, f32::min)
}

fn arrival_gradient(
    t: &[f32],
    state: &[State],
    w: usize,
    h: usize,
    x: usize,
    y: usize,
) -> (f32, f32) {
    let idx = y * w + x;
    let usable = |i: usize| state[i] != State::Inside;
    let center = t[idx];
    let gx = match (x > 0 && usable(idx - 1), x + 1 < w && usable(idx + 1)) {
        (true, true) => (t[idx + 1] - t[idx - 1]) * 0.5,
        (true, false) => center - t[idx - 1],
        (false, true) => t[idx + 1] - center,
        (false, false) => 0.0,
    };
    let gy = match (y > 0 && usable(idx - w), y + 1 < h && usable(idx + w)) {
        (true, true) => (t[idx + w] - t[idx - w]) * 0.5,
        (true, false) => center - t[idx - w],
        (false, true) => t[idx + w] - center,
        (false, false) => 0.0,
    };
    (gx, gy)
}

fn fill_pixel(out: &mut RgbImage, t: &[f32], state: &[State], x: usize, y: usize, radius: i64) {
    let (w, h) = (out.width() as usize, out.height() as usize);
    let (grad_x, grad_y) = arrival_gradient(t, state, w, h, x, y);
    let t_here = t[y * w + x];

    let mut acc = [0.0f32; 3];
    let mut total = 0.0f32;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let kx = x as i64 + dx;
            let ky = y as i64 + dy;
            if kx < 0 || ky < 0 || kx >= w as i64 || ky >= h as i64 {
                continue;
            }
            let k = ky as usize * w + kx as usize;
            if state[k] == State::Inside || (dx == 0 && dy == 0) {
                continue;
            }
            // r points from the neighbor towards the pixel being filled.
            let rx = -(dx as f32);
            let ry = -(dy as f32);
            let len2 = rx * rx + ry * ry;
            let len = len2.sqrt();
            let dir = ((rx * grad_x + ry * grad_y) / len).abs().max(1e-6);
            let dst = 1.0 / len2;
            let lev = 1.0 / (1.0 + (t[k] - t_here).abs());
            let weight = dir * dst * lev;
            let px = out.get_pixel(kx as u32, ky as u32).0;
            for c in 0..3 {
                acc[c] += weight * f32::from(px[c]);
            }
            total += weight;
        }
    }

    if total > 0.0 {
        let px = out.get_pixel_mut(x as u32, y as u32);
        for c in 0..3 {
            px.0[c] = (acc[c] / total).round().clamp(0.0, 255.0) as u8;
        }
    }
}
