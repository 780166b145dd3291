//! Sparse pyramidal Lucas-Kanade optical flow.

use image::RgbImage;
use kurbo::{Point, Vec2};

/// Intensity plane in `[0,255]` used for flow estimation.
#[derive(Clone, Debug)]
pub struct GrayPlane {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl GrayPlane {
    pub fn from_rgb(frame: &RgbImage) -> Self {
        let data = frame
            .pixels()
            .map(|p| 0.299 * f32::from(p[0]) + 0.587 * f32::from(p[1]) + 0.114 * f32::from(p[2]))
            .collect();
        Self {
            width: frame.width(),
            height: frame.height(),
            data,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn at(&self, x: i64, y: i64) -> f32 {
        let x = x.clamp(0, i64::from(self.width) - 1) as usize;
        let y = y.clamp(0, i64::from(self.height) - 1) as usize;
        self.data[y * self.width as usize + x]
    }

    /// Bilinear sample with edge replication.
    fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as i64, y0 as i64);
        let a = self.at(xi, yi);
        let b = self.at(xi + 1, yi);
        let c = self.at(xi, yi + 1);
        let d = self.at(xi + 1, yi + 1);
        (a * (1.0 - fx) + b * fx) * (1.0 - fy) + (c * (1.0 - fx) + d * fx) * fy
    }

    fn gradient(&self, x: f32, y: f32) -> (f32, f32) {
        let gx = (self.sample(x + 1.0, y) - self.sample(x - 1.0, y)) * 0.5;
        let gy = (self.sample(x, y + 1.0) - self.sample(x, y - 1.0)) * 0.5;
        (gx, gy)
    }

    /// Half-resolution plane (2x2 box average).
    fn downsample(&self) -> Self {
        let width = self.width.div_ceil(2).max(1);
        let height = self.height.div_ceil(2).max(1);
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..i64::from(height) {
            for x in 0..i64::from(width) {
                let sum = self.at(2 * x, 2 * y)
                    + self.at(2 * x + 1, 2 * y)
                    + self.at(2 * x, 2 * y + 1)
                    + self.at(2 * x + 1, 2 * y + 1);
                data.push(sum * 0.25);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }
}

/// Image pyramid, level 0 at full resolution.
#[derive(Clone, Debug)]
pub struct Pyramid {
    levels: Vec<GrayPlane>,
}

impl Pyramid {
    pub fn build(frame: &RgbImage, extra_levels: u32) -> Self {
        let mut levels = vec![GrayPlane::from_rgb(frame)];
        for _ in 0..extra_levels {
            let Some(last) = levels.last() else { break };
            if last.width < 8 || last.height < 8 {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn base(&self) -> &GrayPlane {
        &self.levels[0]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowParams {
    /// Window edge length in pixels (odd values center the window).
    pub window: u32,
    pub levels: u32,
    pub max_iterations: u32,
    pub epsilon: f32,
    /// Minimum eigenvalue of the structure tensor per window pixel; below it the point is lost.
    pub min_eigen: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            window: 15,
            levels: 2,
            max_iterations: 10,
            epsilon: 0.03,
            min_eigen: 1e-3,
        }
    }
}

/// Track `points` from `prev` into `next`; `None` marks a point whose flow status is false.
pub fn track_points(
    prev: &Pyramid,
    next: &Pyramid,
    points: &[Point],
    params: &FlowParams,
) -> Vec<Option<Point>> {
    points
        .iter()
        .map(|&p| track_one(prev, next, p, params))
        .collect()
}

fn track_one(prev: &Pyramid, next: &Pyramid, p: Point, params: &FlowParams) -> Option<Point> {
    let top = prev.levels.len().min(next.levels.len());
    if top == 0 {
        return None;
    }
    let half = (params.window / 2).max(1) as i32;
    let area = ((2 * half + 1) * (2 * half + 1)) as f32;
    let mut guess = Vec2::ZERO;

    for level in (0..top).rev() {
        let scale = f64::from(1u32 << level);
        let i_plane = &prev.levels[level];
        let j_plane = &next.levels[level];
        let center = (p.x / scale, p.y / scale);

        let mut samples = Vec::with_capacity(area as usize);
        let (mut gxx, mut gxy, mut gyy) = (0.0f32, 0.0f32, 0.0f32);
        for dy in -half..=half {
            for dx in -half..=half {
                let x = center.0 as f32 + dx as f32;
                let y = center.1 as f32 + dy as f32;
                let (ix, iy) = i_plane.gradient(x, y);
                gxx += ix * ix;
                gxy += ix * iy;
                gyy += iy * iy;
                samples.push((x, y, i_plane.sample(x, y), ix, iy));
            }
        }

        let trace = gxx + gyy;
        let disc = ((gxx - gyy) * (gxx - gyy) + 4.0 * gxy * gxy).sqrt();
        let min_eig = (trace - disc) * 0.5 / area;
        let det = gxx * gyy - gxy * gxy;
        if min_eig < params.min_eigen || det.abs() < f32::EPSILON {
            return None;
        }

        let mut v = Vec2::ZERO;
        for _ in 0..params.max_iterations {
            let (mut bx, mut by) = (0.0f32, 0.0f32);
            let off = guess + v;
            for &(x, y, i_val, ix, iy) in &samples {
                let diff = i_val - j_plane.sample(x + off.x as f32, y + off.y as f32);
                bx += diff * ix;
                by += diff * iy;
            }
            let eta_x = (gyy * bx - gxy * by) / det;
            let eta_y = (gxx * by - gxy * bx) / det;
            v += Vec2::new(f64::from(eta_x), f64::from(eta_y));
            if eta_x * eta_x + eta_y * eta_y < params.epsilon * params.epsilon {
                break;
            }
        }

        if level > 0 {
            guess = (guess + v) * 2.0;
        } else {
            guess += v;
        }
    }

    let out = p + guess;
    let (w, h) = prev.base().dimensions();
    if !out.x.is_finite()
        || !out.y.is_finite()
        || out.x < 0.0
        || out.y < 0.0
        || out.x > f64::from(w) - 1.0
        || out.y > f64::from(h) - 1.0
    {
        return None;
    }
    Some(out)
}

#[cfg(test)]
#[path = "../../tests/unit/raster/flow.rs"]
mod tests;
