use image::{GrayImage, Luma, imageops};
use kurbo::Point;

use crate::foundation::error::{MatteError, MatteResult};

/// Fill every pixel whose center lies within `radius` of `center` with `value`.
pub fn stamp_disk(mask: &mut GrayImage, center: Point, radius: u32, value: u8) {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let r = f64::from(radius);
    let r2 = r * r;
    let x0 = (center.x - r).floor().max(0.0) as u32;
    let y0 = (center.y - r).floor().max(0.0) as u32;
    let x1 = ((center.x + r).ceil().max(0.0) as u32).min(w - 1);
    let y1 = ((center.y + r).ceil().max(0.0) as u32).min(h - 1);
    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = f64::from(x) - center.x;
            let dy = f64::from(y) - center.y;
            if dx * dx + dy * dy <= r2 {
                mask.put_pixel(x, y, Luma([value]));
            }
        }
    }
}

/// Rasterize an open polyline `thickness` pixels wide with round joins and caps.
///
/// A single point renders as a dot of the same width.
pub fn draw_thick_polyline(mask: &mut GrayImage, points: &[Point], thickness: u32, value: u8) {
    let half = f64::from(thickness.max(1)) / 2.0;
    match points {
        [] => {}
        [p] => stamp_disk(mask, *p, half.round() as u32, value),
        _ => {
            for seg in points.windows(2) {
                draw_capsule(mask, seg[0], seg[1], half, value);
            }
        }
    }
}

fn draw_capsule(mask: &mut GrayImage, a: Point, b: Point, half: f64, value: u8) {
    let (w, h) = mask.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let x0 = (a.x.min(b.x) - half).floor().max(0.0) as u32;
    let y0 = (a.y.min(b.y) - half).floor().max(0.0) as u32;
    let x1 = ((a.x.max(b.x) + half).ceil().max(0.0) as u32).min(w - 1);
    let y1 = ((a.y.max(b.y) + half).ceil().max(0.0) as u32).min(h - 1);
    let ab = b - a;
    let len2 = ab.hypot2();
    let half2 = half * half;
    for y in y0..=y1 {
        for x in x0..=x1 {
            let p = Point::new(f64::from(x), f64::from(y));
            let t = if len2 > 0.0 {
                ((p - a).dot(ab) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let closest = a + ab * t;
            if (p - closest).hypot2() <= half2 {
                mask.put_pixel(x, y, Luma([value]));
            }
        }
    }
}

/// Nearest-neighbor resize; keeps a boolean mask boolean.
pub fn resize_nearest(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    imageops::resize(mask, width, height, imageops::FilterType::Nearest)
}

/// `dst |= src`, byte-wise.
pub fn union_into(dst: &mut GrayImage, src: &GrayImage) -> MatteResult<()> {
    if dst.dimensions() != src.dimensions() {
        return Err(MatteError::validation(format!(
            "mask union size mismatch: {:?} vs {:?}",
            dst.dimensions(),
            src.dimensions()
        )));
    }
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d |= *s;
    }
    Ok(())
}

/// Per-pixel max, for soft mattes where OR would corrupt intermediate values.
pub fn max_into(dst: &mut GrayImage, src: &GrayImage) -> MatteResult<()> {
    if dst.dimensions() != src.dimensions() {
        return Err(MatteError::validation(format!(
            "mask max size mismatch: {:?} vs {:?}",
            dst.dimensions(),
            src.dimensions()
        )));
    }
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d = (*d).max(*s);
    }
    Ok(())
}

pub fn count_nonzero(mask: &GrayImage) -> usize {
    mask.iter().filter(|&&v| v != 0).count()
}
