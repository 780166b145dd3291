use std::collections::VecDeque;

use image::{GrayImage, Luma, RgbImage};

/// 4-connected fixed-range flood fill seeded at `(seed_x, seed_y)`.
///
/// Every candidate is compared against the seed color (not its neighbor), so the selection
/// cannot drift across a slow gradient. Selected pixels are 255 in the returned mask; an
/// out-of-bounds seed yields an empty mask.
pub fn flood_select(frame: &RgbImage, seed_x: u32, seed_y: u32, tolerance: u8) -> GrayImage {
    let (w, h) = frame.dimensions();
    let mut out = GrayImage::new(w, h);
    if seed_x >= w || seed_y >= h {
        return out;
    }

    let seed = frame.get_pixel(seed_x, seed_y).0;
    let within = |x: u32, y: u32| {
        let px = frame.get_pixel(x, y).0;
        px.iter()
            .zip(seed.iter())
            .all(|(&c, &s)| c.abs_diff(s) <= tolerance)
    };

    let mut queue = VecDeque::new();
    out.put_pixel(seed_x, seed_y, Luma([255]));
    queue.push_back((seed_x, seed_y));

    while let Some((x, y)) = queue.pop_front() {
        let neighbors = [
            (x.checked_sub(1), Some(y)),
            ((x + 1 < w).then_some(x + 1), Some(y)),
            (Some(x), y.checked_sub(1)),
            (Some(x), (y + 1 < h).then_some(y + 1)),
        ];
        for (nx, ny) in neighbors {
            let (Some(nx), Some(ny)) = (nx, ny) else {
                continue;
            };
            if out.get_pixel(nx, ny)[0] != 0 || !within(nx, ny) {
                continue;
            }
            out.put_pixel(nx, ny, Luma([255]));
            queue.push_back((nx, ny));
        }
    }

    out
}
