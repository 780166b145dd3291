use image::{GrayImage, Rgb, RgbImage, RgbaImage};

use crate::foundation::error::{MatteError, MatteResult};

/// Accent used for the preview progress bar.
pub const PREVIEW_ACCENT: [u8; 3] = [0, 230, 118];

fn check_dims(frame: &RgbImage, mask: &GrayImage) -> MatteResult<()> {
    if frame.dimensions() != mask.dimensions() {
        return Err(MatteError::validation(format!(
            "mask is {:?} but frame is {:?}",
            mask.dimensions(),
            frame.dimensions()
        )));
    }
    Ok(())
}

/// `frame*m + key*(1-m)` per pixel, with `m = mask/255`.
pub fn color_key(frame: &RgbImage, mask: &GrayImage, key: [u8; 3]) -> MatteResult<RgbImage> {
    check_dims(frame, mask)?;
    let mut out = RgbImage::new(frame.width(), frame.height());
    for ((o, f), m) in out
        .as_mut()
        .chunks_exact_mut(3)
        .zip(frame.as_raw().chunks_exact(3))
        .zip(mask.as_raw().iter())
    {
        let a = u16::from(*m);
        let ia = 255 - a;
        for c in 0..3 {
            o[c] = add_sat_u8(
                mul_div255(u16::from(f[c]), a),
                mul_div255(u16::from(key[c]), ia),
            );
        }
    }
    Ok(out)
}

/// Straight RGBA with the mask as alpha. Color is zeroed where the mask is 0 so players that
/// ignore alpha do not show stray background.
pub fn pack_alpha(frame: &RgbImage, mask: &GrayImage) -> MatteResult<RgbaImage> {
    check_dims(frame, mask)?;
    let mut out = RgbaImage::new(frame.width(), frame.height());
    for ((o, f), m) in out
        .as_mut()
        .chunks_exact_mut(4)
        .zip(frame.as_raw().chunks_exact(3))
        .zip(mask.as_raw().iter())
    {
        if *m != 0 {
            o[..3].copy_from_slice(f);
        }
        o[3] = *m;
    }
    Ok(out)
}

/// Copy of `frame` with a progress bar along the bottom edge. Never used for exported frames.
pub fn burn_progress_preview(frame: &RgbImage, fraction: f64) -> RgbImage {
    let mut out = frame.clone();
    let (w, h) = out.dimensions();
    if w == 0 || h == 0 {
        return out;
    }
    let bar_h = (h / 20).max(2).min(h);
    let filled = (f64::from(w) * fraction.clamp(0.0, 1.0)).round() as u32;
    for y in h - bar_h..h {
        for x in 0..w {
            let px = out.get_pixel_mut(x, y);
            if x < filled {
                *px = Rgb(PREVIEW_ACCENT);
            } else {
                px.0 = px.0.map(|v| v / 3);
            }
        }
    }
    out
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[cfg(test)]
#[path = "../tests/unit/composite.rs"]
mod tests;
