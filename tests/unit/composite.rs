use super::*;
use image::Luma;

#[test]
fn color_key_blends_by_mask() {
    let frame = RgbImage::from_pixel(3, 1, Rgb([200, 100, 50]));
    let mut mask = GrayImage::new(3, 1);
    mask.put_pixel(1, 0, Luma([255]));
    mask.put_pixel(2, 0, Luma([128]));

    let out = color_key(&frame, &mask, [0, 255, 0]).unwrap();
    assert_eq!(out.get_pixel(0, 0).0, [0, 255, 0]);
    assert_eq!(out.get_pixel(1, 0).0, [200, 100, 50]);
    let mid = out.get_pixel(2, 0).0;
    assert_eq!(mid, [100, 177, 25]);
}

#[test]
fn alpha_pack_zeroes_color_under_transparent_pixels() {
    let frame = RgbImage::from_pixel(2, 1, Rgb([9, 8, 7]));
    let mut mask = GrayImage::new(2, 1);
    mask.put_pixel(1, 0, Luma([40]));

    let out = pack_alpha(&frame, &mask).unwrap();
    assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0, 0]);
    assert_eq!(out.get_pixel(1, 0).0, [9, 8, 7, 40]);
}

#[test]
fn mismatched_mask_is_rejected() {
    let frame = RgbImage::new(4, 4);
    let mask = GrayImage::new(2, 2);
    assert!(color_key(&frame, &mask, [0, 0, 0]).is_err());
    assert!(pack_alpha(&frame, &mask).is_err());
}

#[test]
fn preview_bar_leaves_source_untouched() {
    let frame = RgbImage::from_pixel(40, 40, Rgb([90, 90, 90]));
    let preview = burn_progress_preview(&frame, 0.5);
    assert_eq!(frame.get_pixel(0, 39).0, [90, 90, 90]);
    assert_eq!(preview.get_pixel(0, 39).0, PREVIEW_ACCENT);
    assert_eq!(preview.get_pixel(39, 39).0, [30, 30, 30]);
    assert_eq!(preview.get_pixel(20, 0).0, [90, 90, 90]);
}

#[test]
fn preview_bar_fits_a_single_row_frame() {
    let frame = RgbImage::from_pixel(4, 1, Rgb([90, 90, 90]));
    let preview = burn_progress_preview(&frame, 0.5);
    assert_eq!(preview.dimensions(), (4, 1));
    assert_eq!(preview.get_pixel(0, 0).0, PREVIEW_ACCENT);
    assert_eq!(preview.get_pixel(3, 0).0, [30, 30, 30]);
}
