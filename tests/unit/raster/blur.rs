use super::*;
use image::Luma;

fn hard_edge(width: u32, height: u32, edge_x: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| Luma([if x < edge_x { 255 } else { 0 }]))
}

fn gradient_width(mask: &GrayImage) -> usize {
    // Soft pixels along the middle row.
    let y = mask.height() / 2;
    (0..mask.width())
        .filter(|&x| {
            let v = mask.get_pixel(x, y)[0];
            v != 0 && v != 255
        })
        .count()
}

#[test]
fn kernel_size_1_is_identity() {
    let src = hard_edge(16, 4, 8);
    let out = feather_mask(&src, 1).unwrap();
    assert_eq!(out, src);
}

#[test]
fn even_kernel_is_rejected() {
    let src = hard_edge(16, 4, 8);
    assert!(feather_mask(&src, 4).is_err());
}

#[test]
fn constant_mask_is_unchanged() {
    let src = GrayImage::from_pixel(9, 7, Luma([180]));
    let out = feather_mask(&src, 7).unwrap();
    assert_eq!(out, src);
}

#[test]
fn wider_feather_softens_a_wider_band() {
    let src = hard_edge(64, 8, 32);
    let mut last = 0usize;
    for ksize in [3u32, 5, 7, 9] {
        let width = gradient_width(&feather_mask(&src, ksize).unwrap());
        assert!(width > last, "ksize {ksize}: {width} <= {last}");
        last = width;
    }
}

#[test]
fn feather_preserves_total_mass_of_an_isolated_dot() {
    let mut src = GrayImage::new(11, 11);
    src.put_pixel(5, 5, Luma([255]));
    let out = feather_mask(&src, 5).unwrap();
    let nonzero = out.iter().filter(|&&v| v != 0).count();
    assert!(nonzero > 1);
    let sum: i32 = out.iter().map(|&v| i32::from(v)).sum();
    assert!((sum - 255).abs() <= 12);
}
