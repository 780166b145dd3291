use super::*;

#[test]
fn no_frame_degenerates_to_origin() {
    let m = CoordinateMapper::new(0, 0, 640.0, 480.0);
    assert_eq!(m.to_normalized(100.0, 100.0), NormalizedPoint::default());
    assert_eq!(m.to_surface(NormalizedPoint::new(0.5, 0.5)), Point::ZERO);
}

#[test]
fn wide_frame_is_letterboxed_vertically() {
    // 200x100 frame in a 400x400 surface: scale 2, image rect 400x200 centered at y=100.
    let m = CoordinateMapper::new(200, 100, 400.0, 400.0);
    assert_eq!(m.scale(), 2.0);
    let rect = m.image_rect();
    assert_eq!((rect.x0, rect.y0, rect.x1, rect.y1), (0.0, 100.0, 400.0, 300.0));

    let p = m.to_normalized(200.0, 200.0);
    assert!((p.x - 0.5).abs() < 1e-12 && (p.y - 0.5).abs() < 1e-12);
}

#[test]
fn clicks_in_letterbox_are_clamped_onto_the_frame() {
    let m = CoordinateMapper::new(200, 100, 400.0, 400.0);
    let top = m.to_normalized(-20.0, 10.0);
    assert_eq!((top.x, top.y), (0.0, 0.0));
    let bottom = m.to_normalized(500.0, 390.0);
    assert_eq!((bottom.x, bottom.y), (1.0, 1.0));
}

#[test]
fn round_trip_stays_within_one_display_pixel() {
    let frames = [(64u32, 64u32), (1920, 1080), (720, 1280), (33, 7)];
    let surfaces = [(300.0, 200.0), (1024.0, 768.0), (97.0, 411.0)];
    for &(fw, fh) in &frames {
        for &(sw, sh) in &surfaces {
            let m = CoordinateMapper::new(fw, fh, sw, sh);
            let rect = m.image_rect();
            for i in 0..=10 {
                for j in 0..=10 {
                    let n = NormalizedPoint::new(f64::from(i) / 10.0, f64::from(j) / 10.0);
                    let s = m.to_surface(n);
                    let back = m.to_normalized(s.x, s.y);
                    let err_x = (back.x - n.x).abs() * rect.width();
                    let err_y = (back.y - n.y).abs() * rect.height();
                    assert!(err_x <= 1.0 && err_y <= 1.0, "{fw}x{fh} in {sw}x{sh}: {n:?}");
                }
            }
        }
    }
}

#[test]
fn pixel_conversion_uses_buffer_dimensions() {
    let n = NormalizedPoint::new(0.25, 0.5);
    let p = n.to_pixel(64, 32);
    assert_eq!((p.x, p.y), (16.0, 16.0));
    assert_eq!(NormalizedPoint::from_pixel(p, 64, 32), n);
}
