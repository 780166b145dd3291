use super::*;
use image::Rgb;

fn textured(width: u32, height: u32, shift_x: f32, shift_y: f32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let fx = x as f32 - shift_x;
        let fy = y as f32 - shift_y;
        let v = 128.0 + 50.0 * (fx * 0.3).sin() + 50.0 * (fy * 0.25).cos();
        let v = v.clamp(0.0, 255.0) as u8;
        Rgb([v, v, v])
    })
}

#[test]
fn tracks_a_translated_texture() {
    let params = FlowParams::default();
    let prev = Pyramid::build(&textured(96, 96, 0.0, 0.0), params.levels);
    let next = Pyramid::build(&textured(96, 96, 3.0, 2.0), params.levels);

    let tracked = track_points(&prev, &next, &[Point::new(48.0, 48.0)], &params);
    let p = tracked[0].expect("point should be tracked");
    assert!((p.x - 51.0).abs() < 0.5, "x = {}", p.x);
    assert!((p.y - 50.0).abs() < 0.5, "y = {}", p.y);
}

#[test]
fn identical_frames_keep_points_in_place() {
    let params = FlowParams::default();
    let frame = textured(64, 64, 0.0, 0.0);
    let pyr = Pyramid::build(&frame, params.levels);
    let tracked = track_points(&pyr, &pyr, &[Point::new(20.0, 30.0)], &params);
    let p = tracked[0].unwrap();
    assert!((p.x - 20.0).abs() < 0.05 && (p.y - 30.0).abs() < 0.05);
}

#[test]
fn flat_regions_lose_the_point() {
    let params = FlowParams::default();
    let gray = RgbImage::from_pixel(64, 64, Rgb([128, 128, 128]));
    let pyr = Pyramid::build(&gray, params.levels);
    let tracked = track_points(&pyr, &pyr, &[Point::new(32.0, 32.0)], &params);
    assert_eq!(tracked, vec![None]);
}

#[test]
fn pyramid_stops_before_tiny_levels() {
    let small = RgbImage::new(10, 10);
    let pyr = Pyramid::build(&small, 4);
    assert_eq!(pyr.levels.len(), 2);
}
