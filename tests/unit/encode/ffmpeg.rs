use super::*;
use image::{RgbImage, RgbaImage};

fn cfg(w: u32, h: u32) -> SinkConfig {
    SinkConfig {
        width: w,
        height: h,
        fps_num: 30000,
        fps_den: 1001,
    }
}

#[test]
fn color_key_args_match_table() {
    let args = EncoderProfile::ColorKey.args(&cfg(64, 48), Path::new("out/a_Green_001.mp4"));
    let joined = args.join(" ");
    assert_eq!(
        joined,
        "-y -loglevel error -f rawvideo -pix_fmt rgb24 -s 64x48 -r 30000/1001 -i pipe:0 \
         -an -c:v libx264 -preset fast -pix_fmt yuv420p out/a_Green_001.mp4"
    );
}

#[test]
fn alpha_profiles_take_rgba() {
    assert_eq!(EncoderProfile::AlphaWebM.input_pix_fmt(), "rgba");
    assert_eq!(EncoderProfile::AlphaMov.input_pix_fmt(), "rgba");
    assert!(
        EncoderProfile::AlphaWebM
            .output_args()
            .windows(2)
            .any(|w| w == ["-pix_fmt", "yuva420p"])
    );
    assert!(
        EncoderProfile::AlphaMov
            .output_args()
            .windows(2)
            .any(|w| w == ["-c:v", "png"])
    );
    assert_eq!(EncoderProfile::for_format(OutputFormat::ImageSequence), None);
    assert_eq!(
        EncoderProfile::Intermediate.output_args(),
        &["-an", "-c:v", "mpeg4", "-q:v", "2"]
    );
}

#[test]
fn wrong_layout_is_rejected_before_writing() {
    let mut sink = FfmpegSink::new(
        FfmpegSinkOpts::new("unused.mp4", EncoderProfile::ColorKey).with_program("true"),
    );
    if sink.begin(cfg(8, 8)).is_err() {
        return;
    }
    let err = sink
        .push_frame(0, &PackedFrame::Rgba(RgbaImage::new(8, 8)))
        .unwrap_err();
    assert!(matches!(err, MatteError::Validation(_)));
    let _ = sink.end();
}

#[cfg(target_os = "linux")]
#[test]
fn broken_pipe_is_reported_and_child_is_reaped_once() {
    // `true` exits without reading, so writes eventually fail with EPIPE.
    let mut sink = FfmpegSink::new(
        FfmpegSinkOpts::new("unused.mp4", EncoderProfile::ColorKey).with_program("true"),
    );
    sink.begin(cfg(64, 64)).unwrap();
    let pid = sink.child_id().unwrap();
    let frame = PackedFrame::Rgb(RgbImage::new(64, 64));

    let mut failure = None;
    for idx in 0..10_000 {
        if let Err(e) = sink.push_frame(idx, &frame) {
            failure = Some(e);
            break;
        }
    }
    assert!(matches!(failure, Some(MatteError::PipeBroken(_))));

    sink.end().unwrap();
    assert!(!Path::new(&format!("/proc/{pid}")).exists());
    assert!(sink.end().is_err(), "second end must not wait again");
}

#[cfg(target_os = "linux")]
#[test]
fn dropping_an_open_sink_reaps_the_child() {
    let mut sink = FfmpegSink::new(
        FfmpegSinkOpts::new("unused.mp4", EncoderProfile::ColorKey).with_program("true"),
    );
    sink.begin(cfg(4, 4)).unwrap();
    let pid = sink.child_id().unwrap();
    drop(sink);
    assert!(!Path::new(&format!("/proc/{pid}")).exists());
}

#[test]
fn encodes_real_mp4_when_ffmpeg_is_available() {
    if !is_ffmpeg_on_path() {
        return;
    }
    let dir = std::env::temp_dir().join(format!("mattecut_enc_{}", std::process::id()));
    let out = dir.join("clip.mp4");
    let mut sink = FfmpegSink::new(FfmpegSinkOpts::new(&out, EncoderProfile::ColorKey));
    sink.begin(cfg(32, 32)).unwrap();
    for idx in 0..5 {
        let frame = RgbImage::from_pixel(32, 32, image::Rgb([0, 255, 0]));
        sink.push_frame(idx, &PackedFrame::Rgb(frame)).unwrap();
    }
    sink.end().unwrap();
    assert!(std::fs::metadata(&out).unwrap().len() > 0);
    let _ = std::fs::remove_dir_all(&dir);
}
