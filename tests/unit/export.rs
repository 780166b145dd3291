use super::*;
use crate::{config::EngineChoice, encode::sink::InMemorySink, media::MemorySource};
use image::Rgb;

fn gray_frames(n: usize) -> Vec<RgbImage> {
    (0..n)
        .map(|_| RgbImage::from_pixel(16, 16, Rgb([120, 120, 120])))
        .collect()
}

fn params(spec: &OutputSpec, total: u64) -> StreamParams<'_> {
    StreamParams {
        spec,
        fps_num: 25,
        fps_den: 1,
        total_frames: total,
        manual_mask: None,
        track_points: &[],
    }
}

#[test]
fn eta_scales_with_remaining_frames() {
    assert_eq!(estimate_remaining(Duration::from_secs(4), 0, 10), None);
    assert_eq!(estimate_remaining(Duration::from_secs(4), 2, 0), None);
    assert_eq!(
        estimate_remaining(Duration::from_secs(4), 2, 10),
        Some(Duration::from_secs(16))
    );
    assert_eq!(
        estimate_remaining(Duration::from_secs(4), 10, 10),
        Some(Duration::ZERO)
    );
}

#[test]
fn progress_follows_interval_and_final_frame() {
    let spec = OutputSpec::new(OutputFormat::ColorKey, EngineChoice::Segmenter, 0.5, 0).unwrap();
    let tunables = Tunables {
        progress_every: 4,
        preview: false,
        ..Tunables::default()
    };
    let mut exporter = StreamingExporter::new(tunables);
    let mut source = MemorySource::new(gray_frames(10));
    let mut sink = InMemorySink::new();
    let mut seen = Vec::new();
    let n = exporter
        .run_stream(
            &mut source,
            &mut sink,
            params(&spec, 10),
            &CancelToken::new(),
            &mut |ev| {
                if let ExportEvent::Progress { frame, preview, .. } = ev {
                    assert!(preview.is_none());
                    seen.push(frame);
                }
            },
        )
        .unwrap();
    assert_eq!(n, 10);
    assert_eq!(seen, vec![4, 8, 10]);
}

#[test]
fn preview_is_burned_into_a_copy_only() {
    let spec = OutputSpec::new(OutputFormat::ColorKey, EngineChoice::Segmenter, 0.5, 0).unwrap();
    let tunables = Tunables {
        progress_every: 1,
        ..Tunables::default()
    };
    let mut exporter = StreamingExporter::new(tunables.clone());
    let mut source = MemorySource::new(gray_frames(2));
    let mut sink = InMemorySink::new();
    let mut previews = Vec::new();
    exporter
        .run_stream(
            &mut source,
            &mut sink,
            params(&spec, 2),
            &CancelToken::new(),
            &mut |ev| {
                if let ExportEvent::Progress {
                    preview: Some(p), ..
                } = ev
                {
                    previews.push(p);
                }
            },
        )
        .unwrap();
    assert_eq!(previews.len(), 2);
    let last = previews.last().unwrap();
    assert_eq!(last.get_pixel(0, 15).0, composite::PREVIEW_ACCENT);
    for (_, frame) in sink.frames() {
        let PackedFrame::Rgb(img) = frame else {
            panic!("color key frames are rgb");
        };
        assert!(img.pixels().all(|p| p.0 == tunables.key_color));
    }
}

#[test]
fn cancellation_stops_the_loop_and_still_closes_the_sink() {
    let spec = OutputSpec::new(OutputFormat::AlphaMov, EngineChoice::Segmenter, 0.5, 0).unwrap();
    let mut exporter = StreamingExporter::new(Tunables::default());
    let mut source = MemorySource::new(gray_frames(5));
    let mut sink = InMemorySink::new();
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = exporter
        .run_stream(&mut source, &mut sink, params(&spec, 5), &cancel, &mut |_| {})
        .unwrap_err();
    assert!(matches!(err, MatteError::Cancelled));
    assert!(sink.is_ended());
    assert!(sink.frames().is_empty());
}

#[test]
fn alpha_formats_emit_rgba_frames() {
    let spec = OutputSpec::new(OutputFormat::AlphaWebM, EngineChoice::Segmenter, 0.5, 3).unwrap();
    let mut exporter = StreamingExporter::new(Tunables::default());
    let mut source = MemorySource::new(gray_frames(3));
    let mut sink = InMemorySink::new();
    exporter
        .run_stream(&mut source, &mut sink, params(&spec, 3), &CancelToken::new(), &mut |_| {})
        .unwrap();
    assert_eq!(sink.frames().len(), 3);
    for (_, frame) in sink.frames() {
        let PackedFrame::Rgba(img) = frame else {
            panic!("alpha formats are rgba");
        };
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }
}

/// Serves `good` frames, then reports a transient glitch on every read.
struct StallingSource {
    good: Vec<RgbImage>,
    glitches: u32,
}

impl FrameSource for StallingSource {
    fn frame_size(&self) -> (u32, u32) {
        (16, 16)
    }

    fn read_frame(&mut self) -> MatteResult<Option<RgbImage>> {
        if self.good.is_empty() {
            self.glitches += 1;
            return Err(MatteError::glitch("stalled"));
        }
        Ok(Some(self.good.remove(0)))
    }
}

#[test]
fn stalled_source_is_retried_then_reported_as_truncated() {
    let spec = OutputSpec::new(OutputFormat::ColorKey, EngineChoice::Segmenter, 0.5, 0).unwrap();
    let tunables = Tunables {
        retry_backoff_ms: 0,
        preview: false,
        ..Tunables::default()
    };
    let retries = tunables.read_retries;
    let mut exporter = StreamingExporter::new(tunables);
    let mut source = StallingSource {
        good: gray_frames(3),
        glitches: 0,
    };
    let mut sink = InMemorySink::new();
    let mut truncated = Vec::new();
    let n = exporter
        .run_stream(
            &mut source,
            &mut sink,
            params(&spec, 20),
            &CancelToken::new(),
            &mut |ev| {
                if let ExportEvent::Truncated { frames, total } = ev {
                    truncated.push((frames, total));
                }
            },
        )
        .unwrap();

    assert_eq!(n, 3);
    assert_eq!(truncated, vec![(3, 20)]);
    assert_eq!(source.glitches, retries + 1);
    assert!(sink.is_ended());
}

#[test]
fn glitch_near_the_known_end_finishes_quietly() {
    let spec = OutputSpec::new(OutputFormat::ColorKey, EngineChoice::Segmenter, 0.5, 0).unwrap();
    let mut exporter = StreamingExporter::new(Tunables::default());
    let mut source = StallingSource {
        good: gray_frames(8),
        glitches: 0,
    };
    let mut sink = InMemorySink::new();
    let mut truncated = false;
    let n = exporter
        .run_stream(
            &mut source,
            &mut sink,
            params(&spec, 10),
            &CancelToken::new(),
            &mut |ev| truncated |= matches!(ev, ExportEvent::Truncated { .. }),
        )
        .unwrap();
    assert_eq!(n, 8);
    assert!(!truncated);
    assert_eq!(source.glitches, 1);
}
