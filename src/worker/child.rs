//! The worker process side: static-mask inpainting of a whole video.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use image::GrayImage;

use crate::{
    config::Tunables,
    encode::{
        ffmpeg::{EncoderProfile, FfmpegSink, FfmpegSinkOpts},
        remux::{RemuxPlan, Remuxer},
        sink::{FrameSink, PackedFrame, SinkConfig},
    },
    foundation::error::{MatteError, MatteResult},
    media::{self, FrameSource, ReadOutcome, RetryPolicy, VideoReader},
    naming,
    raster::{draw, inpaint},
    worker::protocol::{WorkerInvocation, format_progress},
};

/// Resolution above which the worker warns about run time.
pub const LARGE_FRAME: (u32, u32) = (1920, 1080);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Start,
    LoadMask,
    OpenSource,
    FrameLoop,
    Remux,
    Done,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLoopReport {
    pub frames: u64,
    /// Reads kept failing before the expected end; output stops at the last good frame.
    pub truncated: bool,
}

/// Runs one invocation, writing protocol lines to `out` (stdout in the real process).
pub struct InpaintWorker<W: Write> {
    tunables: Tunables,
    out: W,
    state: WorkerState,
    ffmpeg_program: PathBuf,
}

impl<W: Write> InpaintWorker<W> {
    pub fn new(tunables: Tunables, out: W) -> Self {
        Self {
            tunables,
            out,
            state: WorkerState::Start,
            ffmpeg_program: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_ffmpeg_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.ffmpeg_program = program.into();
        self
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run to `Done`; on failure the state is `Failed` and the error is appended to
    /// `<output>.log`.
    pub fn run(&mut self, inv: &WorkerInvocation) -> MatteResult<()> {
        let result = self.run_states(inv);
        if let Err(e) = &result {
            self.state = WorkerState::Failed;
            append_log(&naming::log_path(&inv.output), &format!("error: {e}"));
        }
        result
    }

    fn run_states(&mut self, inv: &WorkerInvocation) -> MatteResult<()> {
        self.state = WorkerState::LoadMask;
        let mask = load_mask(&inv.mask)?;

        self.state = WorkerState::OpenSource;
        let info = media::probe_video(&inv.input)?;
        if info.width > LARGE_FRAME.0 || info.height > LARGE_FRAME.1 {
            self.line(&format!(
                "Warning: {}x{} is above 1080p, inpainting will be slow",
                info.width, info.height
            ))?;
        }
        let mask = if mask.dimensions() == (info.width, info.height) {
            mask
        } else {
            tracing::debug!(
                from = ?mask.dimensions(),
                to = ?(info.width, info.height),
                "resizing mask"
            );
            draw::resize_nearest(&mask, info.width, info.height)
        };
        let mut source = VideoReader::open(&info)?;

        self.state = WorkerState::FrameLoop;
        let intermediate = naming::worker_intermediate(&inv.output);
        let mut sink = FfmpegSink::new(
            FfmpegSinkOpts::new(&intermediate, EncoderProfile::Intermediate)
                .with_program(&self.ffmpeg_program),
        );
        sink.begin(SinkConfig {
            width: info.width,
            height: info.height,
            fps_num: info.fps_num,
            fps_den: info.fps_den,
        })?;
        let tunables = self.tunables.clone();
        let looped = {
            let out = &mut self.out;
            frame_loop(&mut source, &mut sink, &mask, info.frame_count, &tunables, &mut |f| {
                write_line(&mut *out, &format_progress(f))
            })
        };
        let ended = sink.end();
        let report = looped?;
        ended?;
        drop(source);
        if report.truncated {
            self.line(&format!(
                "Warning: source ended early, output truncated at frame {}",
                report.frames
            ))?;
        }

        self.state = WorkerState::Remux;
        self.line(&format_progress(0.92))?;
        let log = naming::log_path(&inv.output);
        let remuxer = Remuxer {
            program: self.ffmpeg_program.clone(),
        };
        remuxer.remux(
            &RemuxPlan::for_worker(inv.professional),
            &intermediate,
            &inv.input,
            &inv.output,
            &log,
        )?;
        let _ = std::fs::remove_file(&intermediate);
        let _ = std::fs::remove_file(&log);

        self.state = WorkerState::Done;
        self.line(&format_progress(1.0))?;
        Ok(())
    }

    fn line(&mut self, text: &str) -> MatteResult<()> {
        write_line(&mut self.out, text)
    }
}

fn write_line(out: &mut impl Write, text: &str) -> MatteResult<()> {
    use anyhow::Context as _;
    writeln!(out, "{text}")
        .and_then(|()| out.flush())
        .context("write worker stdout")?;
    Ok(())
}

fn append_log(path: &Path, text: &str) {
    let opened = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path);
    match opened {
        Ok(mut f) => {
            let _ = writeln!(f, "{text}");
        }
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not write worker log"),
    }
}

pub fn load_mask(path: &Path) -> MatteResult<GrayImage> {
    if !path.exists() {
        return Err(MatteError::InputNotFound(path.to_path_buf()));
    }
    let img = image::open(path)
        .map_err(|e| MatteError::decode(format!("mask '{}': {e}", path.display())))?;
    Ok(img.to_luma8())
}

/// Inpaint every frame of `source` into `sink`, retrying reads that fail before the expected end.
///
/// `progress` receives fractions in `[0, 0.9]` every `worker_progress_every` frames.
pub fn frame_loop(
    source: &mut dyn FrameSource,
    sink: &mut dyn FrameSink,
    mask: &GrayImage,
    total_frames: u64,
    tunables: &Tunables,
    progress: &mut dyn FnMut(f64) -> MatteResult<()>,
) -> MatteResult<FrameLoopReport> {
    let every = tunables.worker_progress_every.max(1);
    let policy = RetryPolicy::from_tunables(tunables);
    let mut frames = 0u64;

    loop {
        let frame = match media::read_with_retry(source, frames, total_frames, policy)? {
            ReadOutcome::Frame(frame) => frame,
            ReadOutcome::End => break,
            ReadOutcome::Truncated => {
                return Ok(FrameLoopReport {
                    frames,
                    truncated: true,
                });
            }
        };

        let _span = tracing::debug_span!("inpaint_frame", frame = frames).entered();
        let filled = inpaint::inpaint(&frame, mask, tunables.inpaint_radius)?;
        sink.push_frame(frames, &PackedFrame::Rgb(filled))?;
        frames += 1;

        if frames.is_multiple_of(every) && total_frames > 0 {
            let f = (frames as f64 / total_frames as f64).min(1.0) * 0.9;
            progress(f)?;
        }
    }

    Ok(FrameLoopReport {
        frames,
        truncated: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_mask_fails_in_load_state_and_logs() {
        let dir = std::env::temp_dir().join(format!("mattecut_child_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let inv = WorkerInvocation {
            input: dir.join("in.mp4"),
            mask: dir.join("nope.png"),
            output: dir.join("out.mp4"),
            professional: false,
        };
        let mut worker = InpaintWorker::new(Tunables::default(), Vec::new());
        let err = worker.run(&inv).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(worker.state(), WorkerState::Failed);
        let log = std::fs::read_to_string(dir.join("out.mp4.log")).unwrap();
        assert!(log.contains("input not found"));
        assert!(worker.into_output().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn undecodable_mask_is_a_decode_failure() {
        let dir = std::env::temp_dir().join(format!("mattecut_child_bad_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mask = dir.join("mask.png");
        std::fs::write(&mask, b"not a png").unwrap();
        let err = load_mask(&mask).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
