//! Streaming export: decode, matte, composite, encode, remux.
//!
//! [`StreamingExporter::run_stream`] is the frame loop over any [`FrameSource`]/[`FrameSink`]
//! pair; [`StreamingExporter::run`] wires it to `ffmpeg` and the output naming rules, and
//! [`ExportJob`] moves a run onto a background thread.

use std::{
    path::PathBuf,
    sync::mpsc,
    thread::JoinHandle,
    time::{Duration, Instant},
};

use image::{GrayImage, RgbImage};

use crate::{
    composite,
    config::{OutputFormat, OutputSpec, Tunables},
    encode::{
        ffmpeg::{EncoderProfile, FfmpegSink, FfmpegSinkOpts},
        remux::{RemuxPlan, Remuxer},
        sink::{FrameSink, ImageSequenceSink, PackedFrame, SinkConfig},
    },
    foundation::{
        cancel::CancelToken,
        error::{MatteError, MatteResult},
        geometry::NormalizedPoint,
    },
    matte::{MatteBuilder, TrackState, backend::BackendSession},
    media::{self, FrameSource, ReadOutcome, RetryPolicy, VideoReader},
    naming,
};

#[derive(Clone, Debug)]
pub enum ExportEvent {
    Status(String),
    Progress {
        /// Frames written so far.
        frame: u64,
        total: u64,
        fraction: f64,
        eta: Option<Duration>,
        /// Composited frame with the progress bar burned in; never the exported pixels.
        preview: Option<RgbImage>,
    },
    /// The backend found nothing on this frame; it is still written.
    EmptyMask { frame: u64 },
    /// Reads kept failing before the expected end; the output stops after `frames`.
    Truncated { frames: u64, total: u64 },
}

/// Everything a run needs besides the exporter's own settings.
#[derive(Clone, Debug)]
pub struct ExportRequest {
    pub input: PathBuf,
    pub spec: OutputSpec,
    /// Flattened manual selection, forced to foreground on every frame.
    pub manual_mask: Option<GrayImage>,
    pub track_points: Vec<NormalizedPoint>,
}

/// Stream parameters for [`StreamingExporter::run_stream`].
#[derive(Clone, Copy, Debug)]
pub struct StreamParams<'a> {
    pub spec: &'a OutputSpec,
    pub fps_num: u32,
    pub fps_den: u32,
    /// Expected frame count, 0 when unknown.
    pub total_frames: u64,
    pub manual_mask: Option<&'a GrayImage>,
    pub track_points: &'a [NormalizedPoint],
}

pub struct StreamingExporter {
    builder: MatteBuilder,
    tunables: Tunables,
    encoder_program: PathBuf,
    remuxer: Remuxer,
}

impl StreamingExporter {
    pub fn new(tunables: Tunables) -> Self {
        Self::with_session(tunables, BackendSession::new())
    }

    pub fn with_session(tunables: Tunables, session: BackendSession) -> Self {
        Self {
            builder: MatteBuilder::new(session),
            tunables,
            encoder_program: PathBuf::from("ffmpeg"),
            remuxer: Remuxer::default(),
        }
    }

    /// Use `program` in place of `ffmpeg` for both the encode and the remux.
    pub fn with_ffmpeg_program(mut self, program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        self.remuxer.program = program.clone();
        self.encoder_program = program;
        self
    }

    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    pub fn into_session(self) -> BackendSession {
        self.builder.into_session()
    }

    /// Export `req.input` into the configured output directory and return the final artifact:
    /// a video file, or the frame directory for image sequences.
    pub fn run(
        &mut self,
        req: &ExportRequest,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(ExportEvent),
    ) -> MatteResult<PathBuf> {
        let info = media::probe_video(&req.input)?;
        tracing::info!(
            input = %req.input.display(),
            info.width,
            info.height,
            fps = info.fps(),
            frames = info.frame_count,
            format = ?req.spec.format,
            "export started"
        );
        on_event(ExportEvent::Status(format!(
            "Processing {} frames at {}x{}",
            info.frame_count, info.width, info.height
        )));

        let mut source = VideoReader::open(&info)?;
        let params = StreamParams {
            spec: &req.spec,
            fps_num: info.fps_num,
            fps_den: info.fps_den,
            total_frames: info.frame_count,
            manual_mask: req.manual_mask.as_ref(),
            track_points: &req.track_points,
        };
        let out_dir = self.tunables.output_dir.clone();

        let Some(profile) = EncoderProfile::for_format(req.spec.format) else {
            let dir = naming::unique_sequence_dir(&out_dir, Some(&req.input))?;
            let mut sink = ImageSequenceSink::new(&dir);
            self.run_stream(&mut source, &mut sink, params, cancel, on_event)?;
            on_event(ExportEvent::Status(format!("Saved {}", dir.display())));
            return Ok(dir);
        };

        let ext = req.spec.format.extension().unwrap_or("mp4");
        let final_path =
            naming::unique_output_path(&out_dir, Some(&req.input), req.spec.format.tag(), ext)?;
        let silent = naming::silent_intermediate(&final_path);
        let mut sink = FfmpegSink::new(
            FfmpegSinkOpts::new(&silent, profile).with_program(&self.encoder_program),
        );
        let frames = self.run_stream(&mut source, &mut sink, params, cancel, on_event)?;
        drop(source);

        on_event(ExportEvent::Status("Adding audio".to_string()));
        self.remuxer.remux(
            &RemuxPlan::for_format(req.spec.format),
            &silent,
            &req.input,
            &final_path,
            &naming::log_path(&final_path),
        )?;
        if let Err(e) = std::fs::remove_file(&silent) {
            tracing::warn!(
                path = %silent.display(),
                error = %e,
                "could not remove silent intermediate"
            );
        }
        tracing::info!(out = %final_path.display(), frames, "export finished");
        on_event(ExportEvent::Status(format!("Saved {}", final_path.display())));
        Ok(final_path)
    }

    /// Run the frame loop, returning the number of frames written.
    ///
    /// `sink.end()` is called exactly once whether the loop succeeds or not; the loop's own error
    /// takes precedence over one from `end`.
    pub fn run_stream(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        params: StreamParams<'_>,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(ExportEvent),
    ) -> MatteResult<u64> {
        let (width, height) = source.frame_size();
        sink.begin(SinkConfig {
            width,
            height,
            fps_num: params.fps_num,
            fps_den: params.fps_den,
        })?;

        let looped = self.frame_loop(source, sink, params, cancel, on_event);
        let ended = sink.end();
        match (looped, ended) {
            (Err(e), Err(end_err)) => {
                tracing::warn!(error = %end_err, "sink close after failure also failed");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(n), Ok(())) => Ok(n),
        }
    }

    fn frame_loop(
        &mut self,
        source: &mut dyn FrameSource,
        sink: &mut dyn FrameSink,
        params: StreamParams<'_>,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(ExportEvent),
    ) -> MatteResult<u64> {
        let spec = params.spec;
        self.builder.reset(spec)?;
        let mut track = (!params.track_points.is_empty())
            .then(|| TrackState::new(params.track_points, &self.tunables));
        let every = self.tunables.progress_every.max(1);
        let retry = RetryPolicy::from_tunables(&self.tunables);
        let key = self.tunables.key_color;
        let started = Instant::now();
        let mut written = 0u64;
        let mut warned_empty = false;

        loop {
            if cancel.is_cancelled() {
                tracing::info!(frames = written, "export cancelled");
                return Err(MatteError::Cancelled);
            }
            let read = media::read_with_retry(source, written, params.total_frames, retry)?;
            let frame = match read {
                ReadOutcome::Frame(frame) => frame,
                ReadOutcome::End => break,
                ReadOutcome::Truncated => {
                    on_event(ExportEvent::Truncated {
                        frames: written,
                        total: params.total_frames,
                    });
                    break;
                }
            };

            let outcome =
                self.builder
                    .compute_mask(&frame, spec, track.as_mut(), params.manual_mask)?;
            if outcome.empty {
                if !warned_empty {
                    tracing::warn!(frame = written, "no foreground detected");
                    warned_empty = true;
                }
                on_event(ExportEvent::EmptyMask { frame: written });
            }

            let packed = match spec.format {
                OutputFormat::ColorKey => {
                    PackedFrame::Rgb(composite::color_key(&frame, &outcome.mask, key)?)
                }
                OutputFormat::AlphaWebM | OutputFormat::AlphaMov | OutputFormat::ImageSequence => {
                    PackedFrame::Rgba(composite::pack_alpha(&frame, &outcome.mask)?)
                }
            };
            sink.push_frame(written, &packed)?;
            written += 1;

            if written.is_multiple_of(every) || written == params.total_frames {
                let fraction = progress_fraction(written, params.total_frames);
                let preview = if self.tunables.preview {
                    let shown = match &packed {
                        PackedFrame::Rgb(img) => img.clone(),
                        PackedFrame::Rgba(_) => composite::color_key(&frame, &outcome.mask, key)?,
                    };
                    Some(composite::burn_progress_preview(&shown, fraction))
                } else {
                    None
                };
                on_event(ExportEvent::Progress {
                    frame: written,
                    total: params.total_frames,
                    fraction,
                    eta: estimate_remaining(started.elapsed(), written, params.total_frames),
                    preview,
                });
            }
        }

        Ok(written)
    }
}

fn progress_fraction(done: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (done as f64 / total as f64).min(1.0)
    }
}

/// Remaining time at the average rate so far; `None` until a rate exists or when the total is
/// unknown.
pub fn estimate_remaining(elapsed: Duration, done: u64, total: u64) -> Option<Duration> {
    if done == 0 || total == 0 {
        return None;
    }
    let per_frame = elapsed.as_secs_f64() / done as f64;
    Some(Duration::from_secs_f64(
        per_frame * total.saturating_sub(done) as f64,
    ))
}

/// Result of a background export.
pub struct ExportOutcome {
    /// The exporter, with its loaded backend, unless the thread panicked.
    pub exporter: Option<StreamingExporter>,
    pub result: MatteResult<PathBuf>,
}

/// A [`StreamingExporter::run`] on its own thread.
pub struct ExportJob {
    handle: JoinHandle<(StreamingExporter, MatteResult<PathBuf>)>,
    events: mpsc::Receiver<ExportEvent>,
    cancel: CancelToken,
}

impl ExportJob {
    pub fn spawn(mut exporter: StreamingExporter, req: ExportRequest) -> Self {
        let (tx, events) = mpsc::channel();
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let handle = std::thread::spawn(move || {
            let mut send = |ev: ExportEvent| {
                let _ = tx.send(ev);
            };
            let result = exporter.run(&req, &token, &mut send);
            if let Err(e) = &result {
                send(ExportEvent::Status(format!("Error: {e}")));
            }
            (exporter, result)
        });
        Self {
            handle,
            events,
            cancel,
        }
    }

    pub fn events(&self) -> &mpsc::Receiver<ExportEvent> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn join(self) -> ExportOutcome {
        match self.handle.join() {
            Ok((exporter, result)) => ExportOutcome {
                exporter: Some(exporter),
                result,
            },
            Err(_) => ExportOutcome {
                exporter: None,
                result: Err(MatteError::Other(anyhow::anyhow!("export thread panicked"))),
            },
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/export.rs"]
mod tests;
