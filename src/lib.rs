//! mattecut: interactive mask acquisition, streaming matte export and isolated inpainting.
//!
//! - Collect a manual selection on a [`MaskCanvas`] (strokes, flood clicks, tracked points)
//! - Export a video with [`StreamingExporter`]: per-frame [`MatteBuilder`] masks, composited and
//!   piped into `ffmpeg`, then remuxed with the source audio
//! - Or clean a video with [`CleanJob`], which runs the `mattecut-inpaint` worker process
#![forbid(unsafe_code)]

mod foundation;

/// Interactive mask state and recorded sessions.
pub mod canvas;
/// Color-key and alpha packing.
pub mod composite;
/// Run settings and tunables.
pub mod config;
/// Frame sinks, `ffmpeg` encoder and audio remux.
pub mod encode;
/// Streaming export.
pub mod export;
/// Per-frame matte construction and foreground backends.
pub mod matte;
/// Source probing and decoding.
pub mod media;
/// Output file naming.
pub mod naming;
/// CPU raster primitives.
pub mod raster;
/// Out-of-process inpainting.
pub mod worker;

pub use crate::canvas::{MaskCanvas, ToolMode, session::MaskSession};
pub use crate::config::{EngineChoice, OutputFormat, OutputSpec, Tunables};
pub use crate::encode::ffmpeg::is_ffmpeg_on_path;
pub use crate::export::{ExportEvent, ExportJob, ExportRequest, StreamingExporter};
pub use crate::foundation::cancel::CancelToken;
pub use crate::foundation::error::{MatteError, MatteResult};
pub use crate::foundation::geometry::{CoordinateMapper, NormalizedPoint};
pub use crate::matte::{MatteBuilder, TrackState, backend::BackendSession};
pub use crate::worker::parent::{CleanJob, WorkerCommand};
pub use crate::worker::protocol::{WorkerEvent, WorkerInvocation};
