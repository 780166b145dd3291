//! Frame sinks and the audio remux pass.
//!
//! Sinks consume packed frames in source order. Encoders are the system `ffmpeg` binary fed raw
//! frames over stdin.

/// `ffmpeg` raw-pipe encoder sink.
pub mod ffmpeg;
/// Audio remux onto a silent encode.
pub mod remux;
/// Sink trait and the in-memory and image-sequence sinks.
pub mod sink;
