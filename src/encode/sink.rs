use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::{RgbImage, RgbaImage};

use crate::foundation::error::{MatteError, MatteResult};

/// One composited frame in the pixel layout its sink expects.
#[derive(Clone, Debug, PartialEq)]
pub enum PackedFrame {
    /// Opaque `rgb24` (color-key output, worker intermediate).
    Rgb(RgbImage),
    /// Straight-alpha `rgba`.
    Rgba(RgbaImage),
}

impl PackedFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Rgb(img) => img.dimensions(),
            Self::Rgba(img) => img.dimensions(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Rgb(img) => img.as_raw(),
            Self::Rgba(img) => img.as_raw(),
        }
    }

    /// `ffmpeg` rawvideo pixel format name.
    pub fn pix_fmt(&self) -> &'static str {
        match self {
            Self::Rgb(_) => "rgb24",
            Self::Rgba(_) => "rgba",
        }
    }
}

/// Stream geometry handed to a sink before the first frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
}

impl SinkConfig {
    pub fn validate(&self) -> MatteResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MatteError::validation("sink width/height must be non-zero"));
        }
        if self.fps_num == 0 || self.fps_den == 0 {
            return Err(MatteError::validation("sink fps must be non-zero"));
        }
        Ok(())
    }
}

/// Consumer of packed frames in source order.
///
/// `begin` is called once, then `push_frame` with strictly increasing indices, then `end` exactly
/// once (also after a failed push).
pub trait FrameSink: Send {
    fn begin(&mut self, cfg: SinkConfig) -> MatteResult<()>;

    fn push_frame(&mut self, idx: u64, frame: &PackedFrame) -> MatteResult<()>;

    fn end(&mut self) -> MatteResult<()>;
}

/// In-memory sink for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemorySink {
    cfg: Option<SinkConfig>,
    frames: Vec<(u64, PackedFrame)>,
    ended: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    pub fn frames(&self) -> &[(u64, PackedFrame)] {
        &self.frames
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, cfg: SinkConfig) -> MatteResult<()> {
        cfg.validate()?;
        self.cfg = Some(cfg);
        self.frames.clear();
        self.ended = false;
        Ok(())
    }

    fn push_frame(&mut self, idx: u64, frame: &PackedFrame) -> MatteResult<()> {
        self.frames.push((idx, frame.clone()));
        Ok(())
    }

    fn end(&mut self) -> MatteResult<()> {
        self.ended = true;
        Ok(())
    }
}

/// Writes `frame_00001.png`, `frame_00002.png`, ... into a directory.
#[derive(Debug)]
pub struct ImageSequenceSink {
    dir: PathBuf,
    written: u64,
}

impl ImageSequenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: 0,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn frame_path(&self, idx: u64) -> PathBuf {
        self.dir.join(format!("frame_{:05}.png", idx + 1))
    }
}

impl FrameSink for ImageSequenceSink {
    fn begin(&mut self, cfg: SinkConfig) -> MatteResult<()> {
        cfg.validate()?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create frame directory '{}'", self.dir.display()))?;
        self.written = 0;
        Ok(())
    }

    fn push_frame(&mut self, idx: u64, frame: &PackedFrame) -> MatteResult<()> {
        let path = self.frame_path(idx);
        let saved = match frame {
            PackedFrame::Rgba(img) => img.save(&path),
            PackedFrame::Rgb(img) => image::DynamicImage::ImageRgb8(img.clone())
                .to_rgba8()
                .save(&path),
        };
        saved.with_context(|| format!("write frame '{}'", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn end(&mut self) -> MatteResult<()> {
        tracing::info!(dir = %self.dir.display(), frames = self.written, "image sequence written");
        Ok(())
    }
}
