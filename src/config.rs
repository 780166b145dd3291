use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::foundation::error::{MatteError, MatteResult};

/// Output container/packing for one export run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Foreground composited over a solid color, H.264 in MP4.
    ColorKey,
    /// VP9 with alpha in WebM.
    AlphaWebM,
    /// PNG-in-MOV with straight RGBA.
    AlphaMov,
    /// One RGBA PNG per frame in a fresh directory.
    ImageSequence,
}

impl OutputFormat {
    pub fn has_alpha(self) -> bool {
        !matches!(self, Self::ColorKey)
    }

    /// Operation tag used in the output file name.
    pub fn tag(self) -> &'static str {
        match self {
            Self::ColorKey => "Green",
            Self::AlphaWebM => "WebM",
            Self::AlphaMov => "Alpha",
            Self::ImageSequence => "Frames",
        }
    }

    /// Container extension, `None` for image sequences.
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::ColorKey => Some("mp4"),
            Self::AlphaWebM => Some("webm"),
            Self::AlphaMov => Some("mov"),
            Self::ImageSequence => None,
        }
    }
}

/// Which foreground estimator drives the matte.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EngineChoice {
    /// Light real-time segmenter producing a coarse confidence map.
    #[default]
    Segmenter,
    /// Dense matting backend identified by model name.
    Matting { model: String },
}

impl EngineChoice {
    pub fn model_name(&self) -> &str {
        match self {
            Self::Segmenter => crate::matte::backend::SEGMENTER_MODEL,
            Self::Matting { model } => model,
        }
    }
}

/// Immutable settings for one export run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    pub format: OutputFormat,
    pub engine: EngineChoice,
    pub threshold: f32,
    pub feather_radius: u32,
}

impl OutputSpec {
    /// Validate `threshold` and force `feather_radius` odd (0 stays 0, disabling feathering).
    pub fn new(
        format: OutputFormat,
        engine: EngineChoice,
        threshold: f32,
        feather_radius: u32,
    ) -> MatteResult<Self> {
        if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
            return Err(MatteError::validation(format!(
                "threshold must be within [0,1], got {threshold}"
            )));
        }
        Ok(Self {
            format,
            engine,
            threshold,
            feather_radius: force_odd(feather_radius),
        })
    }

    /// Threshold expressed on the 8-bit mask scale.
    pub fn threshold_u8(&self) -> u8 {
        (self.threshold * 255.0).round().clamp(0.0, 255.0) as u8
    }
}

pub fn force_odd(v: u32) -> u32 {
    if v == 0 || v % 2 == 1 { v } else { v + 1 }
}

/// Empirically chosen knobs. None of these values is load-bearing; tests adjust them freely.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    /// Per-channel tolerance of the fixed-range flood fill.
    pub flood_tolerance: u8,
    /// Disk radius stamped when a flood click selects (almost) nothing.
    pub flood_fallback_radius: u32,
    /// Regions smaller than this are treated as noise and replaced by the fallback disk.
    pub flood_min_pixels: usize,
    /// Pencil stroke thickness in output pixels.
    pub stroke_thickness: u32,
    /// Disk radius stamped at every successfully tracked point.
    pub track_radius: u32,
    /// Lucas-Kanade window edge length.
    pub flow_window: u32,
    /// Extra pyramid levels above full resolution.
    pub flow_levels: u32,
    pub flow_max_iterations: u32,
    pub flow_epsilon: f32,
    /// Export progress is emitted every this many frames.
    pub progress_every: u64,
    /// Worker progress lines are printed every this many frames.
    pub worker_progress_every: u64,
    pub read_retries: u32,
    pub retry_backoff_ms: u64,
    /// Read failures within this many frames of the known total count as end of stream.
    pub eos_slack: u64,
    pub inpaint_radius: u32,
    pub output_dir: PathBuf,
    /// Background for the color-key format.
    pub key_color: [u8; 3],
    /// Whether progress events carry a preview frame.
    pub preview: bool,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            flood_tolerance: 45,
            flood_fallback_radius: 15,
            flood_min_pixels: 2,
            stroke_thickness: 20,
            track_radius: 30,
            flow_window: 15,
            flow_levels: 2,
            flow_max_iterations: 10,
            flow_epsilon: 0.03,
            progress_every: 5,
            worker_progress_every: 10,
            read_retries: 5,
            retry_backoff_ms: 100,
            eos_slack: 5,
            inpaint_radius: 3,
            output_dir: PathBuf::from("output"),
            key_color: [0, 255, 0],
            preview: true,
        }
    }
}

impl Tunables {
    pub fn from_path(path: &Path) -> MatteResult<Self> {
        let f = std::fs::File::open(path)
            .with_context(|| format!("open config '{}'", path.display()))?;
        let tunables: Self = serde_json::from_reader(std::io::BufReader::new(f))
            .with_context(|| format!("parse config '{}'", path.display()))?;
        tunables.validate()?;
        Ok(tunables)
    }

    pub fn validate(&self) -> MatteResult<()> {
        if self.flow_window < 3 {
            return Err(MatteError::validation("flow_window must be at least 3"));
        }
        if self.progress_every == 0 || self.worker_progress_every == 0 {
            return Err(MatteError::validation("progress intervals must be non-zero"));
        }
        if self.flow_max_iterations == 0 {
            return Err(MatteError::validation("flow_max_iterations must be non-zero"));
        }
        Ok(())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
