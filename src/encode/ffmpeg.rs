use std::{
    io::{Read, Write as _},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, ExitStatus, Stdio},
};

use crate::{
    config::OutputFormat,
    encode::sink::{FrameSink, PackedFrame, SinkConfig},
    foundation::error::{MatteError, MatteResult},
};

/// Pixel layout and codec arguments for one kind of encode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncoderProfile {
    /// H.264 4:2:0 from `rgb24`.
    ColorKey,
    /// VP9 with alpha from `rgba`.
    AlphaWebM,
    /// PNG-in-MOV from `rgba`.
    AlphaMov,
    /// High-quality MPEG-4 intermediate written by the inpaint worker.
    Intermediate,
}

impl EncoderProfile {
    /// `None` for formats that are not piped through an encoder.
    pub fn for_format(format: OutputFormat) -> Option<Self> {
        match format {
            OutputFormat::ColorKey => Some(Self::ColorKey),
            OutputFormat::AlphaWebM => Some(Self::AlphaWebM),
            OutputFormat::AlphaMov => Some(Self::AlphaMov),
            OutputFormat::ImageSequence => None,
        }
    }

    pub fn input_pix_fmt(self) -> &'static str {
        match self {
            Self::ColorKey | Self::Intermediate => "rgb24",
            Self::AlphaWebM | Self::AlphaMov => "rgba",
        }
    }

    pub fn output_args(self) -> &'static [&'static str] {
        match self {
            Self::ColorKey => &[
                "-an", "-c:v", "libx264", "-preset", "fast", "-pix_fmt", "yuv420p",
            ],
            Self::AlphaWebM => &[
                "-an", "-c:v", "libvpx-vp9", "-b:v", "2M", "-pix_fmt", "yuva420p",
            ],
            Self::AlphaMov => &["-an", "-c:v", "png", "-pix_fmt", "rgba"],
            Self::Intermediate => &["-an", "-c:v", "mpeg4", "-q:v", "2"],
        }
    }

    /// Full argument list for a raw-pipe encode into `out_path`.
    pub fn args(self, cfg: &SinkConfig, out_path: &Path) -> Vec<String> {
        let mut args: Vec<String> = [
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            self.input_pix_fmt(),
            "-s",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.push(format!("{}x{}", cfg.width, cfg.height));
        // For rawvideo input `-r` goes before `-i`.
        args.push("-r".to_string());
        args.push(format!("{}/{}", cfg.fps_num, cfg.fps_den));
        args.extend(["-i", "pipe:0"].map(String::from));
        args.extend(self.output_args().iter().map(|s| s.to_string()));
        args.push(out_path.to_string_lossy().into_owned());
        args
    }
}

#[derive(Clone, Debug)]
pub struct FfmpegSinkOpts {
    pub out_path: PathBuf,
    pub profile: EncoderProfile,
    /// Encoder executable, `ffmpeg` unless a test substitutes a stand-in.
    pub program: PathBuf,
}

impl FfmpegSinkOpts {
    pub fn new(out_path: impl Into<PathBuf>, profile: EncoderProfile) -> Self {
        Self {
            out_path: out_path.into(),
            profile,
            program: PathBuf::from("ffmpeg"),
        }
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

/// Owns one encoder process and the write end of its stdin.
///
/// The child is closed and waited on exactly once: by `end`, or by `Drop` if `end` never ran.
pub struct FfmpegSink {
    opts: FfmpegSinkOpts,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    cfg: Option<SinkConfig>,
    last_idx: Option<u64>,
    child_id: Option<u32>,
}

impl FfmpegSink {
    pub fn new(opts: FfmpegSinkOpts) -> Self {
        Self {
            opts,
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
            last_idx: None,
            child_id: None,
        }
    }

    pub fn out_path(&self) -> &Path {
        &self.opts.out_path
    }

    /// Process id of the most recently spawned encoder.
    pub fn child_id(&self) -> Option<u32> {
        self.child_id
    }

    fn close(&mut self) -> MatteResult<Option<(ExitStatus, Vec<u8>)>> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };
        let status = child
            .wait()
            .map_err(|e| MatteError::pipe(format!("failed to wait for encoder: {e}")))?;
        let stderr = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| MatteError::pipe("encoder stderr drain thread panicked"))?
                .map_err(|e| MatteError::pipe(format!("encoder stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        Ok(Some((status, stderr)))
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> MatteResult<()> {
        cfg.validate()?;
        if self.child.is_some() {
            return Err(MatteError::validation("encoder already started"));
        }
        ensure_parent_dir(&self.opts.out_path)?;

        let mut child = Command::new(&self.opts.program)
            .args(self.opts.profile.args(&cfg, &self.opts.out_path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                MatteError::pipe(format!(
                    "failed to spawn '{}' (is it installed and on PATH?): {e}",
                    self.opts.program.display()
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| MatteError::pipe("failed to open encoder stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MatteError::pipe("failed to open encoder stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        tracing::debug!(
            program = %self.opts.program.display(),
            out = %self.opts.out_path.display(),
            profile = ?self.opts.profile,
            "encoder started"
        );
        self.child_id = Some(child.id());
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: u64, frame: &PackedFrame) -> MatteResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| MatteError::validation("encoder not started"))?;
        if let Some(last) = self.last_idx
            && idx <= last
        {
            return Err(MatteError::validation("encoder received out-of-order frame index"));
        }
        if frame.dimensions() != (cfg.width, cfg.height) {
            return Err(MatteError::validation(format!(
                "frame size mismatch: got {:?}, expected {}x{}",
                frame.dimensions(),
                cfg.width,
                cfg.height
            )));
        }
        if frame.pix_fmt() != self.opts.profile.input_pix_fmt() {
            return Err(MatteError::validation(format!(
                "encoder expects {} frames, got {}",
                self.opts.profile.input_pix_fmt(),
                frame.pix_fmt()
            )));
        }
        self.last_idx = Some(idx);

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(MatteError::pipe("encoder input is already closed"));
        };
        stdin
            .write_all(frame.as_bytes())
            .map_err(|e| MatteError::pipe(format!("write of frame {idx} failed: {e}")))
    }

    fn end(&mut self) -> MatteResult<()> {
        let Some((status, stderr)) = self.close()? else {
            return Err(MatteError::validation("encoder not started"));
        };
        self.cfg = None;
        if !status.success() {
            return Err(MatteError::EncoderExitNonZero {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if self.child.is_some() {
            match self.close() {
                Ok(Some((status, _))) => {
                    tracing::debug!(%status, "encoder reaped on drop");
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "encoder cleanup failed"),
            }
        }
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> MatteResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
