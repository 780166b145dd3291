//! Second pass: put the source's audio back onto a freshly encoded silent video.

use std::{
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use crate::{
    config::OutputFormat,
    encode::ffmpeg::ensure_parent_dir,
    foundation::error::{MatteError, MatteResult},
};

/// Codec choice for one remux.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemuxPlan {
    /// Video codec arguments; `["-c:v", "copy"]` unless the video must be transcoded.
    pub video_args: Vec<&'static str>,
    pub audio_codec: &'static str,
}

impl RemuxPlan {
    pub fn for_format(format: OutputFormat) -> Self {
        let audio_codec = match format {
            OutputFormat::AlphaWebM => "libvorbis",
            OutputFormat::AlphaMov => "pcm_s16le",
            OutputFormat::ColorKey | OutputFormat::ImageSequence => "aac",
        };
        Self {
            video_args: vec!["-c:v", "copy"],
            audio_codec,
        }
    }

    /// Inpaint worker output: plain MP4, or ProRes with PCM audio for editing.
    pub fn for_worker(professional: bool) -> Self {
        if professional {
            Self {
                video_args: vec!["-c:v", "prores", "-pix_fmt", "yuv422p10le"],
                audio_codec: "pcm_s16le",
            }
        } else {
            Self {
                video_args: vec!["-c:v", "copy"],
                audio_codec: "aac",
            }
        }
    }

    pub fn args(&self, silent: &Path, source: &Path, out: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.push("-i".into());
        args.push(silent.to_string_lossy().into_owned());
        args.push("-i".into());
        args.push(source.to_string_lossy().into_owned());
        args.extend(self.video_args.iter().map(|s| s.to_string()));
        args.extend(
            ["-map", "0:v:0", "-map", "1:a:0?", "-shortest", "-c:a", self.audio_codec]
                .map(String::from),
        );
        args.push(out.to_string_lossy().into_owned());
        args
    }
}

/// Runs the remux process.
#[derive(Clone, Debug)]
pub struct Remuxer {
    pub program: PathBuf,
}

impl Default for Remuxer {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
        }
    }
}

impl Remuxer {
    /// Mux video from `silent` and audio (if any) from `source` into `out`.
    ///
    /// On failure the partial `out` is removed, stderr is written to `log_path`, and `silent` is
    /// left untouched.
    pub fn remux(
        &self,
        plan: &RemuxPlan,
        silent: &Path,
        source: &Path,
        out: &Path,
        log_path: &Path,
    ) -> MatteResult<()> {
        ensure_parent_dir(out)?;
        let args = plan.args(silent, source, out);
        tracing::debug!(program = %self.program.display(), ?args, "remuxing audio");

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .output();
        let (status, stderr) = match output {
            Ok(o) if o.status.success() => {
                let _ = std::fs::remove_file(log_path);
                return Ok(());
            }
            Ok(o) => (
                o.status.to_string(),
                String::from_utf8_lossy(&o.stderr).into_owned(),
            ),
            Err(e) => ("not started".to_string(), format!("failed to spawn remux: {e}")),
        };

        if out.exists() {
            let _ = std::fs::remove_file(out);
        }
        let log_text = format!(
            "remux command: {} {}\n{}\n",
            self.program.display(),
            args.join(" "),
            stderr.trim()
        );
        if let Err(e) = std::fs::write(log_path, log_text) {
            tracing::warn!(path = %log_path.display(), error = %e, "could not write remux log");
        }
        tracing::warn!(%status, kept = %silent.display(), "remux failed");
        Err(MatteError::RemuxExitNonZero {
            status,
            log: log_path.display().to_string(),
            kept: silent.to_path_buf(),
        })
    }
}
