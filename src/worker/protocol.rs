use std::{ffi::OsString, path::PathBuf};

/// Prefix of the only machine-readable worker stdout line.
pub const PROGRESS_PREFIX: &str = "PROGRESS:";

/// Arguments of one inpaint worker process.
#[derive(clap::Args, Clone, Debug, PartialEq, Eq)]
pub struct WorkerInvocation {
    /// Source video.
    #[arg(long)]
    pub input: PathBuf,
    /// Static mask image; non-zero pixels are reconstructed.
    #[arg(long)]
    pub mask: PathBuf,
    /// Final artifact path.
    #[arg(long)]
    pub output: PathBuf,
    /// ProRes video with PCM audio instead of MPEG-4 with AAC.
    #[arg(long = "mov")]
    pub professional: bool,
}

impl WorkerInvocation {
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--input".into(),
            self.input.clone().into(),
            "--mask".into(),
            self.mask.clone().into(),
            "--output".into(),
            self.output.clone().into(),
        ];
        if self.professional {
            args.push("--mov".into());
        }
        args
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum WorkerEvent {
    Progress(f64),
    /// Any other line, passed through verbatim.
    Log(String),
}

pub fn format_progress(fraction: f64) -> String {
    format!("{PROGRESS_PREFIX}{:.4}", fraction.clamp(0.0, 1.0))
}

/// Strict parse: `PROGRESS:` at column 0 followed by a finite float in `[0,1]`.
pub fn parse_line(line: &str) -> WorkerEvent {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX)
        && let Ok(v) = rest.parse::<f64>()
        && v.is_finite()
        && (0.0..=1.0).contains(&v)
    {
        return WorkerEvent::Progress(v);
    }
    WorkerEvent::Log(line.to_string())
}
