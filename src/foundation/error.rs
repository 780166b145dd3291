use std::path::PathBuf;

pub type MatteResult<T> = Result<T, MatteError>;

#[derive(thiserror::Error, Debug)]
pub enum MatteError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("input not found: '{}'", .0.display())]
    InputNotFound(PathBuf),

    #[error("decode failure: {0}")]
    DecodeFailure(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("encoder pipe broken: {0}")]
    PipeBroken(String),

    #[error("encoder exited with status {status}: {stderr}")]
    EncoderExitNonZero { status: String, stderr: String },

    #[error("audio remux exited with status {status} (silent video kept at '{}', log: {log})", .kept.display())]
    RemuxExitNonZero {
        status: String,
        log: String,
        kept: PathBuf,
    },

    #[error("transient read glitch: {0}")]
    TransientReadGlitch(String),

    #[error("cancelled")]
    Cancelled,

    #[error("worker exited with code {code:?}: {detail}")]
    WorkerFailed { code: Option<i32>, detail: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MatteError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeFailure(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    pub fn pipe(msg: impl Into<String>) -> Self {
        Self::PipeBroken(msg.into())
    }

    pub fn glitch(msg: impl Into<String>) -> Self {
        Self::TransientReadGlitch(msg.into())
    }

    /// Whether the failure may clear up if the same read is attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientReadGlitch(_))
    }

    /// Process exit code used by the inpaint worker for this failure kind.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InputNotFound(_) => 2,
            Self::DecodeFailure(_) => 3,
            Self::PipeBroken(_) => 4,
            Self::RemuxExitNonZero { .. } => 5,
            Self::EncoderExitNonZero { .. } => 6,
            _ => 1,
        }
    }
}
