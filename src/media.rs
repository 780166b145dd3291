//! Source video access through the system `ffprobe`/`ffmpeg` binaries.

use std::{
    collections::VecDeque,
    io::Read,
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
    time::Duration,
};

use image::RgbImage;

use crate::{
    config::Tunables,
    foundation::error::{MatteError, MatteResult},
};

#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    /// Container frame count, or `duration * fps` when the container does not record one.
    pub frame_count: u64,
    pub duration_sec: f64,
    pub has_audio: bool,
}

impl VideoInfo {
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            0.0
        } else {
            f64::from(self.fps_num) / f64::from(self.fps_den)
        }
    }
}

pub fn probe_video(path: &Path) -> MatteResult<VideoInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        nb_frames: Option<String>,
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    if !path.exists() {
        return Err(MatteError::InputNotFound(path.to_path_buf()));
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| MatteError::decode(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(MatteError::decode(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| MatteError::decode(format!("ffprobe json parse failed: {e}")))?;
    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| MatteError::decode(format!("no video stream in '{}'", path.display())))?;
    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(MatteError::decode("missing video dimensions from ffprobe")),
    };
    let (fps_num, fps_den) = parse_ff_ratio(video.r_frame_rate.as_deref().unwrap_or("0/1"))
        .ok_or_else(|| MatteError::decode("invalid video r_frame_rate"))?;

    let duration_sec = video
        .duration
        .as_deref()
        .or(parsed.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);
    let fps = if fps_den == 0 {
        0.0
    } else {
        f64::from(fps_num) / f64::from(fps_den)
    };
    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| (duration_sec * fps).round().max(0.0) as u64);
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    Ok(VideoInfo {
        path: path.to_path_buf(),
        width,
        height,
        fps_num,
        fps_den,
        frame_count,
        duration_sec,
        has_audio,
    })
}

pub(crate) fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.trim().parse::<u32>().ok()?;
    let b = match parts.next() {
        Some(b) => b.trim().parse::<u32>().ok()?,
        None => 1,
    };
    if b == 0 || a == 0 {
        return None;
    }
    Some((a, b))
}

/// Sequential frame reader.
///
/// `Ok(None)` means no frame was available, either end of stream or a failed read; callers that
/// know the expected length decide which.
pub trait FrameSource {
    fn frame_size(&self) -> (u32, u32);

    fn read_frame(&mut self) -> MatteResult<Option<RgbImage>>;
}

/// Streams `rgb24` frames out of an `ffmpeg` decode process.
pub struct VideoReader {
    width: u32,
    height: u32,
    child: Child,
    stdout: ChildStdout,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    finished: bool,
}

impl VideoReader {
    pub fn open(info: &VideoInfo) -> MatteResult<Self> {
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&info.path)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MatteError::decode(format!("failed to spawn ffmpeg decoder: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MatteError::decode("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MatteError::decode("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        tracing::debug!(path = %info.path.display(), info.width, info.height, "decoder opened");
        Ok(Self {
            width: info.width,
            height: info.height,
            child,
            stdout,
            stderr_drain: Some(stderr_drain),
            finished: false,
        })
    }

    fn shutdown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let _ = self.child.kill();
        let _ = self.child.wait();
        if let Some(handle) = self.stderr_drain.take()
            && let Ok(Ok(bytes)) = handle.join()
            && !bytes.is_empty()
        {
            tracing::debug!(stderr = %String::from_utf8_lossy(&bytes).trim(), "decoder stderr");
        }
    }
}

impl FrameSource for VideoReader {
    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> MatteResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }
        let len = self.width as usize * self.height as usize * 3;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(MatteError::glitch(format!("decoder read failed: {e}"))),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        if filled < len {
            return Err(MatteError::glitch(format!(
                "short frame from decoder: {filled} of {len} bytes"
            )));
        }
        RgbImage::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| MatteError::decode("decoded frame has unexpected size"))
    }
}

impl Drop for VideoReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// In-memory frames, for tests and synthetic inputs.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    width: u32,
    height: u32,
    frames: VecDeque<RgbImage>,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        let (width, height) = frames.first().map(|f| f.dimensions()).unwrap_or((0, 0));
        Self {
            width,
            height,
            frames: frames.into(),
        }
    }
}

impl FrameSource for MemorySource {
    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn read_frame(&mut self) -> MatteResult<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }
}

/// Bounded retry for reads that come up empty well before the expected end of a source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
    /// Missing frames tolerated at the tail before an empty read counts as a failure.
    pub eos_slack: u64,
}

impl RetryPolicy {
    pub fn from_tunables(tunables: &Tunables) -> Self {
        Self {
            retries: tunables.read_retries,
            backoff: tunables.retry_backoff(),
            eos_slack: tunables.eos_slack,
        }
    }
}

#[derive(Debug)]
pub enum ReadOutcome {
    Frame(RgbImage),
    /// Genuine end of stream, or close enough to `total` that the tail is written off.
    End,
    /// Every retry failed; output should stop at the last good frame.
    Truncated,
}

/// Read the frame following `done` of `total` (0 when unknown), retrying transient failures.
///
/// The retry budget is per call, so it resets after every good frame.
pub fn read_with_retry(
    source: &mut dyn FrameSource,
    done: u64,
    total: u64,
    policy: RetryPolicy,
) -> MatteResult<ReadOutcome> {
    let mut failures = 0u32;
    loop {
        let read = match source.read_frame() {
            Ok(frame) => frame,
            Err(e) if e.is_retryable() => {
                tracing::debug!(frame = done, error = %e, "read glitch");
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(frame) = read {
            return Ok(ReadOutcome::Frame(frame));
        }

        let remaining = total.saturating_sub(done);
        if total == 0 || remaining <= policy.eos_slack {
            return Ok(ReadOutcome::End);
        }
        failures += 1;
        if failures > policy.retries {
            tracing::warn!(
                frame = done,
                total,
                retries = policy.retries,
                "source keeps failing, truncating output"
            );
            return Ok(ReadOutcome::Truncated);
        }
        tracing::debug!(frame = done, attempt = failures, "retrying read");
        std::thread::sleep(policy.backoff);
    }
}
