//! The in-process side of a clean: write the mask, spawn the worker, follow its stdout.

use std::{
    ffi::OsString,
    io::{BufRead, BufReader, Read},
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::mpsc,
    time::Duration,
};

use anyhow::Context as _;
use image::GrayImage;

use crate::{
    canvas::MaskCanvas,
    config::Tunables,
    foundation::{
        cancel::CancelToken,
        error::{MatteError, MatteResult},
    },
    media, naming,
    worker::protocol::{WorkerEvent, WorkerInvocation, parse_line},
};

/// Name of the worker executable installed next to the main binary.
pub const WORKER_BIN: &str = "mattecut-inpaint";

const CANCEL_POLL: Duration = Duration::from_millis(50);

/// How to start the worker process; invocation arguments are appended after `leading_args`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub leading_args: Vec<OsString>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.leading_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The worker binary in the same directory as the running executable.
    pub fn sibling() -> MatteResult<Self> {
        let exe = std::env::current_exe().context("locate current executable")?;
        let dir = exe
            .parent()
            .ok_or_else(|| MatteError::validation("current executable has no parent directory"))?;
        let name = format!("{WORKER_BIN}{}", std::env::consts::EXE_SUFFIX);
        Ok(Self::new(dir.join(name)))
    }
}

/// Parent side of one inpaint run.
pub struct CleanJob {
    command: WorkerCommand,
    tunables: Tunables,
}

impl CleanJob {
    pub fn new(command: WorkerCommand, tunables: Tunables) -> Self {
        Self { command, tunables }
    }

    /// Flatten `canvas` at the source's native resolution and clean `input` with it.
    pub fn run_canvas(
        &self,
        input: &Path,
        canvas: &MaskCanvas,
        professional: bool,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(WorkerEvent),
    ) -> MatteResult<PathBuf> {
        let info = media::probe_video(input)?;
        let mask = canvas.flatten(info.width, info.height)?;
        self.run(input, &mask, professional, cancel, on_event)
    }

    /// Write `mask` next to the planned output, run the worker and return the output path.
    ///
    /// The mask file is removed only after the worker exits successfully.
    pub fn run(
        &self,
        input: &Path,
        mask: &GrayImage,
        professional: bool,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(WorkerEvent),
    ) -> MatteResult<PathBuf> {
        if !input.exists() {
            return Err(MatteError::InputNotFound(input.to_path_buf()));
        }
        let ext = if professional { "mov" } else { "mp4" };
        let output =
            naming::unique_output_path(&self.tunables.output_dir, Some(input), "Clean", ext)?;
        let mask_path = output.with_file_name(format!(
            "{}_mask.png",
            output
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        ));
        mask.save(&mask_path)
            .with_context(|| format!("write worker mask '{}'", mask_path.display()))?;

        let invocation = WorkerInvocation {
            input: input.to_path_buf(),
            mask: mask_path.clone(),
            output: output.clone(),
            professional,
        };
        self.spawn_and_follow(&invocation, cancel, on_event)?;

        if let Err(e) = std::fs::remove_file(&mask_path) {
            tracing::warn!(path = %mask_path.display(), error = %e, "could not remove worker mask");
        }
        Ok(output)
    }

    fn spawn_and_follow(
        &self,
        invocation: &WorkerInvocation,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(WorkerEvent),
    ) -> MatteResult<()> {
        tracing::info!(
            program = %self.command.program.display(),
            output = %invocation.output.display(),
            "starting inpaint worker"
        );
        let mut child = Command::new(&self.command.program)
            .args(&self.command.leading_args)
            .args(invocation.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| MatteError::WorkerFailed {
                code: None,
                detail: format!("failed to spawn '{}': {e}", self.command.program.display()),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| MatteError::WorkerFailed {
            code: None,
            detail: "failed to open worker stdout (unexpected)".to_string(),
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| MatteError::WorkerFailed {
            code: None,
            detail: "failed to open worker stderr (unexpected)".to_string(),
        })?;
        let stderr_drain = std::thread::spawn(move || {
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok::<_, std::io::Error>(bytes)
        });

        let (line_tx, line_rx) = mpsc::channel();
        let stdout_reader = std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                match line {
                    Ok(line) => {
                        if line_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "worker stdout read failed");
                        break;
                    }
                }
            }
        });

        // The worker may stay silent for a long time (remux), so the token is polled.
        let mut cancelled = false;
        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                tracing::info!("cancelling inpaint worker");
                let _ = child.kill();
                break;
            }
            match line_rx.recv_timeout(CANCEL_POLL) {
                Ok(line) => {
                    let event = parse_line(&line);
                    if let WorkerEvent::Log(text) = &event {
                        tracing::debug!(worker = %text);
                    }
                    on_event(event);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child.wait().context("wait for inpaint worker")?;
        drop(line_rx);
        if cancelled {
            // Descendants of a killed worker may still hold its pipes; the reader threads are
            // left to finish on their own.
            return Err(MatteError::Cancelled);
        }
        let _ = stdout_reader.join();
        let stderr = stderr_drain
            .join()
            .ok()
            .and_then(Result::ok)
            .map(|b| String::from_utf8_lossy(&b).trim().to_string())
            .unwrap_or_default();

        if !status.success() {
            let log = naming::log_path(&invocation.output);
            let detail = if stderr.is_empty() {
                format!("see '{}'", log.display())
            } else {
                format!("{stderr} (log: '{}')", log.display())
            };
            tracing::warn!(code = ?status.code(), "inpaint worker failed");
            return Err(MatteError::WorkerFailed {
                code: status.code(),
                detail,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/worker/parent.rs"]
mod tests;
