use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use mattecut::{Tunables, WorkerInvocation, worker::child::InpaintWorker};

/// Inpaint worker: reconstructs the masked region of every frame and reports
/// `PROGRESS:<f>` lines on stdout.
#[derive(Parser, Debug)]
#[command(name = "mattecut-inpaint", version)]
struct Cli {
    #[command(flatten)]
    invocation: WorkerInvocation,

    /// Tunables JSON; missing keys use defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let tunables = match &cli.config {
        Some(path) => match Tunables::from_path(path) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("error: {e}");
                return ExitCode::from(e.exit_code());
            }
        },
        None => Tunables::default(),
    };

    let mut worker = InpaintWorker::new(tunables, std::io::stdout().lock());
    match worker.run(&cli.invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
