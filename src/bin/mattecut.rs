use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use mattecut::{
    CancelToken, CleanJob, EngineChoice, ExportEvent, ExportJob, ExportRequest, MaskCanvas,
    MaskSession, OutputFormat, OutputSpec, StreamingExporter, Tunables, WorkerCommand,
    WorkerEvent,
    media::{FrameSource as _, VideoReader, probe_video},
};

#[derive(Parser, Debug)]
#[command(name = "mattecut", version)]
struct Cli {
    /// Tunables JSON; missing keys use defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Force debug logging (otherwise `RUST_LOG`, default `info`).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove the background of a video (requires `ffmpeg` on PATH).
    Export(ExportArgs),
    /// Inpaint the masked region of a video in the worker process.
    Clean(CleanArgs),
    /// Replay a mask session on the first frame and write the flattened mask as PNG.
    Mask(MaskArgs),
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Recorded mask session to force foreground and seed tracking.
    #[arg(long)]
    session: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = FormatArg::ColorKey)]
    format: FormatArg,

    #[arg(long, value_enum, default_value_t = EngineArg::Segmenter)]
    engine: EngineArg,

    /// Model name for `--engine matting`.
    #[arg(long, default_value = mattecut::matte::backend::BORDER_MATTING_MODEL)]
    model: String,

    /// Confidence below which the matte is cut to zero, in [0,1].
    #[arg(long, default_value_t = 0.5)]
    threshold: f32,

    /// Feather kernel size; even values are rounded up to odd, 0 disables.
    #[arg(long, default_value_t = 5)]
    feather: u32,
}

#[derive(Parser, Debug)]
struct CleanArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Recorded mask session marking the region to reconstruct.
    #[arg(long)]
    session: PathBuf,

    /// Write ProRes MOV with PCM audio.
    #[arg(long)]
    mov: bool,

    /// Worker executable; defaults to `mattecut-inpaint` next to this binary.
    #[arg(long)]
    worker: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct MaskArgs {
    /// Input video.
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long)]
    session: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    ColorKey,
    AlphaWebm,
    AlphaMov,
    ImageSequence,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::ColorKey => Self::ColorKey,
            FormatArg::AlphaWebm => Self::AlphaWebM,
            FormatArg::AlphaMov => Self::AlphaMov,
            FormatArg::ImageSequence => Self::ImageSequence,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EngineArg {
    Segmenter,
    Matting,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);
    let tunables = match &cli.config {
        Some(path) => Tunables::from_path(path)?,
        None => Tunables::default(),
    };
    match cli.cmd {
        Command::Export(args) => cmd_export(args, tunables),
        Command::Clean(args) => cmd_clean(args, tunables),
        Command::Mask(args) => cmd_mask(args, tunables),
    }
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Canvas showing the first frame of `input` with `session` replayed onto it.
fn canvas_from_session(
    input: &Path,
    session: &Path,
    tunables: &Tunables,
) -> anyhow::Result<MaskCanvas> {
    let session = MaskSession::from_path(session)?;
    let info = probe_video(input)?;
    let first = VideoReader::open(&info)?
        .read_frame()?
        .with_context(|| format!("'{}' has no frames", input.display()))?;
    let mut canvas = MaskCanvas::new(tunables);
    canvas.load(first);
    session.replay(&mut canvas)?;
    Ok(canvas)
}

fn cmd_export(args: ExportArgs, tunables: Tunables) -> anyhow::Result<()> {
    let engine = match args.engine {
        EngineArg::Segmenter => EngineChoice::Segmenter,
        EngineArg::Matting => EngineChoice::Matting { model: args.model },
    };
    let spec = OutputSpec::new(args.format.into(), engine, args.threshold, args.feather)?;

    let (manual_mask, track_points) = match &args.session {
        Some(session) => {
            let canvas = canvas_from_session(&args.in_path, session, &tunables)?;
            let manual = if canvas.has_manual_mask() {
                let frame = canvas
                    .current_frame()
                    .context("session canvas lost its frame")?;
                Some(canvas.flatten(frame.width(), frame.height())?)
            } else {
                None
            };
            (manual, canvas.track_points().to_vec())
        }
        None => (None, Vec::new()),
    };

    let job = ExportJob::spawn(
        StreamingExporter::new(tunables),
        ExportRequest {
            input: args.in_path,
            spec,
            manual_mask,
            track_points,
        },
    );
    let mut empty_frames = 0u64;
    for event in job.events().iter() {
        match event {
            ExportEvent::Status(text) => tracing::info!("{text}"),
            ExportEvent::Progress {
                frame,
                total,
                fraction,
                eta,
                ..
            } => {
                let eta = eta.map(|d| format!("{}s", d.as_secs())).unwrap_or_default();
                tracing::info!("{frame}/{total} ({:.0}%) {eta}", fraction * 100.0);
            }
            ExportEvent::EmptyMask { .. } => empty_frames += 1,
            ExportEvent::Truncated { frames, total } => {
                tracing::warn!(frames, total, "source failed early, output is truncated");
            }
        }
    }
    if empty_frames > 0 {
        tracing::warn!(empty_frames, "frames without detected foreground");
    }

    let out = job.join().result?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

fn cmd_clean(args: CleanArgs, tunables: Tunables) -> anyhow::Result<()> {
    let canvas = canvas_from_session(&args.in_path, &args.session, &tunables)?;
    let command = match args.worker {
        Some(program) => WorkerCommand::new(program),
        None => WorkerCommand::sibling()?,
    };
    let job = CleanJob::new(command, tunables);
    let out = job.run_canvas(
        &args.in_path,
        &canvas,
        args.mov,
        &CancelToken::new(),
        &mut |event| match event {
            WorkerEvent::Progress(f) => tracing::info!("{:.0}%", f * 100.0),
            WorkerEvent::Log(line) => tracing::info!(worker = %line),
        },
    )?;
    eprintln!("wrote {}", out.display());
    Ok(())
}

fn cmd_mask(args: MaskArgs, tunables: Tunables) -> anyhow::Result<()> {
    let canvas = canvas_from_session(&args.in_path, &args.session, &tunables)?;
    let frame = canvas
        .current_frame()
        .context("session canvas lost its frame")?;
    let mask = canvas.flatten(frame.width(), frame.height())?;

    if let Some(parent) = args.out.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    mask.save(&args.out)
        .with_context(|| format!("write png '{}'", args.out.display()))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
