use std::{
    fs::File,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "frameplot", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). Logs go to stderr.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert per-frame paths into equation JSON.
    Convert(ConvertArgs),
    /// Convert, then play the frames as JSON-lines sink events on stdout.
    Play(PlayArgs),
}

#[derive(Parser, Debug)]
struct CurveArgs {
    /// Input frames JSON (`{"000": "M0,0 C...", ...}`).
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Equation color (#RRGGBB).
    #[arg(long, default_value = "#000000")]
    color: String,

    /// Round coordinates to this many decimals.
    #[arg(long)]
    precision: Option<u8>,

    /// Convert frames in parallel.
    #[arg(long, default_value_t = false)]
    parallel: bool,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    #[command(flatten)]
    curve: CurveArgs,

    /// Output equations JSON. Defaults to stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    #[command(flatten)]
    curve: CurveArgs,

    /// Milliseconds each frame stays visible.
    #[arg(long, default_value_t = 2000)]
    dwell_ms: u64,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Convert(args) => cmd_convert(args),
        Command::Play(args) => cmd_play(args),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_frames(path: &Path) -> anyhow::Result<frameplot::RawFrames> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read frames '{}'", path.display()))?;
    let frames = frameplot::parse_raw_frames(&text).with_context(|| "parse frames JSON")?;
    Ok(frames)
}

fn convert_opts(args: &CurveArgs) -> anyhow::Result<frameplot::ConvertOpts> {
    Ok(frameplot::ConvertOpts {
        color: frameplot::HexColor::parse(&args.color)?,
        precision: args.precision,
        parallel: args.parallel,
        ..Default::default()
    })
}

fn convert(args: &CurveArgs) -> anyhow::Result<frameplot::EquationMap> {
    let frames = read_frames(&args.in_path)?;
    let opts = convert_opts(args)?;
    let (map, report) = frameplot::convert_with_report(&frames, &opts)?;

    let t = report.totals;
    eprintln!(
        "converted {} frames: {} curves, {} skipped ({} non-curve, {} degenerate, {} malformed), {} unparsable",
        map.len(),
        t.retained,
        t.skipped(),
        t.skipped_non_curve,
        t.skipped_degenerate,
        t.skipped_malformed,
        t.unparsable,
    );
    Ok(map)
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let map = convert(&args.curve)?;

    match &args.out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir '{}'", parent.display()))?;
            }
            let f = File::create(out).with_context(|| format!("create '{}'", out.display()))?;
            let mut w = BufWriter::new(f);
            serde_json::to_writer_pretty(&mut w, &map).with_context(|| "write equations")?;
            w.flush()?;
            eprintln!("wrote {}", out.display());
        }
        None => {
            let stdout = std::io::stdout();
            let mut w = stdout.lock();
            serde_json::to_writer_pretty(&mut w, &map).with_context(|| "write equations")?;
            writeln!(w)?;
        }
    }
    Ok(())
}

fn cmd_play(args: PlayArgs) -> anyhow::Result<()> {
    let opts = frameplot::PlaybackOpts::from_millis(args.dwell_ms)?;
    // A structurally broken batch never reaches the surface.
    let frames = convert(&args.curve)?.into_frames();

    let sink = frameplot::JsonLinesSink::new(std::io::stdout(), frameplot::Viewport::default())?;
    let scheduler = frameplot::PlaybackScheduler::new(sink);
    let report = scheduler.play(frames, &opts)?.wait();

    eprintln!(
        "played {}/{} frames in {} ms: {:?}",
        report.frames_presented,
        report.frames_total,
        report.elapsed.as_millis(),
        report.outcome
    );
    if let frameplot::PlaybackOutcome::Aborted(reason) = report.outcome {
        anyhow::bail!("playback aborted: {reason}");
    }
    Ok(())
}
