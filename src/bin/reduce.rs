//! `reduce` / `info` CLI surface (spec §6), built with `clap` derive the way
//! `alexdrgpy06-ClioBulk-X` structures its own binary's argument surface,
//! with an `indicatif` progress bar driving `pipeline::process`'s callback
//! the way `jaredvann-timepix-spidr-data-parser`'s `raw_data_parser` bin
//! reports progress over a long detector-frame conversion run.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use ued_reduce::geometry::{BeamBlock, Center};
use ued_reduce::pipeline::{self, process, CancellationToken, ReduceOptions};
use ued_reduce::store::{Compression, OpenMode, ProcessedStore, SampleType};
use ued_reduce::{RawCorpus, ReduceError};

#[derive(Parser)]
#[command(
    name = "reduce",
    about = "Raw-data reduction pipeline for time-resolved electron diffraction exposures"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level passed to the tracing subscriber (error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Reduce a raw corpus directory into a processed store.
    Reduce {
        raw_dir: PathBuf,
        out_file: PathBuf,

        /// Beam center, `X,Y`.
        #[arg(long, value_parser = parse_center)]
        center: Center,

        /// Beam-block rectangle, `x1,x2,y1,y2`.
        #[arg(long = "beam-block", value_parser = parse_beam_block, default_value = "0,0,0,0")]
        beam_block: BeamBlock,

        #[arg(long = "sample-type", value_parser = parse_sample_type, default_value = "single-crystal")]
        sample_type: SampleType,

        /// Expected ring radius in pixels, used by the center finder when `--cc` is set.
        #[arg(long, default_value_t = 50.0)]
        radius: f64,

        /// Enable per-frame drift correction via the center finder.
        #[arg(long)]
        cc: bool,

        #[arg(long, default_value_t = pipeline::default_workers())]
        workers: usize,

        #[arg(long, default_value_t = ued_reduce::centerfind::DEFAULT_WINDOW)]
        window: i64,

        #[arg(long, default_value_t = ued_reduce::centerfind::DEFAULT_RING_WIDTH)]
        ring: f64,

        #[arg(long, value_parser = parse_compression, default_value = "lzf")]
        compress: Compression,
    },
    /// Print the metadata of a processed store.
    Info { out_file: PathBuf },
}

fn parse_center(s: &str) -> Result<Center, String> {
    let parts: Vec<&str> = s.split(',').collect();
    let [x, y] = parts.as_slice() else {
        return Err(format!("expected \"X,Y\", got {s:?}"));
    };
    let cx: f64 = x.trim().parse().map_err(|_| format!("invalid x coordinate in {s:?}"))?;
    let cy: f64 = y.trim().parse().map_err(|_| format!("invalid y coordinate in {s:?}"))?;
    Ok(Center::new(cx, cy))
}

fn parse_beam_block(s: &str) -> Result<BeamBlock, String> {
    let parts: Vec<&str> = s.split(',').collect();
    let [x1, x2, y1, y2] = parts.as_slice() else {
        return Err(format!("expected \"x1,x2,y1,y2\", got {s:?}"));
    };
    let parse_one = |tok: &str| tok.trim().parse::<usize>().map_err(|_| format!("invalid integer in {s:?}"));
    Ok(BeamBlock::new(parse_one(x1)?, parse_one(x2)?, parse_one(y1)?, parse_one(y2)?))
}

fn parse_sample_type(s: &str) -> Result<SampleType, String> {
    SampleType::parse(s).map_err(|err| err.to_string())
}

fn parse_compression(s: &str) -> Result<Compression, String> {
    Compression::parse(s).map_err(|err| err.to_string())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Reduce {
            raw_dir,
            out_file,
            center,
            beam_block,
            sample_type,
            radius,
            cc,
            workers,
            window,
            ring,
            compress,
        } => run_reduce(RunReduceArgs {
            raw_dir,
            out_file,
            center,
            beam_block,
            sample_type,
            radius,
            cc,
            workers,
            window,
            ring,
            compress,
        }),
        Command::Info { out_file } => run_info(out_file),
    }
}

struct RunReduceArgs {
    raw_dir: PathBuf,
    out_file: PathBuf,
    center: Center,
    beam_block: BeamBlock,
    sample_type: SampleType,
    radius: f64,
    cc: bool,
    workers: usize,
    window: i64,
    ring: f64,
    compress: Compression,
}

fn run_reduce(args: RunReduceArgs) -> ExitCode {
    let corpus = match RawCorpus::open(&args.raw_dir) {
        Ok(corpus) => corpus,
        Err(err) => {
            eprintln!("error opening raw corpus: {err}");
            return ExitCode::from(3);
        }
    };

    let options = ReduceOptions {
        center: args.center,
        radius: args.radius,
        beam_block: args.beam_block,
        sample_type: args.sample_type,
        compression: args.compress,
        drift_correct: args.cc,
        window: args.window,
        ring_width: args.ring,
        workers: args.workers,
    };

    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% ({elapsed_precise})") {
        bar.set_style(style);
    }

    let cancellation = CancellationToken::new();
    let result = process(
        &corpus,
        &args.out_file,
        &options,
        |percent| bar.set_position(percent as u64),
        &cancellation,
    );
    bar.finish_and_clear();

    match result {
        Ok(path) => {
            println!("wrote {}", path.display());
            ExitCode::from(0)
        }
        Err(err @ ReduceError::StoreError(_)) => {
            eprintln!("store error: {err}");
            ExitCode::from(4)
        }
        Err(err) => {
            eprintln!("reduction failed: {err}");
            ExitCode::from(3)
        }
    }
}

fn run_info(out_file: PathBuf) -> ExitCode {
    let store = match ProcessedStore::open(&out_file, OpenMode::Read) {
        Ok(store) => store,
        Err(err) => {
            eprintln!("error opening store: {err}");
            return ExitCode::from(4);
        }
    };
    let meta = match store.read_global_metadata() {
        Ok(meta) => meta,
        Err(err) => {
            eprintln!("error reading metadata: {err}");
            return ExitCode::from(4);
        }
    };

    println!("resolution:       {}x{}", meta.resolution.height, meta.resolution.width);
    println!("center:           ({:.2}, {:.2})", meta.center.cx, meta.center.cy);
    println!(
        "beam block:       x[{}, {}) y[{}, {})",
        meta.beam_block.x1, meta.beam_block.x2, meta.beam_block.y1, meta.beam_block.y2
    );
    println!("sample type:      {}", meta.sample_type.as_str());
    println!("acquisition date: {}", meta.acquisition_date);
    println!("fluence:          {}", meta.fluence);
    println!("current:          {}", meta.current);
    println!("exposure:         {}", meta.exposure);
    println!("energy:           {}", meta.energy);
    println!("scans:            {:?}", meta.scans);
    println!("time points:      {:?}", meta.time_points_str);
    if !meta.notes.is_empty() {
        println!("notes:            {}", meta.notes);
    }
    if let Ok(true) = store.is_incomplete() {
        println!("WARNING: dataset is marked incomplete");
    }

    ExitCode::from(0)
}
