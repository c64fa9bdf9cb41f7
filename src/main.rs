//! `weir` executable: a small CLI that runs one windowing operator over a file of
//! `timestamp value` pairs through the reference executor and prints what it emits.
//! Exists to give the processor runtime a driveable entry point outside its own test
//! suite; the actual host that would schedule a full DAG of these processors across
//! threads is out of scope here.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use weir_core::aggregate::summing_i64;
use weir_core::context::{Context, JobFuture};
use weir_core::item::{Edge, Watermark};
use weir_core::window::definition::WindowDefinition;
use weir_core::window::sliding::{FrameTs, SlidingWindow};
use weir_harness::run_to_completion;
use weir_logger::LoggerConfig;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level passed straight to `weir_logger::LoggerConfig::filter`.
    #[arg(long, default_value = "info")]
    log_filter: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sum a column of `timestamp value` pairs through a windowed aggregation.
    SumWindow {
        /// Path to a file with one `timestamp value` pair per line, sorted by timestamp.
        input: PathBuf,

        #[arg(long, value_enum, default_value = "tumbling")]
        mode: WindowMode,

        /// Frame size in the same time unit as the input timestamps.
        #[arg(long, default_value_t = 10)]
        frame_size: i64,

        /// Window size; only meaningful with `--mode sliding`, must be a multiple of
        /// `--frame-size`.
        #[arg(long, default_value_t = 10)]
        window_size: i64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum WindowMode {
    Tumbling,
    Sliding,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    weir_logger::init(&LoggerConfig {
        filter: cli.log_filter.clone(),
        ..LoggerConfig::default()
    });

    match &cli.command {
        Commands::SumWindow {
            input,
            mode,
            frame_size,
            window_size,
        } => match sum_window(input, *mode, *frame_size, *window_size) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                log::error!("{err}");
                ExitCode::FAILURE
            }
        },
    }
}

fn parse_events(input: &PathBuf) -> Result<Vec<(i64, i64)>, String> {
    let text = fs::read_to_string(input).map_err(|err| format!("reading {}: {err}", input.display()))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut parts = line.split_whitespace();
            let ts: i64 = parts
                .next()
                .ok_or_else(|| format!("malformed line {line:?}: missing timestamp"))?
                .parse()
                .map_err(|err| format!("malformed line {line:?}: {err}"))?;
            let value: i64 = parts
                .next()
                .ok_or_else(|| format!("malformed line {line:?}: missing value"))?
                .parse()
                .map_err(|err| format!("malformed line {line:?}: {err}"))?;
            Ok((ts, value))
        })
        .collect()
}

fn sum_window(input: &PathBuf, mode: WindowMode, frame_size: i64, window_size: i64) -> Result<(), String> {
    let events = parse_events(input)?;
    let last_ts = events.iter().map(|(ts, _)| *ts).max().unwrap_or(0);

    let window = match mode {
        WindowMode::Tumbling => WindowDefinition::tumbling(frame_size),
        WindowMode::Sliding => WindowDefinition::new(frame_size, window_size),
    };
    let op = summing_i64::<(i64, i64)>(|item| item.1);
    let processor = SlidingWindow::new(window, FrameTs::Event, |_: &(i64, i64)| 0i32, |item| item.0, op);

    let mut inputs: Vec<Edge<(i64, i64)>> = events.into_iter().map(Edge::Data).collect();
    inputs.push(Edge::Watermark(Watermark(last_ts + window_size.max(frame_size))));

    let context = Context::new("sum-window", 0, 1, false, JobFuture::new());
    let output = run_to_completion(processor, context, vec![inputs], false).map_err(|err| err.to_string())?;

    for item in output {
        match item {
            Edge::Data(entry) => println!("{}\t{}", entry.timestamp, entry.value),
            Edge::Watermark(wm) => log::debug!("watermark {}", wm.timestamp()),
        }
    }
    Ok(())
}
