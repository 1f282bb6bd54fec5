//! Command-line interface definitions for keyflow.

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use logging::LogArgs;

/// Command-line interface for the `keyflow` binary.
#[derive(Parser, Debug)]
#[command(
    name = "keyflow",
    about = "Run keyboard and mouse automation flows on demand, by hotkey or on a schedule",
    version
)]
pub struct Cli {
    /// Logging controls shared across keyflow binaries.
    #[command(flatten)]
    pub log: LogArgs,

    /// Flow file (JSON or RON). Defaults to ~/.keyflow/flows.json.
    #[arg(long, global = true, value_name = "PATH")]
    pub flows: Option<PathBuf>,

    /// Settings file (JSON or RON). Defaults to ~/.keyflow/settings.ron if present.
    #[arg(long, global = true, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate flows, hotkey bindings and schedules.
    Check,
    /// Run one flow now with dry-run actions and print its run record.
    Run(RunArgs),
    /// Show the next fire time of every scheduled flow.
    Next(NextArgs),
    /// Summarize the run archive.
    History(HistoryArgs),
    /// Arm hotkeys and schedules and run until interrupted.
    Serve(ServeArgs),
}

/// Arguments for `run`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Flow id.
    #[arg(value_name = "FLOW")]
    pub flow: String,

    /// Give up waiting for the run after this long.
    #[arg(
        long,
        value_parser = humantime::parse_duration,
        default_value = "5m",
        value_name = "DURATION"
    )]
    pub timeout: Duration,

    /// Do not append the run to the archive.
    #[arg(long)]
    pub no_archive: bool,
}

/// Arguments for `next`.
#[derive(Args, Debug, Clone)]
pub struct NextArgs {
    /// Compute from this local time ("YYYY-MM-DD HH:MM") instead of now.
    #[arg(long, value_name = "TIME")]
    pub at: Option<String>,
}

/// Arguments for `history`.
#[derive(Args, Debug, Clone)]
pub struct HistoryArgs {
    /// Archive to read; defaults to the settings' log path.
    #[arg(long, value_name = "PATH")]
    pub archive: Option<PathBuf>,

    /// Show at most this many of the most recent runs.
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

/// Arguments for `serve`.
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Exit after this long instead of waiting for Ctrl-C.
    #[arg(long = "for", value_parser = humantime::parse_duration, value_name = "DURATION")]
    pub duration: Option<Duration>,

    /// Do not append runs to the archive.
    #[arg(long)]
    pub no_archive: bool,
}
