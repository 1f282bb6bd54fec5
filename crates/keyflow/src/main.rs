#![warn(missing_docs)]

//! Entry point for the `keyflow` binary.

mod check;
mod cli;
mod context;
mod engine;
mod error;
mod history;
mod next;
mod run;
mod serve;

use std::process;

use clap::Parser;
use tokio::runtime::{self, Runtime};
use tracing::error;

use crate::{
    cli::{Cli, Commands},
    context::Context,
    error::Result,
};

/// Print any error and exit non-zero.
fn main() {
    if let Err(err) = run() {
        error!("{err}");
        eprintln!("error: {err}");
        process::exit(1);
    }
}

/// Parse CLI arguments, install logging, and dispatch to the chosen subcommand.
fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log);
    let ctx = Context::load(&cli)?;

    match &cli.command {
        Commands::Check => check::run(&ctx),
        Commands::Next(args) => next::run(&ctx, args),
        Commands::History(args) => history::run(&ctx, args),
        Commands::Run(args) => build_runtime()?.block_on(run::run(&ctx, args)),
        Commands::Serve(args) => build_runtime()?.block_on(serve::run(&ctx, args)),
    }
}

/// Multi-threaded runtime for the async commands.
fn build_runtime() -> Result<Runtime> {
    Ok(runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
