use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dispatcher::{Dispatcher, InMemoryEngine};
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod serve;

/// Serve the debug protocol dispatcher over stdio or TCP
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Accept one TCP connection on this address instead of using stdio
    #[clap(short, long)]
    listen: Option<String>,

    /// Path to a TOML config file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Answer this command with an event of the same name (repeatable)
    #[clap(short, long = "event")]
    events: Vec<String>,
}

fn main() -> eyre::Result<()> {
    // stdout carries protocol traffic
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let _ = color_eyre::install();

    let args = Args::parse();
    tracing::debug!(?args, "parsed command line arguments");

    let config = config::resolve(args.config.as_deref())
        .wrap_err("loading configuration")?
        .with_overrides(args.listen, args.events);
    tracing::debug!(?config, "resolved configuration");

    let engine = Arc::new(InMemoryEngine::new());
    let dispatcher = Arc::new(Dispatcher::new(engine.clone()));
    commands::install(&dispatcher, &config);

    match config.listen.as_deref() {
        Some(addr) => serve::tcp(dispatcher, &engine, addr).wrap_err("serving over tcp"),
        None => serve::stdio(dispatcher, &engine).wrap_err("serving over stdio"),
    }
}
