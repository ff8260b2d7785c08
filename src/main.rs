#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use cli::Cli;
use clap::Parser;
use tracing_subscriber::{filter::Directive, EnvFilter};

fn main() -> Result<()> {
    let directive: Directive = "vit_transfer=info".parse()?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .init();

    let cli = Cli::parse();
    cli.run()
}
