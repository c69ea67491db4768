//! redline - contract review memory and redline tools

use anyhow::Result;
use clap::Parser;
use redline_core::cli::{self, Cli};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    let config = cli::load_config(&cli)?;
    let mut stdout = std::io::stdout().lock();
    Ok(cli::execute(cli.command, &config, &mut stdout)?)
}
