//! Binary crate for the `whatweather` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Logging setup
//! - Interactive configuration
//! - Human-friendly status output

use clap::Parser;

mod cli;
mod logging;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    logging::init_logging(cmd.verbose);
    cmd.run().await
}
