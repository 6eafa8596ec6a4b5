pub mod handlers;
pub mod macroman;

use crate::presentation::cli::Cli;
use clap::Parser;
use peel_core::error::Result;

pub fn run() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    handlers::handle_extract(cli.archive, cli.output_dir)
}
