// chatmimic
// Main entry point

use clap::Parser;
use std::process::ExitCode;

use chatmimic::cli::{self, Cli};
use chatmimic::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}
