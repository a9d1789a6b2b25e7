//! crustomize CLI entry point
//!
//! Parses arguments, sets up logging and runs the command. Failures are shown
//! through the user-friendly error display and exit with status 1.

use anyhow::Result;
use clap::Parser;
use crustomize::cli;
use crustomize::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.build_config().init_logging();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
