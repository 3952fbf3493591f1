//! TileCache CLI - command-line interface
//!
//! This binary wires the tilecache library into a runnable service: an HTTP
//! tile endpoint and the offline custom-data rebuild command.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "tilecache",
    about = "Binary-format map tile cache and proxy",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP tile service.
    Serve(commands::serve::ServeArgs),
    /// Rebuild custom data for all stored tiles.
    Rebuild(commands::rebuild::RebuildArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tilecache::telemetry::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => commands::serve::run(args).await,
        Command::Rebuild(args) => commands::rebuild::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
