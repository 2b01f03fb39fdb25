//! Patchbay CLI - relay server and headless patch client.

mod commands;
mod repl;
mod session;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "patchbay")]
#[command(author, version, about = "Collaborative patcher relay and client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a relay that keeps the shared patch documents
    Serve(commands::serve::ServeArgs),

    /// Join a session and edit the patch from the terminal
    Play(commands::play::PlayArgs),

    /// List the object classes the engine knows
    Objects(commands::objects::ObjectsArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never mix with the command output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::Objects(args) => commands::objects::run(args),
    }
}
