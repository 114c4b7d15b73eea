//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use weft_core::core::interrupt;

mod commands;

#[derive(Parser)]
#[command(name = "weft")]
#[command(version = "0.1")]
#[command(about = "Assembles streamed assistant responses into readable transcripts")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Replay a recorded SSE transcript and print the assembled document
    Replay {
        /// Transcript file, or `-` to read from stdin
        input: String,

        /// Emit the assembled conversation as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    interrupt::init();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Replay { input, json } => commands::replay::run(&input, json).await,
    }
}
