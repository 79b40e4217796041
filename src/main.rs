//! stegcodec - hide password-protected payloads in images, audio and video.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;

mod commands;

use commands::{
    CapacityCommand, CommandExecutor, EmbedCommand, ExtractCommand, LayersCommand,
    PruneCacheCommand,
};

/// stegcodec - hide password-protected payloads in media files
///
/// PNG/BMP/TIFF and video use redundant LSB embedding, WAV uses wavelet sign
/// coding, and any other file gets up to five appended layers.
#[derive(Parser)]
#[command(name = "stegcodec")]
#[command(version)]
#[command(about = "Hide password-protected payloads in images, audio, video and other files")]
struct Cli {
    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hide a message or file inside a carrier
    Embed(EmbedCommand),

    /// Recover hidden payloads from a carrier
    Extract(ExtractCommand),

    /// List append layers in a carrier
    Layers(LayersCommand),

    /// Report how much a carrier can hold
    Capacity(CapacityCommand),

    /// Remove expired video staging entries
    PruneCache(PruneCacheCommand),
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Embed(cmd) => cmd.execute(),
        Commands::Extract(cmd) => cmd.execute(),
        Commands::Layers(cmd) => cmd.execute(),
        Commands::Capacity(cmd) => cmd.execute(),
        Commands::PruneCache(cmd) => cmd.execute(),
    }
}
