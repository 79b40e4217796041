//! Command module - one struct per subcommand, each implementing `CommandExecutor`.

mod capacity;
mod embed;
mod extract;
mod layers;
mod prune_cache;

pub use capacity::CapacityCommand;
pub use embed::EmbedCommand;
pub use extract::ExtractCommand;
pub use layers::LayersCommand;
pub use prune_cache::PruneCacheCommand;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use stegcodec::{CodecConfig, StegoCodec};

/// Trait for command execution - Strategy pattern.
///
/// Each command struct holds its parsed arguments and implements
/// this trait to define its execution logic.
pub trait CommandExecutor {
    /// Executes the command with its parsed arguments.
    fn execute(&self) -> Result<()>;
}

/// Configuration source shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to a config.toml (defaults to the user config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> Result<CodecConfig> {
        match &self.config {
            Some(path) => CodecConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display())),
            None => CodecConfig::load().context("Failed to load config"),
        }
    }

    pub fn codec(&self) -> Result<StegoCodec> {
        StegoCodec::new(self.load()?).context("Failed to initialize codec")
    }
}
