//! Layers command - list append-container layers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::{CommandExecutor, ConfigArgs};

/// List the append layers stored after a carrier's own data.
#[derive(Args, Debug)]
pub struct LayersCommand {
    /// Carrier file to inspect
    #[arg(required = true)]
    pub carrier: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl CommandExecutor for LayersCommand {
    fn execute(&self) -> Result<()> {
        let codec = self.config.codec()?;
        let layers = codec
            .layers(&self.carrier)
            .with_context(|| format!("Failed to read {}", self.carrier.display()))?;

        if layers.is_empty() {
            println!("No layers in {}", self.carrier.display());
            return Ok(());
        }

        println!("{} layer(s) in {}", layers.len(), self.carrier.display());
        for layer in &layers {
            let id = layer
                .layer_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  #{:<2} offset {:>10}  length {:>8}  {}  {}",
                layer.layer_number,
                layer.offset,
                layer.length,
                if layer.is_encrypted() { "encrypted" } else { "plain    " },
                id
            );
        }
        Ok(())
    }
}
