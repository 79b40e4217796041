//! Prune-cache command - drop expired video staging entries.

use anyhow::{Context, Result};
use clap::Args;

use super::{CommandExecutor, ConfigArgs};

/// Remove staged video frames older than the retention window.
#[derive(Args, Debug)]
pub struct PruneCacheCommand {
    /// Retention in days (overrides the configured value)
    #[arg(long)]
    pub days: Option<u32>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl CommandExecutor for PruneCacheCommand {
    fn execute(&self) -> Result<()> {
        let mut config = self.config.load()?;
        if let Some(days) = self.days {
            config.staging.retention_days = days;
        }
        let codec = stegcodec::StegoCodec::new(config).context("Failed to initialize codec")?;
        let report = codec.prune_cache().context("Failed to prune staging cache")?;

        println!("Staging cache: {}", codec.cache().root().display());
        println!(
            "  Removed {} entr{} and {} pending dir(s)",
            report.removed_entries,
            if report.removed_entries == 1 { "y" } else { "ies" },
            report.removed_pending
        );
        Ok(())
    }
}
