//! Capacity command - report how much a carrier can hold.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use stegcodec::Method;

use super::{CommandExecutor, ConfigArgs};

/// Report the embedding plan and usable capacity of a carrier.
#[derive(Args, Debug)]
pub struct CapacityCommand {
    /// Carrier file to measure
    #[arg(required = true)]
    pub carrier: PathBuf,

    /// Embedding method: lsb, dwt or append
    #[arg(long)]
    pub method: Option<Method>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl CommandExecutor for CapacityCommand {
    fn execute(&self) -> Result<()> {
        let codec = self.config.codec()?;
        let report = codec
            .capacity(&self.carrier, self.method)
            .with_context(|| format!("Failed to measure {}", self.carrier.display()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("Carrier: {} ({:?})", self.carrier.display(), report.kind);
        println!("Method:  {}", report.plan.method());
        match (report.plan.capacity_bits(), report.payload_bytes) {
            (Some(bits), Some(bytes)) => {
                println!("Capacity: {} bits (~{} payload bytes)", bits, bytes);
            }
            _ => println!("Capacity: unbounded (append container)"),
        }
        Ok(())
    }
}
