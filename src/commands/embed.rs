//! Embed command - hide a message or file inside a carrier.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use stegcodec::{EmbedRequest, EmbeddingPlan, Method, PayloadSource};

use super::{CommandExecutor, ConfigArgs};

/// Hide a message or file inside a carrier.
///
/// The method defaults by extension: lsb for PNG/BMP/TIFF and video,
/// dwt for WAV, append for everything else.
#[derive(Args, Debug)]
pub struct EmbedCommand {
    /// Carrier file to hide data in
    #[arg(short, long)]
    pub carrier: PathBuf,

    /// Text message to hide (mutually exclusive with --file)
    #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
    pub message: Option<String>,

    /// File to hide (mutually exclusive with --message)
    #[arg(short, long, conflicts_with = "message")]
    pub file: Option<PathBuf>,

    /// Password; omit for an unencrypted payload
    #[arg(short, long)]
    pub password: Option<String>,

    /// Output path (default: <carrier>_stego.<ext>)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Embedding method: lsb, dwt or append
    #[arg(long)]
    pub method: Option<Method>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl CommandExecutor for EmbedCommand {
    fn execute(&self) -> Result<()> {
        let payload = match (&self.message, &self.file) {
            (Some(msg), None) => PayloadSource::Bytes(msg.as_bytes().to_vec()),
            (None, Some(path)) => PayloadSource::Path(path.clone()),
            _ => bail!("Either --message or --file must be provided"),
        };

        let mut request = EmbedRequest::new(&self.carrier, payload);
        request.password = self.password.clone();
        request.output_path = self.output.clone();
        request.method = self.method;

        let codec = self.config.codec()?;
        let report = codec
            .embed(&request)
            .with_context(|| format!("Failed to embed into {}", self.carrier.display()))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("Embedded with {} into {}", report.method, report.output_path.display());
        println!("  Bytes written: {}", report.bytes_written);
        match &report.plan {
            EmbeddingPlan::PixelDomain {
                params,
                frames_used,
                capacity_bits,
            } => {
                println!(
                    "  Redundancy {} / spacing {}, {} frame(s), capacity {} bits",
                    params.redundancy, params.spacing, frames_used, capacity_bits
                );
            }
            EmbeddingPlan::TransformDomain {
                bands_used,
                capacity_bits,
                ..
            } => {
                println!("  Bands used {:?}, capacity {} bits", bands_used, capacity_bits);
            }
            EmbeddingPlan::AppendContainer { layer_number } => {
                println!("  Layer {}", layer_number);
            }
        }
        if self.password.is_none() {
            eprintln!("Warning: no password given, payload is stored unencrypted");
        }
        Ok(())
    }
}
