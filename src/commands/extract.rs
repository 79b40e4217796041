//! Extract command - recover hidden payloads from a carrier.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use stegcodec::{Integrity, RecoveredPayload};

use super::{CommandExecutor, ConfigArgs};

/// Recover hidden payloads from a carrier.
///
/// Text payloads are printed. File payloads (or any payload when -o is given)
/// are written to disk; with several layers, -o names a directory.
#[derive(Args, Debug)]
pub struct ExtractCommand {
    /// Carrier file to read
    #[arg(short, long)]
    pub carrier: PathBuf,

    /// Password used at embed time
    #[arg(short, long)]
    pub password: Option<String>,

    /// Output file, or directory when several payloads are recovered
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub config: ConfigArgs,
}

impl CommandExecutor for ExtractCommand {
    fn execute(&self) -> Result<()> {
        let codec = self.config.codec()?;
        let extraction = codec
            .extract(&self.carrier, self.password.as_deref())
            .with_context(|| format!("Failed to extract from {}", self.carrier.display()))?;

        let many = extraction.payloads.len() > 1;
        for payload in &extraction.payloads {
            if let Integrity::Mismatch { .. } = payload.integrity {
                eprintln!(
                    "Warning: checksum mismatch on layer {}, data may be damaged",
                    payload.layer_number
                );
            }
            match (&self.output, payload.is_file) {
                (Some(out), _) if many => self.write_into_dir(out, payload)?,
                (Some(out), _) => write_payload(out, payload)?,
                (None, true) => {
                    let name = default_name(payload);
                    write_payload(Path::new(&name), payload)?;
                }
                (None, false) => match payload.text() {
                    Some(text) => println!("{text}"),
                    None => println!("{}", String::from_utf8_lossy(&payload.data)),
                },
            }
        }
        eprintln!(
            "Recovered {} payload(s) via {}",
            extraction.payloads.len(),
            extraction.method
        );
        Ok(())
    }
}

impl ExtractCommand {
    fn write_into_dir(&self, dir: &Path, payload: &RecoveredPayload) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        write_payload(&dir.join(default_name(payload)), payload)
    }
}

/// Metadata filename without directories, or `layer_<n>.bin`.
fn default_name(payload: &RecoveredPayload) -> String {
    payload
        .filename
        .as_deref()
        .and_then(|f| Path::new(f).file_name())
        .and_then(|f| f.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("layer_{}.bin", payload.layer_number))
}

fn write_payload(path: &Path, payload: &RecoveredPayload) -> Result<()> {
    fs::write(path, &payload.data)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    eprintln!("Wrote {} bytes to {}", payload.data.len(), path.display());
    Ok(())
}
