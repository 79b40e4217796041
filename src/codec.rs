//! The public entry point: [`StegoCodec`].
//!
//! Picks an embedding method from the carrier's extension (or the caller's
//! override), frames the payload, and delegates to the engine. Extraction
//! tries each method that may apply to the carrier kind, in a fixed order.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::capacity::{
    ensure_fits, payload_capacity_bytes, pixel_capacity_bits, suggest_audio_seconds_lsb, suggest_image_side,
};
use crate::config::CodecConfig;
use crate::error::StegoError;
use crate::frame::{frame, unframe, FrameOptions, Integrity, Payload, Unframed};
use crate::layers::{self, LayerDescriptor};
use crate::plan::{EmbeddingPlan, LsbParams, Method};
use crate::stego::{lsb, AudioCarrier, ImageCarrier, TransformCoder};
use crate::video::cache::PruneReport;
use crate::video::{FfmpegBackend, StagingCache, VideoBackend, VideoStego};

const IMAGE_EXTENSIONS: &[&str] = &["png", "bmp", "tif", "tiff"];
const AUDIO_EXTENSIONS: &[&str] = &["wav"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "webm"];

/// Carrier category, decided by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CarrierKind {
    Image,
    Audio,
    Video,
    /// Anything else, including JPEG, PDF and archives.
    Other,
}

impl CarrierKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = extension(path).unwrap_or_default();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            CarrierKind::Image
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            CarrierKind::Audio
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            CarrierKind::Video
        } else {
            CarrierKind::Other
        }
    }

    pub fn default_method(&self) -> Method {
        match self {
            CarrierKind::Image | CarrierKind::Video => Method::PixelDomain,
            CarrierKind::Audio => Method::TransformDomain,
            CarrierKind::Other => Method::AppendContainer,
        }
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Where the payload comes from.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

#[derive(Debug, Clone)]
pub struct EmbedRequest {
    pub carrier_path: PathBuf,
    pub payload: PayloadSource,
    pub password: Option<String>,
    /// Ignored for [`PayloadSource::Path`], which is always a file.
    pub is_file: bool,
    pub original_filename: Option<String>,
    pub mime: Option<String>,
    /// Defaults to `<stem>_stego.<ext>` next to the carrier.
    pub output_path: Option<PathBuf>,
    /// Overrides the carrier kind's default method.
    pub method: Option<Method>,
}

impl EmbedRequest {
    pub fn new(carrier_path: impl Into<PathBuf>, payload: PayloadSource) -> Self {
        Self {
            carrier_path: carrier_path.into(),
            payload,
            password: None,
            is_file: false,
            original_filename: None,
            mime: None,
            output_path: None,
            method: None,
        }
    }

    pub fn text(carrier_path: impl Into<PathBuf>, text: &str) -> Self {
        Self::new(carrier_path, PayloadSource::Bytes(text.as_bytes().to_vec()))
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output_path = Some(output.into());
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    fn output(&self) -> PathBuf {
        if let Some(out) = &self.output_path {
            return out.clone();
        }
        let stem = self
            .carrier_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("carrier");
        let name = match extension(&self.carrier_path) {
            Some(ext) => format!("{stem}_stego.{ext}"),
            None => format!("{stem}_stego"),
        };
        self.carrier_path.with_file_name(name)
    }

    fn load_payload(&self) -> Result<Payload, StegoError> {
        match &self.payload {
            PayloadSource::Bytes(data) => Ok(Payload {
                data: data.clone(),
                filename: self.original_filename.clone(),
                mime: self.mime.clone(),
                is_file: self.is_file,
            }),
            PayloadSource::Path(path) => {
                let data = fs::read(path)?;
                let filename = self.original_filename.clone().or_else(|| {
                    path.file_name()
                        .and_then(|n| n.to_str())
                        .map(str::to_string)
                });
                Ok(Payload {
                    data,
                    filename,
                    mime: self.mime.clone(),
                    is_file: true,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedReport {
    pub output_path: PathBuf,
    pub bytes_written: u64,
    pub method: Method,
    pub plan: EmbeddingPlan,
}

/// One recovered payload with its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredPayload {
    pub data: Vec<u8>,
    pub filename: Option<String>,
    pub mime: Option<String>,
    pub is_file: bool,
    pub layer_number: u8,
    pub carrier_ext: Option<String>,
    pub integrity: Integrity,
}

impl RecoveredPayload {
    /// The payload as text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl From<Unframed> for RecoveredPayload {
    fn from(u: Unframed) -> Self {
        Self {
            data: u.payload,
            filename: u.metadata.filename,
            mime: u.metadata.mime,
            is_file: u.metadata.is_file,
            layer_number: u.metadata.layer_number,
            carrier_ext: u.metadata.carrier_ext,
            integrity: u.integrity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub payloads: Vec<RecoveredPayload>,
    pub method: Method,
}

impl Extraction {
    fn single(unframed: Unframed, method: Method) -> Self {
        Self {
            payloads: vec![unframed.into()],
            method,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CapacityReport {
    pub kind: CarrierKind,
    pub plan: EmbeddingPlan,
    /// Approximate payload bytes after the frame header; `None` for the
    /// append container.
    pub payload_bytes: Option<usize>,
}

/// Keeps the first meaningful failure across extraction attempts.
///
/// Not-found results only surface when nothing else failed; the first one
/// wins so a staging miss keeps its fingerprint.
#[derive(Default)]
struct Attempts {
    first_error: Option<StegoError>,
    first_miss: Option<StegoError>,
}

impl Attempts {
    fn take(&mut self, result: Result<Extraction, StegoError>) -> Option<Extraction> {
        match result {
            Ok(extraction) => Some(extraction),
            Err(e) => {
                debug!(error = %e, "extraction attempt failed");
                let slot = if e.is_not_found() {
                    &mut self.first_miss
                } else {
                    &mut self.first_error
                };
                if slot.is_none() {
                    *slot = Some(e);
                }
                None
            }
        }
    }

    fn finish(self) -> Result<Extraction, StegoError> {
        Err(self
            .first_error
            .or(self.first_miss)
            .unwrap_or(StegoError::NotFound))
    }
}

/// Embeds payloads into, and extracts them from, carrier files.
pub struct StegoCodec {
    config: CodecConfig,
    backend: Box<dyn VideoBackend>,
    cache: StagingCache,
}

impl StegoCodec {
    /// Codec using `ffmpeg` from `PATH` and the configured staging directory.
    pub fn new(config: CodecConfig) -> Result<Self, StegoError> {
        config.validate()?;
        let cache = StagingCache::from_config(&config.staging)?;
        Ok(Self::with_backend(config, Box::new(FfmpegBackend::default()), cache))
    }

    pub fn with_backend(config: CodecConfig, backend: Box<dyn VideoBackend>, cache: StagingCache) -> Self {
        Self {
            config,
            backend,
            cache,
        }
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn cache(&self) -> &StagingCache {
        &self.cache
    }

    fn lsb_params(&self) -> LsbParams {
        LsbParams::from_config(&self.config)
    }

    fn video(&self) -> VideoStego<'_, dyn VideoBackend> {
        VideoStego::new(&*self.backend, &self.cache, self.config.staging.max_staged_frames)
    }

    pub fn embed(&self, request: &EmbedRequest) -> Result<EmbedReport, StegoError> {
        let carrier_path = &request.carrier_path;
        let kind = CarrierKind::from_path(carrier_path);
        let method = request.method.unwrap_or_else(|| kind.default_method());
        let payload = request.load_payload()?;
        let password = request.password.as_deref();
        let ext = extension(carrier_path);
        let output = request.output();

        info!(
            carrier = %carrier_path.display(),
            kind = ?kind,
            method = %method,
            payload_bytes = payload.data.len(),
            "embedding"
        );

        let plan = match (method, kind) {
            (Method::AppendContainer, _) => {
                let bytes = fs::read(carrier_path)?;
                let (out, descriptor) = layers::push_layer(&bytes, &payload, password, ext)?;
                fs::write(&output, out)?;
                EmbeddingPlan::AppendContainer {
                    layer_number: descriptor.layer_number,
                }
            }
            (Method::PixelDomain, CarrierKind::Image) => {
                let framed = frame(&payload, password, &FrameOptions::embedded(ext))?;
                self.embed_image(carrier_path, &output, &framed)?
            }
            (Method::PixelDomain, CarrierKind::Audio) => {
                let framed = frame(&payload, password, &FrameOptions::embedded(ext))?;
                self.embed_audio_lsb(carrier_path, &output, &framed)?
            }
            (Method::PixelDomain, CarrierKind::Video) => {
                let framed = frame(&payload, password, &FrameOptions::embedded(ext))?;
                let params = self.lsb_params();
                let outcome = self.video().embed(carrier_path, &output, &framed, &params, password)?;
                EmbeddingPlan::PixelDomain {
                    params,
                    frames_used: outcome.frames_used,
                    capacity_bits: outcome.capacity_bits,
                }
            }
            (Method::TransformDomain, CarrierKind::Audio) => {
                let framed = frame(&payload, password, &FrameOptions::embedded(ext))?;
                self.embed_audio_transform(carrier_path, &output, &framed)?
            }
            (method, kind) => {
                return Err(StegoError::UnsupportedCarrier(format!(
                    "{method} embedding is not available for {kind:?} carriers"
                )))
            }
        };

        let bytes_written = fs::metadata(&output)?.len();
        info!(output = %output.display(), bytes_written, "embed complete");
        Ok(EmbedReport {
            output_path: output,
            bytes_written,
            method,
            plan,
        })
    }

    fn embed_image(&self, input: &Path, output: &Path, framed: &[u8]) -> Result<EmbeddingPlan, StegoError> {
        let bytes = fs::read(input)?;
        let carrier = ImageCarrier::from_bytes(&bytes)?;
        let params = self.lsb_params();
        let required = framed.len() * 8;
        let capacity_bits = carrier.capacity_bits(&params);
        ensure_fits(required, capacity_bits, || {
            let side = suggest_image_side(required, &params);
            format!("use an image of at least {side}x{side} pixels")
        })?;

        let encoded = carrier.hide(framed, &params)?.encode()?;
        // Appended layers of the source survive re-encoding.
        let out = layers::transplant_layers(&bytes, encoded)?;
        fs::write(output, out)?;
        Ok(EmbeddingPlan::PixelDomain {
            params,
            frames_used: 1,
            capacity_bits,
        })
    }

    fn embed_audio_lsb(&self, input: &Path, output: &Path, framed: &[u8]) -> Result<EmbeddingPlan, StegoError> {
        let bytes = fs::read(input)?;
        let carrier = AudioCarrier::from_bytes(&bytes)?;
        let params = self.lsb_params();
        let required = framed.len() * 8;
        let capacity_bits = lsb::capacity_bits(carrier.samples(), &params);
        ensure_fits(required, capacity_bits, || {
            format!(
                "use audio of at least {:.1} seconds",
                suggest_audio_seconds_lsb(required, carrier.sample_rate(), carrier.channels(), &params)
            )
        })?;

        let mut samples = carrier.samples().to_vec();
        lsb::embed(&mut samples, &params, framed)?;
        let out = layers::transplant_layers(&bytes, carrier.with_samples(samples).to_wav_bytes()?)?;
        fs::write(output, out)?;
        Ok(EmbeddingPlan::PixelDomain {
            params,
            frames_used: 1,
            capacity_bits,
        })
    }

    fn embed_audio_transform(&self, input: &Path, output: &Path, framed: &[u8]) -> Result<EmbeddingPlan, StegoError> {
        let bytes = fs::read(input)?;
        let carrier = AudioCarrier::from_bytes(&bytes)?;
        let coder = TransformCoder::from(&self.config.transform);
        let capacity_bits = coder.capacity_bits(&carrier);
        let bands_used = coder.bands_used(&carrier, framed.len() * 8);

        let stego = coder.embed(&carrier, framed)?;
        let out = layers::transplant_layers(&bytes, stego.to_wav_bytes()?)?;
        fs::write(output, out)?;
        Ok(EmbeddingPlan::TransformDomain {
            params: coder.params,
            bands_used,
            capacity_bits,
        })
    }

    /// Recovers payloads from `carrier_path`.
    pub fn extract(&self, carrier_path: &Path, password: Option<&str>) -> Result<Extraction, StegoError> {
        let kind = CarrierKind::from_path(carrier_path);
        let mut attempts = Attempts::default();
        debug!(carrier = %carrier_path.display(), kind = ?kind, "extracting");

        if kind == CarrierKind::Video {
            let params = self.lsb_params();
            let staged = self
                .video()
                .extract(carrier_path, password, &params)
                .map(|u| Extraction::single(u, Method::PixelDomain));
            if let Some(found) = attempts.take(staged) {
                return Ok(found);
            }
        }

        let bytes = fs::read(carrier_path)?;
        match kind {
            CarrierKind::Image => {
                if let Some(found) = attempts.take(extract_layers(&bytes, password)) {
                    return Ok(found);
                }
                if let Some(found) = attempts.take(self.extract_image(&bytes, password)) {
                    return Ok(found);
                }
            }
            CarrierKind::Audio => {
                if let Some(found) = attempts.take(self.extract_audio_transform(&bytes, password)) {
                    return Ok(found);
                }
                if let Some(found) = attempts.take(self.extract_audio_lsb(&bytes, password)) {
                    return Ok(found);
                }
                if let Some(found) = attempts.take(extract_layers(&bytes, password)) {
                    return Ok(found);
                }
            }
            CarrierKind::Video | CarrierKind::Other => {
                if let Some(found) = attempts.take(extract_layers(&bytes, password)) {
                    return Ok(found);
                }
            }
        }
        attempts.finish()
    }

    fn extract_image(&self, bytes: &[u8], password: Option<&str>) -> Result<Extraction, StegoError> {
        let carrier = ImageCarrier::from_bytes(bytes)?;
        let (_, framed) = carrier.extract(&self.lsb_params())?;
        Ok(Extraction::single(unframe(&framed, password)?, Method::PixelDomain))
    }

    fn extract_audio_lsb(&self, bytes: &[u8], password: Option<&str>) -> Result<Extraction, StegoError> {
        let carrier = AudioCarrier::from_bytes(bytes)?;
        let (_, framed) = lsb::extract(carrier.samples(), &self.lsb_params())?;
        Ok(Extraction::single(unframe(&framed, password)?, Method::PixelDomain))
    }

    fn extract_audio_transform(&self, bytes: &[u8], password: Option<&str>) -> Result<Extraction, StegoError> {
        let carrier = AudioCarrier::from_bytes(bytes)?;
        let framed = TransformCoder::from(&self.config.transform).extract(&carrier)?;
        Ok(Extraction::single(unframe(&framed, password)?, Method::TransformDomain))
    }

    /// Reports how much the carrier can hold under `method` (or its default).
    pub fn capacity(&self, carrier_path: &Path, method: Option<Method>) -> Result<CapacityReport, StegoError> {
        let kind = CarrierKind::from_path(carrier_path);
        let method = method.unwrap_or_else(|| kind.default_method());
        let params = self.lsb_params();

        let plan = match (method, kind) {
            (Method::AppendContainer, _) => {
                let bytes = fs::read(carrier_path)?;
                EmbeddingPlan::AppendContainer {
                    layer_number: layers::next_layer_number(&layers::detect_layers(&bytes))?,
                }
            }
            (Method::PixelDomain, CarrierKind::Image) => {
                let carrier = ImageCarrier::from_file(carrier_path)?;
                EmbeddingPlan::PixelDomain {
                    params,
                    frames_used: 1,
                    capacity_bits: carrier.capacity_bits(&params),
                }
            }
            (Method::PixelDomain, CarrierKind::Audio) => {
                let carrier = AudioCarrier::from_file(carrier_path)?;
                EmbeddingPlan::PixelDomain {
                    params,
                    frames_used: 1,
                    capacity_bits: pixel_capacity_bits(carrier.samples().len(), &params),
                }
            }
            (Method::PixelDomain, CarrierKind::Video) => {
                let (info, capacity_bits) = self.video().capacity(carrier_path, &params)?;
                EmbeddingPlan::PixelDomain {
                    params,
                    frames_used: info.frame_count.min(self.config.staging.max_staged_frames),
                    capacity_bits,
                }
            }
            (Method::TransformDomain, CarrierKind::Audio) => {
                let carrier = AudioCarrier::from_file(carrier_path)?;
                let coder = TransformCoder::from(&self.config.transform);
                let capacity_bits = coder.capacity_bits(&carrier);
                EmbeddingPlan::TransformDomain {
                    bands_used: coder.bands_used(&carrier, capacity_bits),
                    params: coder.params,
                    capacity_bits,
                }
            }
            (method, kind) => {
                return Err(StegoError::UnsupportedCarrier(format!(
                    "{method} embedding is not available for {kind:?} carriers"
                )))
            }
        };

        Ok(CapacityReport {
            kind,
            payload_bytes: plan.capacity_bits().map(payload_capacity_bytes),
            plan,
        })
    }

    /// Append layers present in the carrier.
    pub fn layers(&self, carrier_path: &Path) -> Result<Vec<LayerDescriptor>, StegoError> {
        Ok(layers::detect_layers(&fs::read(carrier_path)?))
    }

    /// Applies the configured retention to the staging cache.
    pub fn prune_cache(&self) -> Result<PruneReport, StegoError> {
        self.cache.prune(self.config.staging.retention_days)
    }
}

/// All append layers the password opens. Layers that exist but reject the
/// password yield `WrongPassword`.
fn extract_layers(bytes: &[u8], password: Option<&str>) -> Result<Extraction, StegoError> {
    let present = layers::detect_layers(bytes);
    if present.is_empty() {
        return Err(StegoError::NotFound);
    }
    let opened = layers::extract_layers(bytes, password)?;
    if opened.is_empty() {
        return Err(StegoError::WrongPassword);
    }
    Ok(Extraction {
        payloads: opened.into_iter().map(RecoveredPayload::from).collect(),
        method: Method::AppendContainer,
    })
}
