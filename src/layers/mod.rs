//! Append-container layering.
//!
//! Framed payloads are appended after the carrier's own bytes, which stay
//! byte-identical. Up to [`MAX_LAYERS`] numbered layers can share a carrier,
//! each with its own password. A trailing [`LayerIndex`] speeds up lookup and
//! is rewritten on every add.

pub mod index;

use tracing::{debug, warn};

use crate::crypto::{normalize_password, password_hash};
use crate::error::StegoError;
use crate::frame::{
    frame, read_metadata, unframe, FrameError, FrameOptions, Magic, Payload, Unframed,
    END_MARKER, LAYER_MAGIC_PREFIX, LEGACY_MAGIC, MAX_LAYER_NUMBER,
};

pub use index::{LayerDescriptor, LayerIndex, INDEX_MAGIC};

/// Numbered layers a carrier may hold. A legacy layer 0 does not count.
pub const MAX_LAYERS: usize = MAX_LAYER_NUMBER as usize;

/// Result of opening one layer with a password.
#[derive(Debug, Clone)]
pub enum LayerMatch {
    Matched(Box<Unframed>),
    /// The password does not belong to this layer. Not an error: other
    /// layers may still match.
    PasswordMismatch,
}

impl LayerMatch {
    pub fn into_unframed(self) -> Option<Unframed> {
        match self {
            LayerMatch::Matched(u) => Some(*u),
            LayerMatch::PasswordMismatch => None,
        }
    }
}

/// Lists the layers in `carrier`, ordered by offset.
///
/// Uses the trailing index when it is present and consistent, otherwise
/// scans the bytes for layer and legacy magics.
pub fn detect_layers(carrier: &[u8]) -> Vec<LayerDescriptor> {
    if let Some((start, index)) = LayerIndex::find_trailing(carrier) {
        if index.is_consistent(carrier, start) {
            return index.layers;
        }
        warn!(index_offset = start, "layer index disagrees with carrier bytes; scanning");
    }
    scan_layers(carrier)
}

/// Offset where the original carrier ends: the first layer, the index, or
/// the end of the file.
pub fn carrier_len(carrier: &[u8]) -> usize {
    let layers = detect_layers(carrier);
    if let Some(first) = layers.first() {
        return first.offset as usize;
    }
    LayerIndex::find_trailing(carrier)
        .map(|(start, _)| start)
        .unwrap_or(carrier.len())
}

fn scan_layers(carrier: &[u8]) -> Vec<LayerDescriptor> {
    let mut found = Vec::new();
    let mut pos = 0usize;
    while pos + LEGACY_MAGIC.len() <= carrier.len() {
        let window = &carrier[pos..];
        let candidate = window.starts_with(LAYER_MAGIC_PREFIX) || window.starts_with(&LEGACY_MAGIC);
        if candidate {
            if let Some(descriptor) = descriptor_at(carrier, pos) {
                debug!(
                    layer = descriptor.layer_number,
                    offset = pos,
                    length = descriptor.length,
                    "layer found by scan"
                );
                pos += descriptor.length as usize;
                found.push(descriptor);
                continue;
            }
        }
        pos += 1;
    }
    found
}

/// Validates a full layer frame starting at `offset`.
fn descriptor_at(carrier: &[u8], offset: usize) -> Option<LayerDescriptor> {
    let bytes = &carrier[offset..];
    let magic = Magic::parse(bytes)?;
    if !magic.has_end_marker() {
        return None;
    }
    let (layout, metadata) = read_metadata(bytes).ok()?;
    let total = layout.total_len();
    if bytes.get(total - END_MARKER.len()..total)? != END_MARKER {
        return None;
    }
    Some(LayerDescriptor {
        layer_number: magic.layer_number(),
        layer_id: metadata.layer_id,
        password_hash: metadata.password_hash,
        offset: offset as u64,
        length: total as u64,
    })
}

/// Next free layer number, or `LayerLimitExceeded`.
pub fn next_layer_number(layers: &[LayerDescriptor]) -> Result<u8, StegoError> {
    let numbered = layers.iter().filter(|l| !l.is_legacy()).count();
    let highest = layers.iter().map(|l| l.layer_number).max().unwrap_or(0);
    if numbered >= MAX_LAYERS || highest >= MAX_LAYER_NUMBER {
        return Err(StegoError::LayerLimitExceeded { max: MAX_LAYERS });
    }
    Ok(highest + 1)
}

/// Appends an already framed layer and rewrites the index.
///
/// The bytes of the original carrier and of existing layers are copied
/// unchanged.
pub fn add_layer(carrier: &[u8], framed: &[u8]) -> Result<Vec<u8>, StegoError> {
    let magic = Magic::parse(framed).ok_or(StegoError::NotFound)?;
    if !magic.has_end_marker() {
        return Err(StegoError::CorruptContainer(
            "embedded frames cannot be appended as layers".into(),
        ));
    }
    let (layout, metadata) = read_metadata(framed)?;
    if layout.total_len() != framed.len() {
        return Err(StegoError::CorruptContainer(format!(
            "layer frame declares {} bytes but {} were given",
            layout.total_len(),
            framed.len()
        )));
    }

    let mut layers = detect_layers(carrier);
    if !matches!(magic, Magic::Legacy) {
        let numbered = layers.iter().filter(|l| !l.is_legacy()).count();
        if numbered >= MAX_LAYERS {
            return Err(StegoError::LayerLimitExceeded { max: MAX_LAYERS });
        }
    }

    let body_end = LayerIndex::find_trailing(carrier)
        .map(|(start, _)| start)
        .unwrap_or(carrier.len());

    let mut out = Vec::with_capacity(body_end + framed.len() + 512);
    out.extend_from_slice(&carrier[..body_end]);
    layers.push(LayerDescriptor {
        layer_number: magic.layer_number(),
        layer_id: metadata.layer_id,
        password_hash: metadata.password_hash,
        offset: out.len() as u64,
        length: framed.len() as u64,
    });
    out.extend_from_slice(framed);
    out.extend_from_slice(&LayerIndex::new(layers).encode()?);

    debug!(
        layer = magic.layer_number(),
        offset = body_end,
        length = framed.len(),
        "layer appended"
    );
    Ok(out)
}

/// Frames `payload` as the next free layer and appends it.
pub fn push_layer(
    carrier: &[u8],
    payload: &Payload,
    password: Option<&str>,
    carrier_ext: Option<String>,
) -> Result<(Vec<u8>, LayerDescriptor), StegoError> {
    let layer_number = next_layer_number(&detect_layers(carrier))?;
    let framed = frame(payload, password, &FrameOptions::layer(layer_number, carrier_ext))?;
    let out = add_layer(carrier, &framed)?;
    let descriptor = LayerIndex::find_trailing(&out)
        .and_then(|(_, index)| index.layers.into_iter().last())
        .ok_or_else(|| StegoError::CorruptContainer("layer index missing after append".into()))?;
    Ok((out, descriptor))
}

/// Opens one layer.
///
/// The password must belong to the layer: a hash mismatch, a password for an
/// unencrypted layer, or no password for an encrypted one all give
/// [`LayerMatch::PasswordMismatch`].
pub fn extract_layer(
    carrier: &[u8],
    descriptor: &LayerDescriptor,
    password: Option<&str>,
) -> Result<LayerMatch, StegoError> {
    let password = normalize_password(password);
    let bytes = carrier.get(descriptor.range()).ok_or_else(|| {
        StegoError::CorruptContainer(format!(
            "layer {} at {}+{} overruns carrier of {} bytes",
            descriptor.layer_number,
            descriptor.offset,
            descriptor.length,
            carrier.len()
        ))
    })?;

    let (_, metadata) = read_metadata(bytes)?;
    let mismatch = match (metadata.encrypted, password) {
        (false, Some(_)) | (true, None) => true,
        (true, Some(pw)) => descriptor
            .password_hash
            .as_deref()
            .is_some_and(|h| !h.eq_ignore_ascii_case(&password_hash(pw))),
        (false, None) => false,
    };
    if mismatch {
        return Ok(LayerMatch::PasswordMismatch);
    }

    match unframe(bytes, password) {
        Ok(unframed) => Ok(LayerMatch::Matched(Box::new(unframed))),
        Err(FrameError::DecryptionFailed) => Ok(LayerMatch::PasswordMismatch),
        Err(e) => Err(e.into()),
    }
}

/// Every layer the password opens, in file order.
pub fn extract_layers(carrier: &[u8], password: Option<&str>) -> Result<Vec<Unframed>, StegoError> {
    let mut out = Vec::new();
    for descriptor in detect_layers(carrier) {
        if let Some(unframed) = extract_layer(carrier, &descriptor, password)?.into_unframed() {
            out.push(unframed);
        }
    }
    Ok(out)
}

/// Re-appends the layers of `source` onto `target`, preserving their bytes.
pub fn transplant_layers(source: &[u8], target: Vec<u8>) -> Result<Vec<u8>, StegoError> {
    let mut out = target;
    for descriptor in detect_layers(source) {
        let framed = source.get(descriptor.range()).ok_or_else(|| {
            StegoError::CorruptContainer(format!("layer {} overruns carrier", descriptor.layer_number))
        })?;
        out = add_layer(&out, framed)?;
    }
    Ok(out)
}
