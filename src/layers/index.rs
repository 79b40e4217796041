//! Trailing layer index.
//!
//! Format: `STGINDEX ‖ u32be len ‖ json ‖ \0STGEND\0`, always the last bytes
//! of a layered carrier. The index is a lookup aid only: when it is missing
//! or disagrees with the bytes it describes, callers fall back to scanning.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StegoError;
use crate::frame::{Magic, END_MARKER, MAGIC_LEN};

/// Index magic.
pub const INDEX_MAGIC: [u8; MAGIC_LEN] = *b"STGINDEX";

pub const INDEX_VERSION: u32 = 1;

/// Location and identity of one append layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// 0 for a legacy frame, otherwise 1..=5.
    pub layer_number: u8,
    #[serde(default)]
    pub layer_id: Option<Uuid>,
    #[serde(default)]
    pub password_hash: Option<String>,
    /// Byte offset of the frame's magic.
    pub offset: u64,
    /// Frame length including its end marker.
    pub length: u64,
}

impl LayerDescriptor {
    pub fn range(&self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.length as usize
    }

    pub fn is_legacy(&self) -> bool {
        self.layer_number == 0
    }

    pub fn is_encrypted(&self) -> bool {
        self.password_hash.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerIndex {
    pub version: u32,
    pub layers: Vec<LayerDescriptor>,
}

impl LayerIndex {
    pub fn new(layers: Vec<LayerDescriptor>) -> Self {
        Self {
            version: INDEX_VERSION,
            layers,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, StegoError> {
        let json = serde_json::to_vec(self)?;
        let mut out = Vec::with_capacity(MAGIC_LEN + 4 + json.len() + MAGIC_LEN);
        out.extend_from_slice(&INDEX_MAGIC);
        out.extend_from_slice(&(json.len() as u32).to_be_bytes());
        out.extend_from_slice(&json);
        out.extend_from_slice(&END_MARKER);
        Ok(out)
    }

    /// Finds an index ending exactly at the end of `bytes`.
    ///
    /// Returns the index and the offset where it starts.
    pub fn find_trailing(bytes: &[u8]) -> Option<(usize, LayerIndex)> {
        if !bytes.ends_with(&END_MARKER) {
            return None;
        }
        let body_end = bytes.len() - MAGIC_LEN;
        let search_end = body_end.checked_sub(4)?;

        // The last INDEX_MAGIC whose declared length reaches the end marker.
        let mut pos = search_end.checked_sub(MAGIC_LEN)?;
        loop {
            if bytes[pos..pos + MAGIC_LEN] == INDEX_MAGIC {
                let len_at = pos + MAGIC_LEN;
                let len_bytes: [u8; 4] = bytes[len_at..len_at + 4].try_into().ok()?;
                let json_len = u32::from_be_bytes(len_bytes) as usize;
                if len_at + 4 + json_len == body_end {
                    let index: LayerIndex = serde_json::from_slice(&bytes[len_at + 4..body_end]).ok()?;
                    return Some((pos, index));
                }
            }
            pos = pos.checked_sub(1)?;
        }
    }

    /// Checks every descriptor against `bytes[..index_start]`: in bounds,
    /// ordered by offset, non-overlapping and starting with the right magic.
    pub fn is_consistent(&self, bytes: &[u8], index_start: usize) -> bool {
        if self.version != INDEX_VERSION {
            return false;
        }
        let mut prev_end = 0usize;
        for layer in &self.layers {
            let range = layer.range();
            if range.start < prev_end || range.end > index_start || layer.length < MAGIC_LEN as u64 {
                return false;
            }
            let expected = if layer.is_legacy() {
                Magic::Legacy
            } else {
                Magic::Layer(layer.layer_number)
            };
            if Magic::parse(&bytes[range.start..]) != Some(expected) {
                return false;
            }
            if !bytes[..range.end].ends_with(&END_MARKER) {
                return false;
            }
            prev_end = range.end;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(number: u8, offset: u64, length: u64) -> LayerDescriptor {
        LayerDescriptor {
            layer_number: number,
            layer_id: Some(Uuid::new_v4()),
            password_hash: None,
            offset,
            length,
        }
    }

    #[test]
    fn test_encode_and_find() {
        let index = LayerIndex::new(vec![descriptor(1, 10, 40)]);
        let mut bytes = vec![0u8; 100];
        bytes.extend_from_slice(&index.encode().unwrap());

        let (start, found) = LayerIndex::find_trailing(&bytes).unwrap();
        assert_eq!(start, 100);
        assert_eq!(found, index);
    }

    #[test]
    fn test_missing_index() {
        assert!(LayerIndex::find_trailing(b"just some carrier bytes").is_none());
        assert!(LayerIndex::find_trailing(&END_MARKER).is_none());
    }

    #[test]
    fn test_inconsistent_descriptor_is_rejected() {
        let mut bytes = b"carrier".to_vec();
        bytes.extend_from_slice(&Magic::Layer(1).bytes());
        bytes.extend_from_slice(b"body");
        bytes.extend_from_slice(&END_MARKER);
        let length = (bytes.len() - 7) as u64;

        let good = LayerIndex::new(vec![descriptor(1, 7, length)]);
        assert!(good.is_consistent(&bytes, bytes.len()));

        let wrong_number = LayerIndex::new(vec![descriptor(2, 7, length)]);
        assert!(!wrong_number.is_consistent(&bytes, bytes.len()));

        let out_of_bounds = LayerIndex::new(vec![descriptor(1, 7, length + 1)]);
        assert!(!out_of_bounds.is_consistent(&bytes, bytes.len()));
    }
}
