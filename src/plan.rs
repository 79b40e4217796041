//! Embedding plans.
//!
//! One tagged plan per strategy, selected once per carrier. A plan is always
//! recomputed from carrier properties and [`CodecConfig`]; extraction never
//! relies on a stored copy.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{CodecConfig, TransformConfig};

/// Where the framed bytes go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// LSB replacement across pixel channels, audio samples or video frames.
    PixelDomain,
    /// Sign coding of wavelet detail coefficients.
    TransformDomain,
    /// Bytes appended after the carrier's own data.
    AppendContainer,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::PixelDomain => "lsb",
            Method::TransformDomain => "dwt",
            Method::AppendContainer => "append",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lsb" | "pixel" => Ok(Method::PixelDomain),
            "dwt" | "transform" => Ok(Method::TransformDomain),
            "append" | "layer" => Ok(Method::AppendContainer),
            other => Err(format!("unknown method '{other}' (expected lsb, dwt or append)")),
        }
    }
}

/// Pixel-domain site layout: bit `k`, copy `j` lives at
/// `offset + (k * redundancy + j) * spacing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LsbParams {
    pub redundancy: usize,
    pub spacing: usize,
    pub offset: usize,
}

impl LsbParams {
    pub fn new(redundancy: usize, spacing: usize) -> Self {
        Self {
            redundancy,
            spacing,
            offset: 0,
        }
    }

    pub fn from_config(config: &CodecConfig) -> Self {
        Self::new(config.redundancy, config.spacing)
    }

    /// Sample index of copy `copy` of payload bit `bit`.
    #[inline]
    pub fn site(&self, bit: usize, copy: usize) -> usize {
        self.offset + (bit * self.redundancy + copy) * self.spacing
    }

    /// Samples a carrier needs to hold `bytes` framed bytes.
    pub fn samples_needed(&self, bytes: usize) -> usize {
        if bytes == 0 {
            return self.offset;
        }
        let last_bit = bytes * 8 - 1;
        self.site(last_bit, self.redundancy - 1) + 1
    }
}

/// Transform-domain layout derived from [`TransformConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformParams {
    pub levels: usize,
    pub bands: Vec<usize>,
    pub spacing: usize,
    pub edge_skip: usize,
    pub edge_fraction: f64,
}

impl From<&TransformConfig> for TransformParams {
    fn from(c: &TransformConfig) -> Self {
        Self {
            levels: c.levels,
            bands: c.bands.clone(),
            spacing: c.spacing,
            edge_skip: c.edge_skip,
            edge_fraction: c.edge_fraction,
        }
    }
}

/// A computed plan for one (carrier, strategy) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EmbeddingPlan {
    PixelDomain {
        params: LsbParams,
        /// Video frames touched (1 for still images and audio).
        frames_used: usize,
        capacity_bits: usize,
    },
    TransformDomain {
        params: TransformParams,
        /// Bands that receive at least one bit.
        bands_used: Vec<usize>,
        capacity_bits: usize,
    },
    AppendContainer {
        layer_number: u8,
    },
}

impl EmbeddingPlan {
    pub fn method(&self) -> Method {
        match self {
            EmbeddingPlan::PixelDomain { .. } => Method::PixelDomain,
            EmbeddingPlan::TransformDomain { .. } => Method::TransformDomain,
            EmbeddingPlan::AppendContainer { .. } => Method::AppendContainer,
        }
    }

    /// `None` for the append container, which has no fixed capacity.
    pub fn capacity_bits(&self) -> Option<usize> {
        match self {
            EmbeddingPlan::PixelDomain { capacity_bits, .. }
            | EmbeddingPlan::TransformDomain { capacity_bits, .. } => Some(*capacity_bits),
            EmbeddingPlan::AppendContainer { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_layout() {
        let p = LsbParams::new(3, 2);
        assert_eq!(p.site(0, 0), 0);
        assert_eq!(p.site(0, 2), 4);
        assert_eq!(p.site(1, 0), 6);
    }

    #[test]
    fn test_samples_needed() {
        let p = LsbParams::new(3, 1);
        // 1 byte = 8 bits * 3 copies
        assert_eq!(p.samples_needed(1), 24);
        let p = LsbParams::new(2, 3);
        // last site = (7*2 + 1) * 3 = 45
        assert_eq!(p.samples_needed(1), 46);
    }

    #[test]
    fn test_method_parse_and_display() {
        assert_eq!("lsb".parse::<Method>().unwrap(), Method::PixelDomain);
        assert_eq!("DWT".parse::<Method>().unwrap(), Method::TransformDomain);
        assert_eq!(Method::AppendContainer.to_string(), "append");
        assert!("zip".parse::<Method>().is_err());
    }

    #[test]
    fn test_plan_json_is_tagged() {
        let plan = EmbeddingPlan::AppendContainer { layer_number: 2 };
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"method\":\"append_container\""));
        assert_eq!(plan.capacity_bits(), None);
    }
}
