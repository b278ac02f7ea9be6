//! # Engine Configuration
//!
//! The few knobs that are deliberately swappable: the oracle deadline, the
//! fixed-point threshold, and the warmth lexicon. Discovery confidence
//! bands are NOT here — they are compiled into `primitives` so that runs
//! stay reproducible across deployments.
//!
//! Config parsing is a pure transform; reading files is the caller's job.

use crate::primitives::{
    DEFAULT_FIXED_POINT_THRESHOLD, DEFAULT_ORACLE_TIMEOUT_MS, DEFAULT_WARMTH_LEXICON,
};
use crate::GeodeError;
use serde::{Deserialize, Serialize};

/// Runtime configuration for crystallization and the oracle boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Deadline for a single oracle call, in milliseconds.
    pub oracle_timeout_ms: u64,

    /// Oracle loss below which range endpoints count as a fixed point.
    pub fixed_point_threshold: f64,

    /// Lexical-signal set the WarmthRequirement law checks against.
    pub warmth_lexicon: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            oracle_timeout_ms: DEFAULT_ORACLE_TIMEOUT_MS,
            fixed_point_threshold: DEFAULT_FIXED_POINT_THRESHOLD,
            warmth_lexicon: DEFAULT_WARMTH_LEXICON.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl EngineConfig {
    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, GeodeError> {
        let config: Self =
            toml::from_str(text).map_err(|e| GeodeError::DeserializationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configs the engine cannot honor.
    pub fn validate(&self) -> Result<(), GeodeError> {
        if !(0.0..=1.0).contains(&self.fixed_point_threshold) {
            return Err(GeodeError::InvalidMark(
                "fixed_point_threshold outside [0, 1]".to_string(),
            ));
        }
        if self.warmth_lexicon.is_empty() {
            return Err(GeodeError::InvalidMark("empty warmth lexicon".to_string()));
        }
        if self.oracle_timeout_ms == 0 {
            return Err(GeodeError::InvalidMark("zero oracle timeout".to_string()));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
