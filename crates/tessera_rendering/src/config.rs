//! # Renderer Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! ring_slots = 3
//! initial_atlas_capacity = 1048576
//! alignment = 256
//!
//! [growth]
//! threshold = 0.9
//! factor = 0.25
//!
//! [fence]
//! attempt_timeout_ns = 1000000
//! warn_every_attempts = 1000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of physical buffers in the upload ring.
pub const DEFAULT_RING_SLOTS: usize = 3;

/// Default atlas and ring slot capacity (1 MiB).
pub const DEFAULT_ATLAS_CAPACITY: u64 = 1 << 20;

/// When and how much the atlas grows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrowthConfig {
    /// Fraction of capacity a sweep may demand before growth is scheduled.
    pub threshold: f64,
    /// Fraction of the current capacity added on growth.
    pub factor: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            threshold: 0.9,
            factor: 0.25,
        }
    }
}

/// Fence wait behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FenceWaitConfig {
    /// Timeout of a single wait attempt, in nanoseconds.
    pub attempt_timeout_ns: u64,
    /// A stalled wait logs a warning every this many attempts.
    pub warn_every_attempts: u32,
}

impl Default for FenceWaitConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ns: 1_000_000,
            warn_every_attempts: 1000,
        }
    }
}

/// Top-level renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TesseraConfig {
    /// Number of physical upload buffers (frames in flight).
    pub ring_slots: usize,
    /// Starting capacity of the atlas and of every ring slot, in bytes.
    pub initial_atlas_capacity: u64,
    /// Segment alignment override. `None` uses the backend's minimum
    /// binding alignment.
    pub alignment: Option<u64>,
    /// Growth policy.
    pub growth: GrowthConfig,
    /// Fence wait policy.
    pub fence: FenceWaitConfig,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            ring_slots: DEFAULT_RING_SLOTS,
            initial_atlas_capacity: DEFAULT_ATLAS_CAPACITY,
            alignment: None,
            growth: GrowthConfig::default(),
            fence: FenceWaitConfig::default(),
        }
    }
}

impl TesseraConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the
    /// same errors as [`TesseraConfig::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_slots == 0 {
            return Err(ConfigError::Invalid("ring_slots must be at least 1".into()));
        }
        if self.initial_atlas_capacity == 0 {
            return Err(ConfigError::Invalid(
                "initial_atlas_capacity must be greater than 0".into(),
            ));
        }
        if let Some(alignment) = self.alignment {
            validate_alignment(alignment)?;
        }
        let threshold = self.growth.threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "growth.threshold must be in (0, 1], got {threshold}"
            )));
        }
        let factor = self.growth.factor;
        if !(factor > 0.0 && factor.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "growth.factor must be positive, got {factor}"
            )));
        }
        if self.fence.attempt_timeout_ns == 0 {
            return Err(ConfigError::Invalid(
                "fence.attempt_timeout_ns must be greater than 0".into(),
            ));
        }
        if self.fence.warn_every_attempts == 0 {
            return Err(ConfigError::Invalid(
                "fence.warn_every_attempts must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Segment alignments must be non-zero powers of two.
pub(crate) fn validate_alignment(alignment: u64) -> Result<(), ConfigError> {
    if alignment.is_power_of_two() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "alignment must be a power of two, got {alignment}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config = TesseraConfig::from_toml_str("").unwrap();
        assert_eq!(config, TesseraConfig::default());
        assert_eq!(config.ring_slots, 3);
        assert_eq!(config.fence.attempt_timeout_ns, 1_000_000);
    }

    #[test]
    fn test_full_document() {
        let config = TesseraConfig::from_toml_str(
            r#"
            ring_slots = 2
            initial_atlas_capacity = 4096
            alignment = 64

            [growth]
            threshold = 0.5
            factor = 1.0

            [fence]
            attempt_timeout_ns = 500
            warn_every_attempts = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.ring_slots, 2);
        assert_eq!(config.alignment, Some(64));
        assert!((config.growth.factor - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.fence.warn_every_attempts, 10);
    }

    #[test]
    fn test_rejects_bad_values() {
        for source in [
            "ring_slots = 0",
            "initial_atlas_capacity = 0",
            "alignment = 48",
            "alignment = 0",
            "[growth]\nthreshold = 1.5",
            "[growth]\nfactor = 0.0",
            "[fence]\nattempt_timeout_ns = 0",
            "[fence]\nwarn_every_attempts = 0",
        ] {
            assert!(
                matches!(TesseraConfig::from_toml_str(source), Err(ConfigError::Invalid(_))),
                "{source}"
            );
        }
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(matches!(
            TesseraConfig::from_toml_str("ring_slot = 3"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = TesseraConfig::load("/nonexistent/tessera.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
