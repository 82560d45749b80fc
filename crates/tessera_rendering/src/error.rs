//! Error types for the rendering half of Tessera.

use std::path::PathBuf;

use tessera_core::StoreError;
use thiserror::Error;

/// Failures reported by a [`GpuBackend`](crate::backend::GpuBackend).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The device refused to allocate a buffer.
    #[error("buffer `{label}` of {size} bytes could not be created: {reason}")]
    BufferCreation {
        /// Debug label of the buffer.
        label: String,
        /// Requested size in bytes.
        size: u64,
        /// Backend-specific reason.
        reason: String,
    },

    /// A map or bind range does not fit inside its buffer.
    #[error("range {offset}+{size} outside buffer of {capacity} bytes")]
    RangeOutOfBounds {
        /// Start of the range.
        offset: u64,
        /// Length of the range.
        size: u64,
        /// Buffer size.
        capacity: u64,
    },

    /// The buffer already has an open mapping.
    #[error("buffer {0} is already mapped")]
    AlreadyMapped(u64),

    /// `unmap` was called on a buffer without an open mapping.
    #[error("buffer {0} is not mapped")]
    NotMapped(u64),

    /// The handle does not name a live buffer.
    #[error("unknown buffer {0}")]
    UnknownBuffer(u64),

    /// The device could not create a fence.
    #[error("fence creation failed: {0}")]
    FenceCreation(String),
}

/// Configuration loading and validation failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`TesseraConfig`](crate::config::TesseraConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its allowed range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything the frame orchestrator can fail with.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Graphics backend failure.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Byte-level write failure while assembling or uploading.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;
