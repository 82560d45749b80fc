//! # Store Error Types
//!
//! Recoverable failures of the instance store and record access.
//!
//! Index misuse (`release` or field access outside `[0, count)`) is NOT an
//! error value: it breaks the compaction invariant and panics immediately.

use thiserror::Error;

use crate::record::{FieldId, FieldKind};
use crate::registry::MeshId;

/// Errors that can occur while manipulating instance records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The mesh already holds its maximum number of instances.
    ///
    /// The caller's occurrence is simply not drawn this frame.
    #[error("{mesh} is full: {max} instances")]
    CapacityExceeded {
        /// The mesh that refused the instance.
        mesh: MeshId,
        /// Its configured maximum instance count.
        max: u32,
    },

    /// The record layout has no such field.
    #[error("layout `{layout}` has no field {field:?}")]
    UnknownField {
        /// The requested field.
        field: FieldId,
        /// Name of the layout that was searched.
        layout: &'static str,
    },

    /// A value of the wrong kind was written to a field.
    #[error("field {field:?} holds {expected:?}, got {found:?}")]
    FieldKindMismatch {
        /// The field being written.
        field: FieldId,
        /// Kind declared by the layout.
        expected: FieldKind,
        /// Kind of the supplied value.
        found: FieldKind,
    },

    /// A whole record of another variant was written to the store.
    #[error("store holds `{expected}` records, got `{found}`")]
    LayoutMismatch {
        /// Layout of the store.
        expected: &'static str,
        /// Layout of the supplied record.
        found: &'static str,
    },

    /// A byte access fell outside its buffer.
    #[error("byte access out of bounds: offset {offset} + {len} > {capacity}")]
    OutOfBounds {
        /// Start of the access.
        offset: usize,
        /// Length of the access.
        len: usize,
        /// Size of the underlying buffer.
        capacity: usize,
    },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
