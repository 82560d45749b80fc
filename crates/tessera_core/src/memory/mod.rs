//! # Byte Buffer Access
//!
//! Bounds-checked writers and readers over plain byte slices.
//!
//! ## Design Philosophy
//!
//! GPU-bound data is placed by byte offset, but never through pointer casts:
//! - Every write is checked against the end of the target slice
//! - Values are copied as `bytemuck::Pod`, so bit patterns survive exactly
//! - A failed access leaves the buffer untouched

mod byte_writer;

pub use byte_writer::{align_up, ByteReader, ByteWriter};
