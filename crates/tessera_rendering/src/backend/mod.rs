//! # Graphics Backend Seam
//!
//! The ring and the orchestrator talk to the GPU only through [`GpuBackend`].
//! Two implementations ship with the crate:
//!
//! - [`HeadlessBackend`]: CPU memory buffers plus a simulated GPU timeline,
//!   used by tests and the soak binary
//! - [`WgpuBackend`]: `wgpu` storage buffers
//!
//! Buffers and fences are owned handles. Destroying one consumes it.

mod headless;
mod wgpu_backend;

pub use headless::{
    BackendEvent, GpuTimeline, HeadlessBackend, HeadlessBuffer, HeadlessFence,
    DEFAULT_HEADLESS_ALIGNMENT,
};
pub use wgpu_backend::{WgpuBackend, WgpuBuffer, WgpuFence};

use crate::error::BackendError;

/// Parameters for [`GpuBackend::create_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc<'a> {
    /// Debug label.
    pub label: &'a str,
    /// Size in bytes.
    pub size: u64,
    /// Ask for a buffer that can stay mapped across frames, where the API
    /// supports it.
    pub persistent: bool,
}

/// A byte range inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange {
    /// First byte.
    pub offset: u64,
    /// Length in bytes.
    pub size: u64,
}

impl BufferRange {
    /// One past the last byte.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Outcome of a single fence wait attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The GPU has finished every command submitted before the fence.
    Signaled,
    /// The attempt timed out; the fence may still signal later.
    TimedOut,
    /// The wait itself failed; the fence state is unknown.
    Failed,
}

/// Everything the upload path needs from a graphics API.
pub trait GpuBackend {
    /// Owned buffer handle.
    type Buffer;
    /// Owned fence handle.
    type Fence;

    /// Minimum offset alignment for binding a sub-range of a buffer.
    fn min_binding_alignment(&self) -> u64;

    /// Creates a buffer the CPU can write and shaders can read.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::BufferCreation`] if the device refuses.
    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<Self::Buffer, BackendError>;

    /// Releases a buffer.
    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    /// Opens `[offset, offset + size)` of `buffer` for writing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::RangeOutOfBounds`] if the range does not fit and
    /// [`BackendError::AlreadyMapped`] if a mapping is already open.
    fn map_range(
        &mut self,
        buffer: &Self::Buffer,
        offset: u64,
        size: u64,
    ) -> Result<&mut [u8], BackendError>;

    /// Closes the open mapping of `buffer`, making the written bytes visible
    /// to the GPU.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotMapped`] if no mapping is open.
    fn unmap(&mut self, buffer: &Self::Buffer) -> Result<(), BackendError>;

    /// Binds `range` of `buffer` to a shader binding point.
    fn bind_range(&mut self, binding: u32, buffer: &Self::Buffer, range: BufferRange);

    /// Inserts a fence after every command submitted so far.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::FenceCreation`] if the device refuses.
    fn create_fence(&mut self) -> Result<Self::Fence, BackendError>;

    /// Waits at most `timeout_ns` for `fence` to signal.
    fn wait_fence(&mut self, fence: &Self::Fence, timeout_ns: u64) -> FenceStatus;

    /// Releases a fence.
    fn destroy_fence(&mut self, fence: Self::Fence);
}
