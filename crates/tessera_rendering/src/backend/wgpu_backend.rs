//! `wgpu` backend.
//!
//! `wgpu` has no persistently mapped buffers for the render thread, so a
//! persistent request is served the same way as any other: a map stages into
//! a CPU vector and the unmap hands the bytes to
//! [`wgpu::Queue::write_buffer`]. Fences ride on
//! [`wgpu::Queue::on_submitted_work_done`]; waits drive the device with
//! non-blocking polls until the callback fires or the attempt times out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{BufferDesc, BufferRange, FenceStatus, GpuBackend};
use crate::error::BackendError;

/// A `wgpu` storage buffer owned by the ring.
#[derive(Debug)]
pub struct WgpuBuffer {
    id: u64,
    buffer: wgpu::Buffer,
}

impl WgpuBuffer {
    /// The underlying buffer, for bind group creation.
    #[must_use]
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// Completion flag set by the queue once every earlier submission is done.
#[derive(Debug)]
pub struct WgpuFence {
    done: Arc<AtomicBool>,
}

#[derive(Debug)]
struct PendingWrite {
    buffer: u64,
    offset: u64,
}

/// [`GpuBackend`] over a `wgpu` device and queue.
pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    next_buffer: u64,
    staging: Vec<u8>,
    pending: Option<PendingWrite>,
    bindings: HashMap<u32, (u64, BufferRange)>,
}

impl WgpuBackend {
    /// Wraps an existing device and queue.
    #[must_use]
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            next_buffer: 0,
            staging: Vec::new(),
            pending: None,
            bindings: HashMap::new(),
        }
    }

    /// The device buffers are created on.
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Turns the range recorded for `binding` into a [`wgpu::BufferBinding`].
    ///
    /// Returns `None` if nothing is bound there or the binding refers to a
    /// different buffer than `buffer`.
    #[must_use]
    pub fn buffer_binding<'a>(
        &self,
        binding: u32,
        buffer: &'a WgpuBuffer,
    ) -> Option<wgpu::BufferBinding<'a>> {
        let (id, range) = self.bindings.get(&binding)?;
        if *id != buffer.id {
            return None;
        }
        Some(wgpu::BufferBinding {
            buffer: &buffer.buffer,
            offset: range.offset,
            size: wgpu::BufferSize::new(range.size),
        })
    }
}

impl GpuBackend for WgpuBackend {
    type Buffer = WgpuBuffer;
    type Fence = WgpuFence;

    fn min_binding_alignment(&self) -> u64 {
        u64::from(self.device.limits().min_storage_buffer_offset_alignment)
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<WgpuBuffer, BackendError> {
        // write_buffer copies must be a multiple of COPY_BUFFER_ALIGNMENT
        let size = tessera_core::align_up(desc.size, wgpu::COPY_BUFFER_ALIGNMENT);
        let max = self.device.limits().max_buffer_size;
        if size > max {
            return Err(BackendError::BufferCreation {
                label: desc.label.to_owned(),
                size,
                reason: format!("exceeds device max_buffer_size of {max}"),
            });
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let id = self.next_buffer;
        self.next_buffer += 1;
        tracing::debug!(
            buffer = id,
            label = desc.label,
            size,
            staged = desc.persistent,
            "wgpu buffer created"
        );
        Ok(WgpuBuffer { id, buffer })
    }

    fn destroy_buffer(&mut self, buffer: WgpuBuffer) {
        self.bindings.retain(|_, (id, _)| *id != buffer.id);
        buffer.buffer.destroy();
    }

    fn map_range(
        &mut self,
        buffer: &WgpuBuffer,
        offset: u64,
        size: u64,
    ) -> Result<&mut [u8], BackendError> {
        if self.pending.is_some() {
            return Err(BackendError::AlreadyMapped(buffer.id));
        }
        let capacity = buffer.buffer.size();
        if offset.checked_add(size).map_or(true, |end| end > capacity) {
            return Err(BackendError::RangeOutOfBounds {
                offset,
                size,
                capacity,
            });
        }

        self.staging.clear();
        self.staging.resize(size as usize, 0);
        self.pending = Some(PendingWrite {
            buffer: buffer.id,
            offset,
        });
        Ok(&mut self.staging)
    }

    fn unmap(&mut self, buffer: &WgpuBuffer) -> Result<(), BackendError> {
        match self.pending.take() {
            Some(write) if write.buffer == buffer.id => {
                self.queue
                    .write_buffer(&buffer.buffer, write.offset, &self.staging);
                Ok(())
            }
            other => {
                self.pending = other;
                Err(BackendError::NotMapped(buffer.id))
            }
        }
    }

    fn bind_range(&mut self, binding: u32, buffer: &WgpuBuffer, range: BufferRange) {
        self.bindings.insert(binding, (buffer.id, range));
    }

    fn create_fence(&mut self) -> Result<WgpuFence, BackendError> {
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        self.queue
            .on_submitted_work_done(move || flag.store(true, Ordering::Release));
        Ok(WgpuFence { done })
    }

    fn wait_fence(&mut self, fence: &WgpuFence, timeout_ns: u64) -> FenceStatus {
        let deadline = Instant::now() + Duration::from_nanos(timeout_ns);
        loop {
            if fence.done.load(Ordering::Acquire) {
                return FenceStatus::Signaled;
            }
            let _ = self.device.poll(wgpu::Maintain::Poll);
            if fence.done.load(Ordering::Acquire) {
                return FenceStatus::Signaled;
            }
            if Instant::now() >= deadline {
                return FenceStatus::TimedOut;
            }
            std::thread::yield_now();
        }
    }

    fn destroy_fence(&mut self, fence: WgpuFence) {
        drop(fence);
    }
}
