//! # Multi-Buffer Upload Ring
//!
//! `N` physical buffers used round-robin, one per frame. The CPU only writes a
//! slot after the fence recorded the last time that slot was used has
//! signaled, so the GPU never reads bytes the CPU is overwriting.
//!
//! ```text
//! frame:   0        1        2        3 (waits on fence of frame 0)
//! slot:   [0]      [1]      [2]      [0] ...
//! ```
//!
//! Slot lifecycle: `Idle → Writing → Submitted → (fence wait) → Idle`.

use tessera_core::ByteWriter;

use crate::backend::{BufferDesc, BufferRange, FenceStatus, GpuBackend};
use crate::config::FenceWaitConfig;
use crate::error::{BackendError, RenderResult};

/// Where a ring slot is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Free to write.
    Idle,
    /// Written this frame, fence not yet recorded.
    Writing,
    /// Handed to the GPU; a fence guards the next write.
    Submitted,
}

struct RingSlot<B: GpuBackend> {
    buffer: B::Buffer,
    fence: Option<B::Fence>,
    state: SlotState,
}

/// Round-robin set of fenced upload buffers.
pub struct MultiBufferRing<B: GpuBackend> {
    slots: Vec<RingSlot<B>>,
    current: usize,
    capacity: u64,
    wait: FenceWaitConfig,
}

impl<B: GpuBackend> MultiBufferRing<B> {
    /// Creates `slot_count` buffers of `capacity` bytes each.
    ///
    /// # Errors
    ///
    /// Returns the backend error if any buffer cannot be created; buffers
    /// created before the failure are destroyed.
    ///
    /// # Panics
    ///
    /// Panics if `slot_count` is zero.
    pub fn new(
        backend: &mut B,
        slot_count: usize,
        capacity: u64,
        fence: FenceWaitConfig,
    ) -> RenderResult<Self> {
        assert!(slot_count > 0, "ring needs at least one slot");
        let slots: Vec<RingSlot<B>> = create_slot_buffers(backend, slot_count, capacity)?
            .into_iter()
            .map(|buffer| RingSlot {
                buffer,
                fence: None,
                state: SlotState::Idle,
            })
            .collect();
        Ok(Self {
            slots,
            // the first advance lands on slot 0
            current: slot_count - 1,
            capacity,
            wait: fence,
        })
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Index of the active slot.
    #[inline]
    #[must_use]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Capacity of every slot in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// State of slot `index`.
    #[must_use]
    pub fn slot_state(&self, index: usize) -> SlotState {
        self.slots[index].state
    }

    /// True if slot `index` holds a fence not yet waited on.
    #[must_use]
    pub fn has_fence(&self, index: usize) -> bool {
        self.slots[index].fence.is_some()
    }

    /// Buffer of the active slot.
    #[must_use]
    pub fn active_buffer(&self) -> &B::Buffer {
        &self.slots[self.current].buffer
    }

    /// Advances to the next slot and waits until the GPU is done with it.
    ///
    /// Returns the number of wait attempts made (0 if the slot had no fence).
    /// The wait retries until the fence signals; a stall is reported with a
    /// warning every `warn_every_attempts` attempts.
    ///
    /// # Panics
    ///
    /// Panics if the slot is still open for writing.
    pub fn begin_frame(&mut self, backend: &mut B) -> u32 {
        self.current = (self.current + 1) % self.slots.len();
        let index = self.current;
        let slot = &mut self.slots[index];
        assert_ne!(
            slot.state,
            SlotState::Writing,
            "slot {index} reused while still being written"
        );

        let attempts = match slot.fence.take() {
            Some(fence) => {
                let attempts = wait_until_signaled(backend, &fence, &self.wait, index);
                backend.destroy_fence(fence);
                attempts
            }
            None => 0,
        };
        slot.state = SlotState::Idle;
        tracing::trace!(slot = index, attempts, "ring slot ready");
        attempts
    }

    /// Copies `bytes` into the start of the active slot.
    ///
    /// # Errors
    ///
    /// Returns the backend error if mapping fails; the slot stays idle.
    ///
    /// # Panics
    ///
    /// Panics if the slot has not been waited on this frame or `bytes` is
    /// larger than the slot.
    pub fn upload(&mut self, backend: &mut B, bytes: &[u8]) -> RenderResult<()> {
        let index = self.current;
        let slot = &mut self.slots[index];
        assert_eq!(
            slot.state,
            SlotState::Idle,
            "slot {index} written without waiting for its fence"
        );
        let len = bytes.len() as u64;
        assert!(
            len <= self.capacity,
            "upload of {len} bytes exceeds slot capacity {}",
            self.capacity
        );

        if !bytes.is_empty() {
            let mapped = backend.map_range(&slot.buffer, 0, len)?;
            let written = ByteWriter::new(mapped).write_bytes(bytes);
            backend.unmap(&slot.buffer)?;
            written?;
        }
        slot.state = SlotState::Writing;
        tracing::trace!(slot = index, bytes = len, "ring slot written");
        Ok(())
    }

    /// Binds `range` of the active slot to `binding`.
    ///
    /// # Panics
    ///
    /// Panics if the active slot was not written this frame or the range
    /// lies outside the slot.
    pub fn bind(&self, backend: &mut B, binding: u32, range: BufferRange) {
        let slot = &self.slots[self.current];
        assert_eq!(
            slot.state,
            SlotState::Writing,
            "bind on slot {} outside its frame",
            self.current
        );
        assert!(
            range.end() <= self.capacity,
            "bind range {range:?} outside slot capacity {}",
            self.capacity
        );
        backend.bind_range(binding, &slot.buffer, range);
    }

    /// Records the fence guarding the active slot. Call after every draw
    /// reading the slot has been submitted.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the fence cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if the active slot was not written this frame.
    pub fn end_frame(&mut self, backend: &mut B) -> RenderResult<()> {
        let index = self.current;
        let slot = &mut self.slots[index];
        assert_eq!(
            slot.state,
            SlotState::Writing,
            "fence recorded for slot {index} that was not written this frame"
        );
        slot.fence = Some(backend.create_fence()?);
        slot.state = SlotState::Submitted;
        tracing::trace!(slot = index, "ring slot submitted");
        Ok(())
    }

    /// Recreates every slot at `capacity` bytes. Outstanding fences are
    /// discarded without waiting.
    ///
    /// # Errors
    ///
    /// Returns the backend error if a new buffer cannot be created. The ring
    /// is left exactly as it was: old buffers, fences and capacity.
    pub fn grow(&mut self, backend: &mut B, capacity: u64) -> RenderResult<()> {
        let buffers = create_slot_buffers(backend, self.slots.len(), capacity)?;
        for (slot, buffer) in self.slots.iter_mut().zip(buffers) {
            if let Some(fence) = slot.fence.take() {
                backend.destroy_fence(fence);
            }
            let old = std::mem::replace(&mut slot.buffer, buffer);
            backend.destroy_buffer(old);
            slot.state = SlotState::Idle;
        }
        tracing::info!(
            from = self.capacity,
            to = capacity,
            slots = self.slots.len(),
            "upload ring grown"
        );
        self.capacity = capacity;
        Ok(())
    }

    /// Destroys every buffer and fence.
    pub fn destroy(self, backend: &mut B) {
        for slot in self.slots {
            if let Some(fence) = slot.fence {
                backend.destroy_fence(fence);
            }
            backend.destroy_buffer(slot.buffer);
        }
    }
}

/// Creates one buffer per slot, all or nothing.
fn create_slot_buffers<B: GpuBackend>(
    backend: &mut B,
    count: usize,
    capacity: u64,
) -> Result<Vec<B::Buffer>, BackendError> {
    let mut buffers = Vec::with_capacity(count);
    for index in 0..count {
        let label = format!("tessera.ring.slot{index}");
        let created = backend.create_buffer(&BufferDesc {
            label: &label,
            size: capacity,
            persistent: true,
        });
        match created {
            Ok(buffer) => buffers.push(buffer),
            Err(err) => {
                for buffer in buffers {
                    backend.destroy_buffer(buffer);
                }
                return Err(err);
            }
        }
    }
    Ok(buffers)
}

fn wait_until_signaled<B: GpuBackend>(
    backend: &mut B,
    fence: &B::Fence,
    config: &FenceWaitConfig,
    slot: usize,
) -> u32 {
    let mut attempts = 0u32;
    loop {
        attempts = attempts.saturating_add(1);
        let status = backend.wait_fence(fence, config.attempt_timeout_ns);
        if status == FenceStatus::Signaled {
            return attempts;
        }
        if attempts % config.warn_every_attempts == 0 {
            tracing::warn!(
                slot,
                attempts,
                ?status,
                "fence wait stalled, still retrying"
            );
        }
    }
}
