//! Headless backend: CPU buffers and a simulated GPU timeline.
//!
//! Every backend call is appended to an operation log so tests can check the
//! exact order of maps, binds and fence waits. Fences are serial numbers on a
//! [`GpuTimeline`]; a fence signals once the timeline has retired its serial.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{BufferDesc, BufferRange, FenceStatus, GpuBackend};
use crate::error::BackendError;

/// Binding alignment reported by [`HeadlessBackend::default`].
pub const DEFAULT_HEADLESS_ALIGNMENT: u64 = 256;

#[derive(Debug, Default)]
struct TimelineState {
    submitted: u64,
    completed: u64,
    failures_pending: u32,
}

/// Simulated GPU queue shared between the render thread and a "GPU" thread.
///
/// The render thread submits work by creating fences. Whoever plays the GPU
/// retires submissions in order with [`GpuTimeline::retire_next`] or
/// [`GpuTimeline::retire_through`], waking every blocked fence wait.
#[derive(Debug)]
pub struct GpuTimeline {
    state: Mutex<TimelineState>,
    retired: Condvar,
    retire_on_submit: bool,
}

impl GpuTimeline {
    /// A timeline that only advances when told to.
    #[must_use]
    pub fn manual() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TimelineState::default()),
            retired: Condvar::new(),
            retire_on_submit: false,
        })
    }

    /// A timeline whose GPU finishes every submission instantly.
    #[must_use]
    pub fn immediate() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(TimelineState::default()),
            retired: Condvar::new(),
            retire_on_submit: true,
        })
    }

    /// Records a submission and returns its serial (starting at 1).
    pub fn submit(&self) -> u64 {
        let mut state = self.state.lock();
        state.submitted += 1;
        let serial = state.submitted;
        if self.retire_on_submit {
            state.completed = serial;
            drop(state);
            self.retired.notify_all();
        }
        serial
    }

    /// Retires the oldest outstanding submission.
    ///
    /// Returns false if nothing was outstanding.
    pub fn retire_next(&self) -> bool {
        let mut state = self.state.lock();
        if state.completed == state.submitted {
            return false;
        }
        state.completed += 1;
        drop(state);
        self.retired.notify_all();
        true
    }

    /// Retires every submission up to and including `serial`.
    pub fn retire_through(&self, serial: u64) {
        let mut state = self.state.lock();
        let target = serial.min(state.submitted);
        if target > state.completed {
            state.completed = target;
            drop(state);
            self.retired.notify_all();
        }
    }

    /// Retires every outstanding submission.
    pub fn retire_all(&self) {
        let mut state = self.state.lock();
        state.completed = state.submitted;
        drop(state);
        self.retired.notify_all();
    }

    /// Makes the next `count` fence waits report [`FenceStatus::Failed`].
    pub fn fail_next_waits(&self, count: u32) {
        self.state.lock().failures_pending = count;
    }

    /// Serial of the latest submission.
    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.state.lock().submitted
    }

    /// Serial of the latest retired submission.
    #[must_use]
    pub fn completed(&self) -> u64 {
        self.state.lock().completed
    }

    /// Submissions not yet retired.
    #[must_use]
    pub fn pending(&self) -> u64 {
        let state = self.state.lock();
        state.submitted - state.completed
    }

    fn wait(&self, serial: u64, timeout: Duration) -> FenceStatus {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        if state.failures_pending > 0 {
            state.failures_pending -= 1;
            return FenceStatus::Failed;
        }
        while state.completed < serial {
            if self.retired.wait_until(&mut state, deadline).timed_out() {
                return if state.completed >= serial {
                    FenceStatus::Signaled
                } else {
                    FenceStatus::TimedOut
                };
            }
        }
        FenceStatus::Signaled
    }
}

/// Handle to a headless buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessBuffer {
    id: u64,
    size: u64,
}

impl HeadlessBuffer {
    /// Buffer id as it appears in the operation log.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

/// Handle to a headless fence.
#[derive(Debug, PartialEq, Eq)]
pub struct HeadlessFence {
    serial: u64,
}

impl HeadlessFence {
    /// Timeline serial this fence waits for.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// One entry of the headless operation log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    /// A buffer was created.
    BufferCreated {
        /// Buffer id.
        buffer: u64,
        /// Size in bytes.
        size: u64,
        /// Persistent mapping was requested.
        persistent: bool,
    },
    /// A buffer was destroyed.
    BufferDestroyed {
        /// Buffer id.
        buffer: u64,
    },
    /// A range was mapped for writing.
    Mapped {
        /// Buffer id.
        buffer: u64,
        /// Mapped range.
        range: BufferRange,
    },
    /// The open mapping was closed.
    Unmapped {
        /// Buffer id.
        buffer: u64,
    },
    /// A range was bound to a binding point.
    Bound {
        /// Shader binding point.
        binding: u32,
        /// Buffer id.
        buffer: u64,
        /// Bound range.
        range: BufferRange,
    },
    /// A fence was inserted.
    FenceCreated {
        /// Timeline serial.
        serial: u64,
    },
    /// One wait attempt finished.
    FenceWaited {
        /// Timeline serial.
        serial: u64,
        /// Result of the attempt.
        status: FenceStatus,
    },
    /// A fence was released.
    FenceDestroyed {
        /// Timeline serial.
        serial: u64,
    },
}

#[derive(Debug)]
struct BufferState {
    label: String,
    bytes: Vec<u8>,
    mapped: Option<BufferRange>,
}

/// CPU-only [`GpuBackend`].
#[derive(Debug)]
pub struct HeadlessBackend {
    alignment: u64,
    timeline: Arc<GpuTimeline>,
    buffers: HashMap<u64, BufferState>,
    next_buffer: u64,
    bindings: HashMap<u32, (u64, BufferRange)>,
    live_fences: usize,
    memory_budget: Option<u64>,
    events: Vec<BackendEvent>,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new(DEFAULT_HEADLESS_ALIGNMENT)
    }
}

impl HeadlessBackend {
    /// Creates a backend whose GPU finishes work instantly.
    #[must_use]
    pub fn new(alignment: u64) -> Self {
        Self::with_timeline(alignment, GpuTimeline::immediate())
    }

    /// Creates a backend driven by an externally controlled timeline.
    #[must_use]
    pub fn with_timeline(alignment: u64, timeline: Arc<GpuTimeline>) -> Self {
        Self {
            alignment,
            timeline,
            buffers: HashMap::new(),
            next_buffer: 0,
            bindings: HashMap::new(),
            live_fences: 0,
            memory_budget: None,
            events: Vec::new(),
        }
    }

    /// Caps the bytes held by live buffers; `None` removes the cap.
    ///
    /// A `create_buffer` that would exceed the cap fails the way an
    /// out-of-memory device allocation does.
    pub fn set_memory_budget(&mut self, budget: Option<u64>) {
        self.memory_budget = budget;
    }

    /// Bytes held by live buffers.
    #[must_use]
    pub fn allocated_bytes(&self) -> u64 {
        self.buffers
            .values()
            .map(|state| state.bytes.len() as u64)
            .sum()
    }

    /// The timeline fences are checked against.
    #[must_use]
    pub fn timeline(&self) -> &Arc<GpuTimeline> {
        &self.timeline
    }

    /// Operation log since creation or the last [`take_events`](Self::take_events).
    #[must_use]
    pub fn events(&self) -> &[BackendEvent] {
        &self.events
    }

    /// Drains the operation log.
    pub fn take_events(&mut self) -> Vec<BackendEvent> {
        std::mem::take(&mut self.events)
    }

    /// Current contents of a live buffer.
    #[must_use]
    pub fn buffer_bytes(&self, id: u64) -> Option<&[u8]> {
        self.buffers.get(&id).map(|state| state.bytes.as_slice())
    }

    /// Debug label of a live buffer.
    #[must_use]
    pub fn buffer_label(&self, id: u64) -> Option<&str> {
        self.buffers.get(&id).map(|state| state.label.as_str())
    }

    /// Buffer id and range last bound to `binding`.
    #[must_use]
    pub fn binding(&self, binding: u32) -> Option<(u64, BufferRange)> {
        self.bindings.get(&binding).copied()
    }

    /// Number of buffers not yet destroyed.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Number of fences not yet destroyed.
    #[must_use]
    pub fn live_fences(&self) -> usize {
        self.live_fences
    }
}

impl GpuBackend for HeadlessBackend {
    type Buffer = HeadlessBuffer;
    type Fence = HeadlessFence;

    fn min_binding_alignment(&self) -> u64 {
        self.alignment
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> Result<HeadlessBuffer, BackendError> {
        let len = usize::try_from(desc.size).map_err(|_| BackendError::BufferCreation {
            label: desc.label.to_owned(),
            size: desc.size,
            reason: "size exceeds host address space".into(),
        })?;
        if let Some(budget) = self.memory_budget {
            let allocated = self.allocated_bytes();
            if allocated.saturating_add(desc.size) > budget {
                return Err(BackendError::BufferCreation {
                    label: desc.label.to_owned(),
                    size: desc.size,
                    reason: format!("out of device memory ({allocated} of {budget} bytes in use)"),
                });
            }
        }
        let id = self.next_buffer;
        self.next_buffer += 1;
        self.buffers.insert(
            id,
            BufferState {
                label: desc.label.to_owned(),
                bytes: vec![0; len],
                mapped: None,
            },
        );
        self.events.push(BackendEvent::BufferCreated {
            buffer: id,
            size: desc.size,
            persistent: desc.persistent,
        });
        Ok(HeadlessBuffer {
            id,
            size: desc.size,
        })
    }

    fn destroy_buffer(&mut self, buffer: HeadlessBuffer) {
        self.buffers.remove(&buffer.id);
        self.bindings.retain(|_, (id, _)| *id != buffer.id);
        self.events
            .push(BackendEvent::BufferDestroyed { buffer: buffer.id });
    }

    fn map_range(
        &mut self,
        buffer: &HeadlessBuffer,
        offset: u64,
        size: u64,
    ) -> Result<&mut [u8], BackendError> {
        let state = self
            .buffers
            .get_mut(&buffer.id)
            .ok_or(BackendError::UnknownBuffer(buffer.id))?;
        if state.mapped.is_some() {
            return Err(BackendError::AlreadyMapped(buffer.id));
        }
        let capacity = state.bytes.len() as u64;
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= capacity)
            .ok_or(BackendError::RangeOutOfBounds {
                offset,
                size,
                capacity,
            })?;

        let range = BufferRange { offset, size };
        state.mapped = Some(range);
        self.events.push(BackendEvent::Mapped {
            buffer: buffer.id,
            range,
        });
        Ok(&mut state.bytes[offset as usize..end as usize])
    }

    fn unmap(&mut self, buffer: &HeadlessBuffer) -> Result<(), BackendError> {
        let state = self
            .buffers
            .get_mut(&buffer.id)
            .ok_or(BackendError::UnknownBuffer(buffer.id))?;
        state
            .mapped
            .take()
            .ok_or(BackendError::NotMapped(buffer.id))?;
        self.events.push(BackendEvent::Unmapped { buffer: buffer.id });
        Ok(())
    }

    fn bind_range(&mut self, binding: u32, buffer: &HeadlessBuffer, range: BufferRange) {
        debug_assert!(
            range.end() <= buffer.size,
            "bind of {range:?} outside buffer {} of {} bytes",
            buffer.id,
            buffer.size
        );
        self.bindings.insert(binding, (buffer.id, range));
        self.events.push(BackendEvent::Bound {
            binding,
            buffer: buffer.id,
            range,
        });
    }

    fn create_fence(&mut self) -> Result<HeadlessFence, BackendError> {
        let serial = self.timeline.submit();
        self.live_fences += 1;
        self.events.push(BackendEvent::FenceCreated { serial });
        Ok(HeadlessFence { serial })
    }

    fn wait_fence(&mut self, fence: &HeadlessFence, timeout_ns: u64) -> FenceStatus {
        let status = self
            .timeline
            .wait(fence.serial, Duration::from_nanos(timeout_ns));
        self.events.push(BackendEvent::FenceWaited {
            serial: fence.serial,
            status,
        });
        status
    }

    fn destroy_fence(&mut self, fence: HeadlessFence) {
        self.live_fences -= 1;
        self.events
            .push(BackendEvent::FenceDestroyed { serial: fence.serial });
    }
}
