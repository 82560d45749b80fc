//! Frame and renderer statistics.

/// What one `prepare_frame` did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Ring slot written this frame.
    pub slot: usize,
    /// Meshes placed in the atlas.
    pub meshes_uploaded: u32,
    /// Meshes skipped because the atlas was full.
    pub meshes_skipped: u32,
    /// Instances uploaded.
    pub instances: u64,
    /// Bytes copied into the ring slot.
    pub bytes_uploaded: u64,
    /// Atlas capacity during the sweep.
    pub atlas_capacity: u64,
    /// Fence wait attempts before the slot could be written.
    pub fence_wait_attempts: u32,
    /// New capacity if growth was applied before the sweep.
    pub grown_to: Option<u64>,
}

impl FrameStats {
    /// Fraction of the atlas filled by this frame.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f32 {
        if self.atlas_capacity == 0 {
            0.0
        } else {
            self.bytes_uploaded as f32 / self.atlas_capacity as f32
        }
    }

    /// Returns true if any mesh missed this frame.
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.meshes_skipped > 0
    }

    /// Returns true if the fence wait needed more than one attempt.
    #[must_use]
    pub fn stalled(&self) -> bool {
        self.fence_wait_attempts > 1
    }
}

/// Totals since the renderer was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// Frames prepared.
    pub frames: u64,
    /// Frames in which at least one mesh was skipped.
    pub overflow_frames: u64,
    /// Growth steps applied.
    pub growth_events: u64,
    /// Fence wait attempts beyond the first, summed over all frames.
    pub fence_retries: u64,
    /// Largest single upload in bytes.
    pub peak_bytes_uploaded: u64,
}

impl RendererStats {
    pub(crate) fn record(&mut self, frame: &FrameStats) {
        self.frames += 1;
        if frame.overflowed() {
            self.overflow_frames += 1;
        }
        if frame.grown_to.is_some() {
            self.growth_events += 1;
        }
        self.fence_retries += u64::from(frame.fence_wait_attempts.saturating_sub(1));
        self.peak_bytes_uploaded = self.peak_bytes_uploaded.max(frame.bytes_uploaded);
    }
}
