//! # Frame Orchestration
//!
//! [`InstanceRenderer`] ties the registry, atlas, growth policy and upload
//! ring together. A frame is driven in a fixed order:
//!
//! ```text
//! prepare_frame()          growth → sweep → advance ring → fence wait → upload
//! bind_mesh()             once per draw, from the material system
//! finish_frame()           after the draws are submitted: record the fence
//! ```
//!
//! Calling these out of order is a programming error and panics.

mod stats;

pub use stats::{FrameStats, RendererStats};

use tessera_core::{MeshId, MeshRegistry};

use crate::atlas::{AtlasSegment, FrameAtlas};
use crate::backend::{BufferRange, GpuBackend};
use crate::config::{validate_alignment, TesseraConfig};
use crate::error::RenderResult;
use crate::growth::GrowthPolicy;
use crate::ring::MultiBufferRing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FramePhase {
    Idle,
    Prepared,
}

/// Owns the instance-data plane for one graphics backend.
///
/// # Example
///
/// ```rust
/// use tessera_core::{FieldId, FieldValue, InstanceSlot, MeshDesc};
/// use tessera_rendering::{HeadlessBackend, InstanceRenderer, TesseraConfig};
///
/// let mut renderer =
///     InstanceRenderer::new(HeadlessBackend::default(), &TesseraConfig::default()).unwrap();
/// let rock = renderer.registry_mut().register(MeshDesc::instances("rock", 64));
///
/// let slot = InstanceSlot::new();
/// let store = renderer.registry_mut().get_mut(rock).unwrap();
/// let index = store.acquire(&slot).unwrap();
/// store.set_field(index, FieldId::Color, FieldValue::Vec4([1.0; 4])).unwrap();
///
/// let stats = renderer.prepare_frame().unwrap();
/// assert_eq!(stats.instances, 1);
/// assert!(renderer.bind_mesh(rock).is_some());
/// renderer.finish_frame().unwrap();
/// ```
pub struct InstanceRenderer<B: GpuBackend> {
    backend: B,
    registry: MeshRegistry,
    atlas: FrameAtlas,
    ring: MultiBufferRing<B>,
    growth: GrowthPolicy,
    phase: FramePhase,
    frame: u64,
    stats: RendererStats,
}

impl<B: GpuBackend> InstanceRenderer<B> {
    /// Creates the atlas and ring on `backend`.
    ///
    /// # Errors
    ///
    /// Returns a config error for invalid settings (including a backend
    /// alignment that is not a power of two) and a backend error if the ring
    /// buffers cannot be created.
    pub fn new(mut backend: B, config: &TesseraConfig) -> RenderResult<Self> {
        config.validate()?;
        let alignment = config
            .alignment
            .unwrap_or_else(|| backend.min_binding_alignment());
        validate_alignment(alignment)?;

        let capacity = config.initial_atlas_capacity;
        let ring = MultiBufferRing::new(&mut backend, config.ring_slots, capacity, config.fence)?;
        tracing::info!(
            slots = config.ring_slots,
            capacity,
            alignment,
            "instance renderer created"
        );

        Ok(Self {
            backend,
            registry: MeshRegistry::new(),
            atlas: FrameAtlas::new(capacity, alignment),
            ring,
            growth: GrowthPolicy::new(&config.growth),
            phase: FramePhase::Idle,
            frame: 0,
            stats: RendererStats::default(),
        })
    }

    /// The mesh registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &MeshRegistry {
        &self.registry
    }

    /// The mesh registry, for registering meshes and editing instances.
    #[inline]
    pub fn registry_mut(&mut self) -> &mut MeshRegistry {
        &mut self.registry
    }

    /// The graphics backend.
    #[inline]
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The graphics backend, for issuing draws.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Current atlas capacity in bytes.
    #[inline]
    #[must_use]
    pub fn atlas_capacity(&self) -> u64 {
        self.atlas.capacity()
    }

    /// Growth scheduled for the next frame, if any.
    #[inline]
    #[must_use]
    pub fn pending_growth(&self) -> Option<u64> {
        self.growth.pending()
    }

    /// Totals since creation.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    /// Buffer the current frame was uploaded into.
    #[must_use]
    pub fn active_buffer(&self) -> &B::Buffer {
        self.ring.active_buffer()
    }

    /// Sweeps every store and uploads the atlas into the next ring slot.
    ///
    /// Blocks until the GPU has released that slot.
    ///
    /// # Errors
    ///
    /// Returns a backend error if growth, mapping or unmapping fails.
    ///
    /// # Panics
    ///
    /// Panics if the previous frame was not finished.
    pub fn prepare_frame(&mut self) -> RenderResult<FrameStats> {
        assert_eq!(
            self.phase,
            FramePhase::Idle,
            "prepare_frame called before finish_frame of frame {}",
            self.frame.saturating_sub(1)
        );

        // growth stays pending until the ring has actually been recreated
        let grown_to = match self.growth.pending() {
            Some(capacity) => {
                if let Err(err) = self.ring.grow(&mut self.backend, capacity) {
                    tracing::warn!(
                        to = capacity,
                        frame = self.frame,
                        error = %err,
                        "atlas growth failed, will retry next frame"
                    );
                    return Err(err);
                }
                let applied = self.growth.take_pending();
                debug_assert_eq!(applied, Some(capacity));
                tracing::info!(
                    from = self.atlas.capacity(),
                    to = capacity,
                    frame = self.frame,
                    "atlas grown"
                );
                self.atlas.grow_to(capacity);
                Some(capacity)
            }
            None => None,
        };

        let report = self.atlas.assemble(&self.registry)?;
        self.growth
            .evaluate(report.demanded_bytes, self.atlas.capacity());

        let fence_wait_attempts = self.ring.begin_frame(&mut self.backend);
        self.ring.upload(&mut self.backend, self.atlas.bytes())?;
        self.phase = FramePhase::Prepared;

        let stats = FrameStats {
            frame: self.frame,
            slot: self.ring.current(),
            meshes_uploaded: report.placed,
            meshes_skipped: report.skipped,
            instances: report.instances,
            bytes_uploaded: report.used_bytes,
            atlas_capacity: self.atlas.capacity(),
            fence_wait_attempts,
            grown_to,
        };
        self.stats.record(&stats);
        self.frame += 1;
        tracing::debug!(
            frame = stats.frame,
            slot = stats.slot,
            meshes = stats.meshes_uploaded,
            skipped = stats.meshes_skipped,
            bytes = stats.bytes_uploaded,
            attempts = stats.fence_wait_attempts,
            "frame prepared"
        );
        Ok(stats)
    }

    /// This frame's atlas segment of `mesh`.
    ///
    /// Returns `None` if the mesh had no instances or did not fit.
    #[must_use]
    pub fn segment(&self, mesh: MeshId) -> Option<&AtlasSegment> {
        self.atlas.segment(mesh)
    }

    /// Every segment of this frame, in mesh id order.
    #[must_use]
    pub fn segments(&self) -> &[AtlasSegment] {
        self.atlas.segments()
    }

    /// Binds `mesh`'s range of the active slot to its binding point.
    ///
    /// Meshes of one layout share a binding point, so bind right before the
    /// mesh's draw; the next bind replaces the range.
    ///
    /// Returns the bound range, or `None` if the mesh has nothing to draw
    /// this frame.
    ///
    /// # Panics
    ///
    /// Panics outside a prepared frame.
    pub fn bind_mesh(&mut self, mesh: MeshId) -> Option<BufferRange> {
        self.assert_prepared("bind_mesh");
        let segment = *self.atlas.segment(mesh)?;
        self.ring
            .bind(&mut self.backend, segment.binding_point, segment.range);
        Some(segment.range)
    }

    /// Records the fence for this frame's slot. Call once the frame's draws
    /// have been submitted.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the fence cannot be created.
    ///
    /// # Panics
    ///
    /// Panics if the frame was not prepared.
    pub fn finish_frame(&mut self) -> RenderResult<()> {
        self.assert_prepared("finish_frame");
        self.ring.end_frame(&mut self.backend)?;
        self.phase = FramePhase::Idle;
        Ok(())
    }

    /// Empties every store, destroys every buffer and fence, and hands the
    /// backend back.
    pub fn shutdown(mut self) -> B {
        self.registry.clear_all();
        self.ring.destroy(&mut self.backend);
        tracing::info!(frames = self.stats.frames, "instance renderer shut down");
        self.backend
    }

    fn assert_prepared(&self, call: &str) {
        assert_eq!(
            self.phase,
            FramePhase::Prepared,
            "{call} called outside a prepared frame"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HeadlessBackend;
    use crate::error::BackendError;
    use tessera_core::{InstanceSlot, MeshDesc, INSTANCE_BINDING};

    fn renderer(capacity: u64) -> InstanceRenderer<HeadlessBackend> {
        let config = TesseraConfig {
            initial_atlas_capacity: capacity,
            ..TesseraConfig::default()
        };
        InstanceRenderer::new(HeadlessBackend::new(256), &config).unwrap()
    }

    #[test]
    fn test_empty_frame() {
        let mut renderer = renderer(1024);
        let stats = renderer.prepare_frame().unwrap();
        assert_eq!(stats.frame, 0);
        assert_eq!(stats.slot, 0);
        assert_eq!(stats.bytes_uploaded, 0);
        assert!(renderer.segments().is_empty());
        renderer.finish_frame().unwrap();
        assert_eq!(renderer.stats().frames, 1);
    }

    #[test]
    fn test_bind_mesh_uses_binding_point() {
        let mut renderer = renderer(4096);
        let lamps = renderer
            .registry_mut()
            .register(MeshDesc::lights("lamps", 8).with_binding_point(7));
        let missing = renderer.registry_mut().register(MeshDesc::instances("none", 8));
        let slot = InstanceSlot::new();
        renderer
            .registry_mut()
            .get_mut(lamps)
            .unwrap()
            .acquire(&slot)
            .unwrap();

        renderer.prepare_frame().unwrap();
        let range = renderer.bind_mesh(lamps).unwrap();
        assert_eq!(range, BufferRange { offset: 0, size: 256 });
        assert_eq!(renderer.bind_mesh(missing), None);

        let (buffer, bound) = renderer.backend().binding(7).unwrap();
        assert_eq!(buffer, renderer.active_buffer().id());
        assert_eq!(bound, range);
        renderer.finish_frame().unwrap();
    }

    #[test]
    fn test_shared_binding_point_is_rebound_per_draw() {
        let mut renderer = renderer(4096);
        let rocks = renderer.registry_mut().register(MeshDesc::instances("rocks", 8));
        let trees = renderer.registry_mut().register(MeshDesc::instances("trees", 8));
        let slots: Vec<InstanceSlot> = (0..3).map(|_| InstanceSlot::new()).collect();
        renderer.registry_mut().get_mut(rocks).unwrap().acquire(&slots[0]).unwrap();
        renderer.registry_mut().get_mut(trees).unwrap().acquire(&slots[1]).unwrap();
        renderer.registry_mut().get_mut(trees).unwrap().acquire(&slots[2]).unwrap();
        renderer.prepare_frame().unwrap();

        for (mesh, expected) in [
            (rocks, BufferRange { offset: 0, size: 512 }),
            (trees, BufferRange { offset: 512, size: 768 }),
        ] {
            let range = renderer.bind_mesh(mesh).unwrap();
            assert_eq!(range, expected);
            let (_, bound) = renderer.backend().binding(INSTANCE_BINDING).unwrap();
            assert_eq!(bound, range);
        }
        renderer.finish_frame().unwrap();
    }

    #[test]
    fn test_stale_mesh_id_binds_nothing() {
        let mut renderer = renderer(4096);
        let rock = renderer.registry_mut().register(MeshDesc::instances("rock", 8));
        renderer.registry_mut().unregister(rock);
        let lamp = renderer.registry_mut().register(MeshDesc::lights("lamp", 8));
        assert_eq!(lamp.index(), rock.index());
        let slot = InstanceSlot::new();
        renderer.registry_mut().get_mut(lamp).unwrap().acquire(&slot).unwrap();

        renderer.prepare_frame().unwrap();
        assert_eq!(renderer.bind_mesh(rock), None);
        assert!(renderer.bind_mesh(lamp).is_some());
        renderer.finish_frame().unwrap();
    }

    #[test]
    fn test_failed_growth_stays_pending() {
        let mut renderer = renderer(1024);
        let mesh = renderer.registry_mut().register(MeshDesc::instances("m", 8));
        let slots: Vec<InstanceSlot> = (0..4).map(|_| InstanceSlot::new()).collect();
        for slot in &slots {
            renderer.registry_mut().get_mut(mesh).unwrap().acquire(slot).unwrap();
        }
        // 4 * 288 = 1152 bytes, aligned to 1280, overflows 1024
        renderer.prepare_frame().unwrap();
        renderer.finish_frame().unwrap();
        assert_eq!(renderer.pending_growth(), Some(1280));

        // only one 1280-byte buffer fits next to the three old ones
        renderer.backend_mut().set_memory_budget(Some(3 * 1024 + 1280));
        let err = renderer.prepare_frame().unwrap_err();
        assert!(matches!(
            err,
            crate::error::RenderError::Backend(BackendError::BufferCreation { .. })
        ));
        assert_eq!(renderer.pending_growth(), Some(1280));
        assert_eq!(renderer.atlas_capacity(), 1024);
        assert_eq!(renderer.active_buffer().size(), 1024);
        assert_eq!(renderer.backend().live_buffers(), 3);

        renderer.backend_mut().set_memory_budget(None);
        let stats = renderer.prepare_frame().unwrap();
        assert_eq!(stats.grown_to, Some(1280));
        assert_eq!(renderer.pending_growth(), None);
        assert_eq!(renderer.atlas_capacity(), 1280);
        assert_eq!(renderer.segment(mesh).unwrap().instance_count, 4);
        renderer.finish_frame().unwrap();
    }

    #[test]
    fn test_config_alignment_overrides_backend() {
        let config = TesseraConfig {
            alignment: Some(64),
            ..TesseraConfig::default()
        };
        let mut renderer = InstanceRenderer::new(HeadlessBackend::new(256), &config).unwrap();
        let mesh = renderer.registry_mut().register(MeshDesc::lights("l", 4));
        let slot = InstanceSlot::new();
        renderer.registry_mut().get_mut(mesh).unwrap().acquire(&slot).unwrap();

        renderer.prepare_frame().unwrap();
        // 112 bytes round up to 128 instead of 256
        assert_eq!(renderer.segment(mesh).unwrap().range.size, 128);
        renderer.finish_frame().unwrap();
    }

    #[test]
    fn test_rejects_odd_backend_alignment() {
        let result = InstanceRenderer::new(HeadlessBackend::new(24), &TesseraConfig::default());
        assert!(matches!(
            result,
            Err(crate::error::RenderError::Config(_))
        ));
    }

    #[test]
    fn test_shutdown_releases_resources() {
        let mut renderer = renderer(1024);
        let mesh = renderer.registry_mut().register(MeshDesc::instances("m", 2));
        let slot = InstanceSlot::new();
        renderer.registry_mut().get_mut(mesh).unwrap().acquire(&slot).unwrap();
        renderer.prepare_frame().unwrap();
        renderer.finish_frame().unwrap();

        let backend = renderer.shutdown();
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_fences(), 0);
        assert!(!slot.is_linked());
    }

    #[test]
    #[should_panic(expected = "before finish_frame")]
    fn test_prepare_twice_panics() {
        let mut renderer = renderer(1024);
        renderer.prepare_frame().unwrap();
        renderer.prepare_frame().unwrap();
    }

    #[test]
    #[should_panic(expected = "outside a prepared frame")]
    fn test_bind_before_prepare_panics() {
        let mut renderer = renderer(1024);
        let mesh = renderer.registry_mut().register(MeshDesc::instances("m", 2));
        let _ = renderer.bind_mesh(mesh);
    }
}
