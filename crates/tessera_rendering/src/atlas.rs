//! # Frame Atlas
//!
//! Every frame the atlas sweeps all non-empty mesh stores into one byte
//! buffer. Each mesh gets a segment starting on an alignment boundary:
//!
//! ```text
//!  0            256                 768        1024
//!  [ mesh#0 |pad][ mesh#2      |pad ][ mesh#5 ]...
//! ```
//!
//! A mesh that does not fit is skipped for the frame and the sweep report
//! flags the overflow. Segment ranges are only valid for the frame that
//! produced them.

use tessera_core::{align_up, ByteWriter, MeshId, MeshRegistry};

use crate::backend::BufferRange;
use crate::error::RenderResult;

/// One mesh's slice of the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasSegment {
    /// Mesh the bytes belong to.
    pub mesh: MeshId,
    /// Shader binding point of the mesh.
    pub binding_point: u32,
    /// Aligned range inside the atlas.
    pub range: BufferRange,
    /// Live instances in the segment.
    pub instance_count: u32,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Meshes written into the atlas.
    pub placed: u32,
    /// Meshes that did not fit.
    pub skipped: u32,
    /// Final write offset (sum of placed aligned sizes).
    pub used_bytes: u64,
    /// Aligned bytes every active mesh asked for, placed or not.
    pub demanded_bytes: u64,
    /// Instances across placed meshes.
    pub instances: u64,
}

impl SweepReport {
    /// True if at least one mesh was skipped.
    #[inline]
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.skipped > 0
    }
}

/// Per-frame byte atlas of every mesh's instance records.
pub struct FrameAtlas {
    bytes: Vec<u8>,
    alignment: u64,
    segments: Vec<AtlasSegment>,
    used: u64,
}

impl FrameAtlas {
    /// Creates an atlas of `capacity` bytes whose segments align to `alignment`.
    ///
    /// # Panics
    ///
    /// Panics if `alignment` is not a power of two.
    #[must_use]
    pub fn new(capacity: u64, alignment: u64) -> Self {
        assert!(
            alignment.is_power_of_two(),
            "atlas alignment {alignment} is not a power of two"
        );
        Self {
            bytes: vec![0; capacity as usize],
            alignment,
            segments: Vec::new(),
            used: 0,
        }
    }

    /// Capacity in bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Segment alignment in bytes.
    #[inline]
    #[must_use]
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Bytes written by the last sweep.
    #[inline]
    #[must_use]
    pub fn used(&self) -> u64 {
        self.used
    }

    /// The written prefix `[0, used)`; this is what gets uploaded.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.used as usize]
    }

    /// Segments of the last sweep, in mesh id order.
    #[inline]
    #[must_use]
    pub fn segments(&self) -> &[AtlasSegment] {
        &self.segments
    }

    /// Looks up a mesh's segment from the last sweep.
    ///
    /// A stale id whose slot now belongs to another mesh finds nothing.
    #[must_use]
    pub fn segment(&self, mesh: MeshId) -> Option<&AtlasSegment> {
        self.segments
            .binary_search_by_key(&mesh.index(), |segment| segment.mesh.index())
            .ok()
            .map(|i| &self.segments[i])
            .filter(|segment| segment.mesh == mesh)
    }

    /// Grows the atlas. Contents of the previous sweep are discarded.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is smaller than the current capacity.
    pub fn grow_to(&mut self, capacity: u64) {
        assert!(
            capacity >= self.capacity(),
            "atlas cannot shrink from {} to {capacity}",
            self.capacity()
        );
        self.bytes.resize(capacity as usize, 0);
        self.segments.clear();
        self.used = 0;
    }

    /// Sweeps every active store into the atlas.
    ///
    /// # Errors
    ///
    /// Only fails if a bounds check inside the byte writer fails, which the
    /// capacity check before each copy rules out.
    pub fn assemble(&mut self, registry: &MeshRegistry) -> RenderResult<SweepReport> {
        let capacity = self.capacity();
        let mut report = SweepReport::default();
        let mut offset = 0u64;
        self.segments.clear();

        for store in registry.iter_active() {
            let records = store.instance_bytes();
            let raw = records.len() as u64;
            let aligned = align_up(raw, self.alignment);
            report.demanded_bytes += aligned;

            if offset + aligned > capacity {
                report.skipped += 1;
                tracing::warn!(
                    mesh = %store.id(),
                    needed = aligned,
                    remaining = capacity - offset,
                    capacity,
                    "atlas overflow, mesh skipped this frame"
                );
                continue;
            }

            let mut writer = ByteWriter::at(&mut self.bytes, offset as usize)?;
            writer.write_bytes(records)?;
            writer.write_zeros((aligned - raw) as usize)?;

            self.segments.push(AtlasSegment {
                mesh: store.id(),
                binding_point: store.desc().binding_point,
                range: BufferRange {
                    offset,
                    size: aligned,
                },
                instance_count: store.count(),
            });
            offset += aligned;
            report.placed += 1;
            report.instances += u64::from(store.count());
        }

        self.used = offset;
        report.used_bytes = offset;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{ByteReader, FieldId, FieldValue, InstanceRecord, InstanceSlot, MeshDesc};

    // Color exists in both the instance and the light layout.
    fn populate(registry: &mut MeshRegistry, mesh: MeshId, count: usize) -> Vec<InstanceSlot> {
        let store = registry.get_mut(mesh).unwrap();
        (0..count)
            .map(|i| {
                let slot = InstanceSlot::new();
                let index = store.acquire(&slot).unwrap();
                store
                    .set_field(index, FieldId::Color, FieldValue::Vec4([i as f32; 4]))
                    .unwrap();
                slot
            })
            .collect()
    }

    #[test]
    fn test_segments_are_aligned_and_packed() {
        let mut registry = MeshRegistry::new();
        let a = registry.register(MeshDesc::instances("a", 16));
        let empty = registry.register(MeshDesc::instances("empty", 16));
        let b = registry.register(MeshDesc::lights("b", 16));
        let _a = populate(&mut registry, a, 3);
        let _b = populate(&mut registry, b, 1);

        let mut atlas = FrameAtlas::new(4096, 256);
        let report = atlas.assemble(&registry).unwrap();

        assert_eq!(report.placed, 2);
        assert!(!report.overflowed());
        assert_eq!(atlas.segments().len(), 2);
        assert!(atlas.segment(empty).is_none());

        let seg_a = atlas.segment(a).unwrap();
        assert_eq!(seg_a.range, BufferRange { offset: 0, size: 1024 });
        assert_eq!(seg_a.instance_count, 3);
        let seg_b = atlas.segment(b).unwrap();
        assert_eq!(seg_b.range, BufferRange { offset: 1024, size: 256 });
        assert_eq!(report.used_bytes, 1280);
        assert_eq!(atlas.bytes().len(), 1280);
    }

    #[test]
    fn test_bytes_match_stores_and_padding_is_zero() {
        let mut registry = MeshRegistry::new();
        let a = registry.register(MeshDesc::instances("a", 16));
        let _a = populate(&mut registry, a, 2);

        let mut atlas = FrameAtlas::new(4096, 256);
        // dirty the backing store to prove padding is rewritten
        atlas.bytes.fill(0xAB);
        atlas.assemble(&registry).unwrap();

        let records = registry.get(a).unwrap().instance_bytes();
        let bytes = atlas.bytes();
        assert_eq!(&bytes[..records.len()], records);
        assert!(bytes[records.len()..].iter().all(|b| *b == 0));

        let second: InstanceRecord = ByteReader::new(bytes)
            .read_pod(InstanceRecord::SIZE)
            .unwrap();
        assert_eq!(second.color, [1.0; 4]);
    }

    #[test]
    fn test_overflow_skips_mesh_and_counts_demand() {
        let mut registry = MeshRegistry::new();
        let big = registry.register(MeshDesc::instances("big", 16));
        let small = registry.register(MeshDesc::instances("small", 16));
        let _big = populate(&mut registry, big, 4); // 1152 -> 1280
        let _small = populate(&mut registry, small, 1); // 288 -> 512

        let mut atlas = FrameAtlas::new(1024, 256);
        let report = atlas.assemble(&registry).unwrap();

        assert!(report.overflowed());
        assert_eq!(report.skipped, 1);
        assert_eq!(report.placed, 1);
        assert!(atlas.segment(big).is_none());
        assert_eq!(atlas.segment(small).unwrap().range.offset, 0);
        assert_eq!(report.used_bytes, 512);
        assert_eq!(report.demanded_bytes, 1280 + 512);
    }

    #[test]
    fn test_stale_mesh_id_has_no_segment() {
        let mut registry = MeshRegistry::new();
        let rock = registry.register(MeshDesc::instances("rock", 16));
        registry.unregister(rock);
        let lamp = registry.register(MeshDesc::lights("lamp", 16));
        let _lamp = populate(&mut registry, lamp, 2);

        let mut atlas = FrameAtlas::new(4096, 256);
        atlas.assemble(&registry).unwrap();

        assert_eq!(atlas.segment(lamp).unwrap().instance_count, 2);
        assert!(atlas.segment(rock).is_none());
    }

    #[test]
    fn test_grow_discards_segments() {
        let mut registry = MeshRegistry::new();
        let a = registry.register(MeshDesc::instances("a", 16));
        let _a = populate(&mut registry, a, 1);

        let mut atlas = FrameAtlas::new(512, 256);
        atlas.assemble(&registry).unwrap();
        atlas.grow_to(1024);

        assert_eq!(atlas.capacity(), 1024);
        assert_eq!(atlas.used(), 0);
        assert!(atlas.segments().is_empty());
    }

    #[test]
    #[should_panic(expected = "not a power of two")]
    fn test_rejects_odd_alignment() {
        let _ = FrameAtlas::new(1024, 48);
    }
}
