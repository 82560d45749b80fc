//! Compacting per-mesh instance store.

use std::ops::Range;

use super::owner::{InstanceSlot, OwnerLink};
use crate::error::{StoreError, StoreResult};
use crate::memory::{ByteReader, ByteWriter};
use crate::record::{
    FieldId, FieldKind, FieldSlot, FieldValue, GpuRecord, RecordLayout, INSTANCE_LAYOUT, LIGHT_LAYOUT,
};
use crate::registry::MeshId;

/// Default binding point for instance-record buffers.
pub const INSTANCE_BINDING: u32 = 0;
/// Default binding point for light-record buffers.
pub const LIGHT_BINDING: u32 = 1;

/// Registration parameters for one mesh.
#[derive(Debug, Clone)]
pub struct MeshDesc {
    /// Debug label.
    pub label: String,
    /// Hard bound on live instances.
    pub max_instances: u32,
    /// Shader binding point the mesh's draw call reads its records from.
    pub binding_point: u32,
    /// Record variant stored for this mesh.
    pub layout: &'static RecordLayout,
}

impl MeshDesc {
    /// A mesh drawing standard instance records.
    #[must_use]
    pub fn instances(label: impl Into<String>, max_instances: u32) -> Self {
        Self {
            label: label.into(),
            max_instances,
            binding_point: INSTANCE_BINDING,
            layout: &INSTANCE_LAYOUT,
        }
    }

    /// A light volume drawing light records.
    #[must_use]
    pub fn lights(label: impl Into<String>, max_instances: u32) -> Self {
        Self {
            label: label.into(),
            max_instances,
            binding_point: LIGHT_BINDING,
            layout: &LIGHT_LAYOUT,
        }
    }

    /// Overrides the binding point.
    #[must_use]
    pub fn with_binding_point(mut self, binding_point: u32) -> Self {
        self.binding_point = binding_point;
        self
    }

    /// Size of one record in bytes.
    #[inline]
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.layout.size
    }
}

/// Dense array of instance records for a single mesh.
///
/// `records` always holds exactly `count × record_size` bytes and `owners`
/// exactly `count` links, so `[0, count)` never contains a hole.
///
/// # Thread Safety
///
/// Not synchronized. All mutation happens on the render thread before the
/// frame's atlas sweep.
pub struct MeshInstanceStore {
    id: MeshId,
    desc: MeshDesc,
    /// Bytes of a freshly acquired record.
    template: Vec<u8>,
    records: Vec<u8>,
    owners: Vec<OwnerLink>,
}

impl MeshInstanceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(id: MeshId, desc: MeshDesc) -> Self {
        let template = desc.layout.template();
        Self {
            id,
            desc,
            template,
            records: Vec::new(),
            owners: Vec::new(),
        }
    }

    /// Registry id of the mesh.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> MeshId {
        self.id
    }

    /// Registration parameters.
    #[inline]
    #[must_use]
    pub const fn desc(&self) -> &MeshDesc {
        &self.desc
    }

    /// Number of live records.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn count(&self) -> u32 {
        // bounded by max_instances
        self.owners.len() as u32
    }

    /// Returns true if no records are live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Record size in bytes.
    #[inline]
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.desc.layout.size
    }

    /// The packed bytes of records `[0, count)`.
    #[inline]
    #[must_use]
    pub fn instance_bytes(&self) -> &[u8] {
        &self.records
    }

    /// Appends a record for `owner` and tells the owner its index.
    ///
    /// The new record starts as the layout's template (identity transforms,
    /// default color).
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the mesh already holds `max_instances`
    /// records; the occurrence should be skipped this frame.
    ///
    /// # Panics
    ///
    /// Panics if `owner` already has a live record.
    pub fn acquire(&mut self, owner: &InstanceSlot) -> StoreResult<u32> {
        assert!(
            !owner.is_linked(),
            "owner already holds record {:?} (acquired twice without release)",
            owner.index()
        );

        let index = self.count();
        if index >= self.desc.max_instances {
            tracing::debug!(
                mesh = %self.id,
                label = %self.desc.label,
                max = self.desc.max_instances,
                "instance refused, mesh at capacity"
            );
            return Err(StoreError::CapacityExceeded {
                mesh: self.id,
                max: self.desc.max_instances,
            });
        }

        self.records.extend_from_slice(&self.template);
        let link = owner.link();
        link.assign(Some(index));
        self.owners.push(link);
        Ok(index)
    }

    /// Removes the record at `index`, moving the last record into its place.
    ///
    /// `owner` names the instance the caller means to release; the released
    /// owner is unlinked and the moved owner is told its new index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`, or if the record at `index` does not
    /// belong to `owner` (a second release of the same instance lands here
    /// once compaction has moved another record into the hole).
    pub fn release(&mut self, index: u32, owner: &InstanceSlot) {
        let count = self.count();
        assert!(
            index < count,
            "release of index {index} outside [0, {count}) on {}",
            self.id
        );
        assert!(
            self.owners[index as usize].same_owner(owner),
            "record {index} on {} is not owned by the releasing slot (double release?)",
            self.id
        );
        self.remove(index);
    }

    /// Releases the record owned by `owner`, wherever compaction put it.
    ///
    /// # Panics
    ///
    /// Panics if `owner` has no live record in this store.
    pub fn release_slot(&mut self, owner: &InstanceSlot) {
        let index = owner
            .index()
            .unwrap_or_else(|| panic!("owner has no live record on {} (double release?)", self.id));
        self.release(index, owner);
    }

    fn remove(&mut self, index: u32) {
        let size = self.record_size();
        let last = self.count() - 1;
        if index != last {
            let src = self.record_range(last);
            self.records.copy_within(src, index as usize * size);
        }
        self.records.truncate(last as usize * size);

        let released = self.owners.swap_remove(index as usize);
        released.assign(None);

        if index != last {
            let moved = &self.owners[index as usize];
            if !moved.assign(Some(index)) {
                tracing::debug!(mesh = %self.id, index, "moved record has no live owner");
            }
            tracing::trace!(mesh = %self.id, from = last, to = index, "record compacted");
        }
    }

    /// Writes one field of the record at `index`.
    ///
    /// # Errors
    ///
    /// `UnknownField` if the layout has no such field, `FieldKindMismatch`
    /// if `value` has the wrong kind.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    pub fn set_field(&mut self, index: u32, field: FieldId, value: FieldValue) -> StoreResult<()> {
        let range = self.record_range(index);
        let slot = self.field_slot(field)?;
        if slot.kind != value.kind() {
            return Err(StoreError::FieldKindMismatch {
                field,
                expected: slot.kind,
                found: value.kind(),
            });
        }
        let mut writer = ByteWriter::at(&mut self.records[range], slot.offset)?;
        writer.write_bytes(value.as_bytes())
    }

    /// Reads one field of the record at `index`.
    ///
    /// # Errors
    ///
    /// `UnknownField` if the layout has no such field.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    pub fn get_field(&self, index: u32, field: FieldId) -> StoreResult<FieldValue> {
        let reader = ByteReader::new(self.record_bytes(index));
        let slot = self.field_slot(field)?;
        Ok(match slot.kind {
            FieldKind::Mat4 => FieldValue::Mat4(reader.read_pod(slot.offset)?),
            FieldKind::Vec4 => FieldValue::Vec4(reader.read_pod(slot.offset)?),
            FieldKind::F32 => FieldValue::F32(reader.read_pod(slot.offset)?),
            FieldKind::U32 => FieldValue::U32(reader.read_pod(slot.offset)?),
        })
    }

    /// Overwrites the whole record at `index`.
    ///
    /// # Errors
    ///
    /// `LayoutMismatch` if `R` is a different record variant.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    pub fn write_record<R: GpuRecord>(&mut self, index: u32, record: &R) -> StoreResult<()> {
        self.check_layout(R::layout())?;
        let range = self.record_range(index);
        ByteWriter::new(&mut self.records[range]).write_pod(record)
    }

    /// Reads the whole record at `index`.
    ///
    /// # Errors
    ///
    /// `LayoutMismatch` if `R` is a different record variant.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    pub fn read_record<R: GpuRecord>(&self, index: u32) -> StoreResult<R> {
        self.check_layout(R::layout())?;
        ByteReader::new(self.record_bytes(index)).read_pod(0)
    }

    /// Raw bytes of the record at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    #[must_use]
    pub fn record_bytes(&self, index: u32) -> &[u8] {
        &self.records[self.record_range(index)]
    }

    /// Owner link of the record at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= count`.
    #[must_use]
    pub fn owner(&self, index: u32) -> &OwnerLink {
        self.check_index(index);
        &self.owners[index as usize]
    }

    /// Returns true if every live owner reports the index it occupies.
    #[must_use]
    pub fn links_consistent(&self) -> bool {
        self.records.len() == self.owners.len() * self.record_size()
            && self.owners.iter().enumerate().all(|(i, link)| {
                !link.is_alive() || link.reported_index() == u32::try_from(i).ok()
            })
    }

    /// Drops every record without freeing storage; all owners are unlinked.
    pub fn clear(&mut self) {
        for link in self.owners.drain(..) {
            link.assign(None);
        }
        self.records.clear();
    }

    #[inline]
    fn check_index(&self, index: u32) {
        let count = self.count();
        assert!(index < count, "index {index} outside [0, {count}) on {}", self.id);
    }

    #[inline]
    fn record_range(&self, index: u32) -> Range<usize> {
        self.check_index(index);
        let size = self.record_size();
        let start = index as usize * size;
        start..start + size
    }

    fn field_slot(&self, field: FieldId) -> StoreResult<FieldSlot> {
        self.desc
            .layout
            .slot(field)
            .copied()
            .ok_or(StoreError::UnknownField {
                field,
                layout: self.desc.layout.name,
            })
    }

    fn check_layout(&self, layout: &'static RecordLayout) -> StoreResult<()> {
        if self.desc.layout.same_as(layout) {
            Ok(())
        } else {
            Err(StoreError::LayoutMismatch {
                expected: self.desc.layout.name,
                found: layout.name,
            })
        }
    }
}
