//! Standard per-instance record.

use bytemuck::{Pod, Zeroable};

use super::{FieldId, FieldKind, FieldSlot, GpuRecord, RecordLayout, IDENTITY, UNIFORM_SLOTS};

/// Byte offsets of the instance record fields.
mod offsets {
    pub const WORLD: usize = 0;
    pub const INVERSE_WORLD: usize = 64;
    pub const NORMAL: usize = 128;
    pub const COLOR: usize = 192;
    pub const SELECTED: usize = 208;
    pub const OCCLUDED: usize = 212;
    pub const UNIFORMS: usize = 224;
    pub const SIZE: usize = 288;
}

/// Per-instance data consumed by the instanced draw stage.
///
/// Matrices are column-major. Flags are 0 or 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct InstanceRecord {
    /// World transform.
    pub world: [f32; 16],
    /// Inverse world transform.
    pub inverse_world: [f32; 16],
    /// Normal transform.
    pub normal: [f32; 16],
    /// RGBA color.
    pub color: [f32; 4],
    /// Selection flag.
    pub selected: u32,
    /// Occlusion / LOD flag.
    pub occluded: u32,
    _pad: [u32; 2],
    /// Free-form vec4 slots.
    pub uniforms: [[f32; 4]; UNIFORM_SLOTS as usize],
}

const _: () = {
    assert!(std::mem::size_of::<InstanceRecord>() == offsets::SIZE);
    assert!(std::mem::offset_of!(InstanceRecord, world) == offsets::WORLD);
    assert!(std::mem::offset_of!(InstanceRecord, inverse_world) == offsets::INVERSE_WORLD);
    assert!(std::mem::offset_of!(InstanceRecord, normal) == offsets::NORMAL);
    assert!(std::mem::offset_of!(InstanceRecord, color) == offsets::COLOR);
    assert!(std::mem::offset_of!(InstanceRecord, selected) == offsets::SELECTED);
    assert!(std::mem::offset_of!(InstanceRecord, occluded) == offsets::OCCLUDED);
    assert!(std::mem::offset_of!(InstanceRecord, uniforms) == offsets::UNIFORMS);
};

impl InstanceRecord {
    /// Size in bytes.
    pub const SIZE: usize = offsets::SIZE;

    /// Creates a record placed by `world`, with matching inverse and normal
    /// transforms supplied by the caller.
    #[must_use]
    pub fn new(world: [f32; 16], inverse_world: [f32; 16], normal: [f32; 16]) -> Self {
        Self {
            world,
            inverse_world,
            normal,
            ..Self::default()
        }
    }

    /// Sets the color.
    #[must_use]
    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    /// Sets the selection flag.
    #[must_use]
    pub fn with_selected(mut self, selected: bool) -> Self {
        self.selected = u32::from(selected);
        self
    }
}

impl Default for InstanceRecord {
    /// Identity transforms, opaque white, no flags.
    fn default() -> Self {
        Self {
            world: IDENTITY,
            inverse_world: IDENTITY,
            normal: IDENTITY,
            color: [1.0; 4],
            selected: 0,
            occluded: 0,
            _pad: [0; 2],
            uniforms: [[0.0; 4]; UNIFORM_SLOTS as usize],
        }
    }
}

impl GpuRecord for InstanceRecord {
    fn layout() -> &'static RecordLayout {
        &INSTANCE_LAYOUT
    }
}

fn instance_template() -> Vec<u8> {
    bytemuck::bytes_of(&InstanceRecord::default()).to_vec()
}

/// Layout of [`InstanceRecord`].
pub static INSTANCE_LAYOUT: RecordLayout = RecordLayout {
    name: "instance",
    size: offsets::SIZE,
    fields: &[
        FieldSlot::new(FieldId::World, offsets::WORLD, FieldKind::Mat4),
        FieldSlot::new(FieldId::InverseWorld, offsets::INVERSE_WORLD, FieldKind::Mat4),
        FieldSlot::new(FieldId::Normal, offsets::NORMAL, FieldKind::Mat4),
        FieldSlot::new(FieldId::Color, offsets::COLOR, FieldKind::Vec4),
        FieldSlot::new(FieldId::Selected, offsets::SELECTED, FieldKind::U32),
        FieldSlot::new(FieldId::Occluded, offsets::OCCLUDED, FieldKind::U32),
        FieldSlot::new(FieldId::Uniform(0), offsets::UNIFORMS, FieldKind::Vec4),
        FieldSlot::new(FieldId::Uniform(1), offsets::UNIFORMS + 16, FieldKind::Vec4),
        FieldSlot::new(FieldId::Uniform(2), offsets::UNIFORMS + 32, FieldKind::Vec4),
        FieldSlot::new(FieldId::Uniform(3), offsets::UNIFORMS + 48, FieldKind::Vec4),
    ],
    template: instance_template,
};
