//! # Instance Record Layouts
//!
//! One instance of a mesh is a fixed-size block of bytes. The offsets of every
//! field are dictated by the shader that consumes the structured buffer, so
//! they are spelled out here as data:
//!
//! ```text
//! InstanceRecord (288 bytes)                 LightRecord (112 bytes)
//! ┌──────────────┬────────┐                  ┌──────────────┬────────┐
//! │ world        │   0 m4 │                  │ field_of_view│   0 f32│
//! │ inverse_world│  64 m4 │                  │ intensity    │   4 f32│
//! │ normal       │ 128 m4 │                  │ falloff_mode │   8 u32│
//! │ color        │ 192 v4 │                  │ renderable   │  12 u32│
//! │ selected     │ 208 u32│                  │ direction    │  16 v4 │
//! │ occluded     │ 212 u32│                  │ color        │  32 v4 │
//! │ (padding)    │ 216    │                  │ world        │  48 m4 │
//! │ uniforms[4]  │ 224 v4 │                  └──────────────┴────────┘
//! └──────────────┴────────┘
//! ```
//!
//! Each variant is also a `#[repr(C)]` Pod struct; compile-time assertions
//! keep the struct and the layout table in agreement.

mod instance;
mod light;

pub use instance::{InstanceRecord, INSTANCE_LAYOUT};
pub use light::{FalloffMode, LightRecord, LIGHT_LAYOUT};

use bytemuck::Pod;

/// Number of free-form vec4 uniform slots on an instance record.
pub const UNIFORM_SLOTS: u8 = 4;

/// Identifies one attribute of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldId {
    /// World transform (column-major mat4).
    World,
    /// Inverse of the world transform.
    InverseWorld,
    /// Normal transform (inverse-transpose of world, stored as mat4).
    Normal,
    /// RGBA color.
    Color,
    /// Selection flag (0 or 1).
    Selected,
    /// Occlusion / LOD flag.
    Occluded,
    /// Free-form vec4 slot `0..UNIFORM_SLOTS`.
    Uniform(u8),
    /// Light cone angle in radians.
    FieldOfView,
    /// Light intensity.
    Intensity,
    /// Light falloff mode, see [`FalloffMode`].
    FalloffMode,
    /// Light direction (xyz, w unused).
    Direction,
    /// Whether the light contributes this frame (0 or 1).
    Renderable,
}

/// Storage kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// 16 × f32.
    Mat4,
    /// 4 × f32.
    Vec4,
    /// Single f32.
    F32,
    /// Single u32.
    U32,
}

impl FieldKind {
    /// Size of the field in bytes.
    #[inline]
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Mat4 => 64,
            Self::Vec4 => 16,
            Self::F32 | Self::U32 => 4,
        }
    }
}

/// A value read from or written to a record field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// Column-major 4×4 matrix.
    Mat4([f32; 16]),
    /// Four-component vector.
    Vec4([f32; 4]),
    /// Scalar float.
    F32(f32),
    /// Scalar integer / flag.
    U32(u32),
}

impl FieldValue {
    /// Kind of this value.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::Mat4(_) => FieldKind::Mat4,
            Self::Vec4(_) => FieldKind::Vec4,
            Self::F32(_) => FieldKind::F32,
            Self::U32(_) => FieldKind::U32,
        }
    }

    /// Raw bytes of the value, exactly as they are stored in a record.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Mat4(m) => bytemuck::bytes_of(m),
            Self::Vec4(v) => bytemuck::bytes_of(v),
            Self::F32(f) => bytemuck::bytes_of(f),
            Self::U32(u) => bytemuck::bytes_of(u),
        }
    }

    /// Bit-level equality (NaN payloads and signed zeros compare exactly).
    #[inline]
    #[must_use]
    pub fn bits_eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.as_bytes() == other.as_bytes()
    }
}

/// Position and kind of one field inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot {
    /// Which attribute.
    pub id: FieldId,
    /// Byte offset from the start of the record.
    pub offset: usize,
    /// Storage kind.
    pub kind: FieldKind,
}

impl FieldSlot {
    const fn new(id: FieldId, offset: usize, kind: FieldKind) -> Self {
        Self { id, offset, kind }
    }
}

/// Byte layout of one record variant.
#[derive(Debug)]
pub struct RecordLayout {
    /// Human-readable variant name.
    pub name: &'static str,
    /// Record size in bytes.
    pub size: usize,
    /// Every addressable field.
    pub fields: &'static [FieldSlot],
    /// Produces the bytes of a freshly acquired record.
    template: fn() -> Vec<u8>,
}

impl RecordLayout {
    /// Looks up a field.
    #[inline]
    #[must_use]
    pub fn slot(&self, id: FieldId) -> Option<&FieldSlot> {
        self.fields.iter().find(|slot| slot.id == id)
    }

    /// Bytes a record starts with when it is acquired.
    #[must_use]
    pub fn template(&self) -> Vec<u8> {
        let bytes = (self.template)();
        debug_assert_eq!(bytes.len(), self.size);
        bytes
    }

    /// Returns true if both layouts describe the same variant.
    #[inline]
    #[must_use]
    pub fn same_as(&self, other: &RecordLayout) -> bool {
        self.name == other.name && self.size == other.size
    }
}

/// A Pod struct that mirrors one [`RecordLayout`].
pub trait GpuRecord: Pod {
    /// The layout this struct is laid out as.
    fn layout() -> &'static RecordLayout;
}

/// Column-major identity matrix.
pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];
