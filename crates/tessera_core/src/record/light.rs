//! Light-source record variant.

use bytemuck::{Pod, Zeroable};

use super::{FieldId, FieldKind, FieldSlot, GpuRecord, RecordLayout, IDENTITY};

const FIELD_OF_VIEW: usize = 0;
const INTENSITY: usize = 4;
const FALLOFF_MODE: usize = 8;
const RENDERABLE: usize = 12;
const DIRECTION: usize = 16;
const COLOR: usize = 32;
const WORLD: usize = 48;
const SIZE: usize = 112;

/// How a light's intensity decays with distance.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FalloffMode {
    /// No attenuation.
    Constant = 0,
    /// Linear attenuation.
    Linear = 1,
    /// Inverse-square attenuation.
    #[default]
    Quadratic = 2,
}

impl FalloffMode {
    /// Decodes the raw shader value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Constant),
            1 => Some(Self::Linear),
            2 => Some(Self::Quadratic),
            _ => None,
        }
    }

    /// Raw value stored in the record.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self as u32
    }
}

/// Per-light data consumed by the light pass.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightRecord {
    /// Cone angle in radians.
    pub field_of_view: f32,
    /// Intensity multiplier.
    pub intensity: f32,
    /// Raw [`FalloffMode`].
    pub falloff_mode: u32,
    /// Whether the light contributes (0 or 1).
    pub renderable: u32,
    /// Direction (xyz), w unused.
    pub direction: [f32; 4],
    /// RGBA color.
    pub color: [f32; 4],
    /// Placement of the light.
    pub world: [f32; 16],
}

const _: () = {
    assert!(std::mem::size_of::<LightRecord>() == SIZE);
    assert!(std::mem::offset_of!(LightRecord, field_of_view) == FIELD_OF_VIEW);
    assert!(std::mem::offset_of!(LightRecord, intensity) == INTENSITY);
    assert!(std::mem::offset_of!(LightRecord, falloff_mode) == FALLOFF_MODE);
    assert!(std::mem::offset_of!(LightRecord, renderable) == RENDERABLE);
    assert!(std::mem::offset_of!(LightRecord, direction) == DIRECTION);
    assert!(std::mem::offset_of!(LightRecord, color) == COLOR);
    assert!(std::mem::offset_of!(LightRecord, world) == WORLD);
};

impl LightRecord {
    /// Size in bytes.
    pub const SIZE: usize = SIZE;

    /// Decoded falloff mode, `None` if the raw value is unknown.
    #[must_use]
    pub const fn falloff(&self) -> Option<FalloffMode> {
        FalloffMode::from_raw(self.falloff_mode)
    }
}

impl Default for LightRecord {
    /// A 45° white spot pointing down -Z at the origin.
    fn default() -> Self {
        Self {
            field_of_view: std::f32::consts::FRAC_PI_4,
            intensity: 1.0,
            falloff_mode: FalloffMode::default().raw(),
            renderable: 1,
            direction: [0.0, 0.0, -1.0, 0.0],
            color: [1.0; 4],
            world: IDENTITY,
        }
    }
}

impl GpuRecord for LightRecord {
    fn layout() -> &'static RecordLayout {
        &LIGHT_LAYOUT
    }
}

fn light_template() -> Vec<u8> {
    bytemuck::bytes_of(&LightRecord::default()).to_vec()
}

/// Layout of [`LightRecord`].
pub static LIGHT_LAYOUT: RecordLayout = RecordLayout {
    name: "light",
    size: SIZE,
    fields: &[
        FieldSlot::new(FieldId::FieldOfView, FIELD_OF_VIEW, FieldKind::F32),
        FieldSlot::new(FieldId::Intensity, INTENSITY, FieldKind::F32),
        FieldSlot::new(FieldId::FalloffMode, FALLOFF_MODE, FieldKind::U32),
        FieldSlot::new(FieldId::Renderable, RENDERABLE, FieldKind::U32),
        FieldSlot::new(FieldId::Direction, DIRECTION, FieldKind::Vec4),
        FieldSlot::new(FieldId::Color, COLOR, FieldKind::Vec4),
        FieldSlot::new(FieldId::World, WORLD, FieldKind::Mat4),
    ],
    template: light_template,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_record_size() {
        assert_eq!(LightRecord::SIZE, 112);
    }

    #[test]
    fn test_falloff_round_trip() {
        for mode in [FalloffMode::Constant, FalloffMode::Linear, FalloffMode::Quadratic] {
            assert_eq!(FalloffMode::from_raw(mode.raw()), Some(mode));
        }
        assert_eq!(FalloffMode::from_raw(9), None);
        assert_eq!(LightRecord::default().falloff(), Some(FalloffMode::Quadratic));
    }

    #[test]
    fn test_light_layout_has_no_instance_flags() {
        assert!(LIGHT_LAYOUT.slot(FieldId::Selected).is_none());
        assert!(LIGHT_LAYOUT.slot(FieldId::Uniform(0)).is_none());
    }
}
