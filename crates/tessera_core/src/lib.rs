//! # Tessera Core
//!
//! The CPU half of the instance-data plane:
//! - Fixed-layout instance records whose byte offsets match the shader interface
//! - Compacting per-mesh instance stores (no holes, O(1) removal)
//! - An explicit mesh registry owned by the rendering system
//!
//! ## Architecture Rules
//!
//! 1. **Records are bytes** - every field lives at a fixed offset, written through
//!    a bounds-checked writer
//! 2. **Dense storage** - `[0, count)` is always fully populated
//! 3. **Owners are never kept alive by a store** - back-references are weak
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{FieldId, FieldValue, InstanceSlot, MeshDesc, MeshRegistry};
//!
//! let mut registry = MeshRegistry::new();
//! let crate_mesh = registry.register(MeshDesc::instances("crate", 512));
//!
//! let slot = InstanceSlot::new();
//! let store = registry.get_mut(crate_mesh).unwrap();
//! let index = store.acquire(&slot).unwrap();
//! assert_eq!(slot.index(), Some(index));
//!
//! store
//!     .set_field(index, FieldId::Color, FieldValue::Vec4([1.0, 0.0, 0.0, 1.0]))
//!     .unwrap();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod memory;
pub mod record;
pub mod registry;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::{align_up, ByteReader, ByteWriter};
pub use record::{
    FalloffMode, FieldId, FieldKind, FieldSlot, FieldValue, GpuRecord, InstanceRecord,
    LightRecord, RecordLayout, IDENTITY, INSTANCE_LAYOUT, LIGHT_LAYOUT, UNIFORM_SLOTS,
};
pub use registry::{MeshId, MeshRegistry};
pub use store::{
    InstanceSlot, MeshDesc, MeshInstanceStore, OwnerLink, INSTANCE_BINDING, LIGHT_BINDING,
};
