//! # Mesh Instance Stores
//!
//! One store per registered mesh. A store keeps the mesh's instance records
//! packed at the front of a byte array, next to the owner link of each record.
//!
//! ## Compaction
//!
//! ```text
//! release(1, &b) with count = 5:
//!
//!   [ A | B | C | D | E ]      E moves into the hole left by B,
//!   [ A | E | C | D ]          E's owner is told its index is now 1
//! ```
//!
//! Instance order within a mesh carries no meaning, so removal is O(1).

mod mesh_store;
mod owner;

pub use mesh_store::{MeshDesc, MeshInstanceStore, INSTANCE_BINDING, LIGHT_BINDING};
pub use owner::{InstanceSlot, OwnerLink};
