//! # Mesh Registry
//!
//! Maps mesh ids to their instance stores. The registry is an ordinary value
//! owned by the rendering system: created with it, torn down with it, and
//! passed explicitly to everything that needs the mesh table.
//!
//! Ids carry a slot index and a generation. Unregistering a mesh frees its
//! slot for reuse and bumps the slot's generation, so an id held past its
//! mesh's lifetime never resolves to the mesh that took the slot over.
//! Iteration always walks slots in ascending order, which gives the atlas
//! sweep a stable per-frame order.

use std::fmt;

use crate::store::{MeshDesc, MeshInstanceStore};

/// Handle to a registered mesh.
///
/// - Lower 32 bits: slot index in the registry
/// - Upper 32 bits: generation of that slot when the mesh was registered
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MeshId(u64);

impl MeshId {
    /// Creates a mesh id from slot index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// The slot index portion of the id.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// The generation portion of the id.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }
}

impl fmt::Display for MeshId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mesh#{}v{}", self.index(), self.generation())
    }
}

/// One registry slot: the current generation and the store, if occupied.
#[derive(Default)]
struct MeshSlot {
    generation: u32,
    store: Option<MeshInstanceStore>,
}

/// Owner of every [`MeshInstanceStore`].
///
/// # Example
///
/// ```rust
/// use tessera_core::{MeshDesc, MeshRegistry};
///
/// let mut registry = MeshRegistry::new();
/// let rock = registry.register(MeshDesc::instances("rock", 1024));
/// let lamp = registry.register(MeshDesc::lights("lamp", 64));
/// assert_eq!(registry.len(), 2);
///
/// registry.unregister(rock);
/// assert!(registry.get(rock).is_none());
/// assert!(registry.get(lamp).is_some());
///
/// // the freed slot is reused, but the old id stays dead
/// let tree = registry.register(MeshDesc::instances("tree", 256));
/// assert_eq!(tree.index(), rock.index());
/// assert!(registry.get(rock).is_none());
/// assert_eq!(registry.get(tree).unwrap().desc().label, "tree");
/// ```
#[derive(Default)]
pub struct MeshRegistry {
    /// Slots indexed by `MeshId::index`.
    slots: Vec<MeshSlot>,
    /// Free slot indices, reused lowest-last.
    free_list: Vec<u32>,
}

impl MeshRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered meshes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Returns true if no mesh is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a mesh and creates its store.
    ///
    /// # Panics
    ///
    /// Panics if more than `u32::MAX` meshes are registered.
    pub fn register(&mut self, desc: MeshDesc) -> MeshId {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).expect("mesh id space exhausted");
                self.slots.push(MeshSlot::default());
                index
            }
        };
        let slot = &mut self.slots[index as usize];
        let id = MeshId::new(index, slot.generation);
        tracing::info!(
            mesh = %id,
            label = %desc.label,
            layout = desc.layout.name,
            max_instances = desc.max_instances,
            "mesh registered"
        );
        slot.store = Some(MeshInstanceStore::new(id, desc));
        id
    }

    /// Unregisters a mesh. Every owner still linked to it is unlinked.
    ///
    /// Returns false if the id was not registered or is stale.
    pub fn unregister(&mut self, id: MeshId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index() as usize) else {
            return false;
        };
        if slot.generation != id.generation() {
            return false;
        }
        let Some(mut store) = slot.store.take() else {
            return false;
        };
        slot.generation = slot.generation.wrapping_add(1);
        store.clear();
        self.free_list.push(id.index());
        tracing::info!(mesh = %id, label = %store.desc().label, "mesh unregistered");
        true
    }

    /// Returns true if `id` names a currently registered mesh.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: MeshId) -> bool {
        self.get(id).is_some()
    }

    /// Looks up a store. Stale ids resolve to `None`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: MeshId) -> Option<&MeshInstanceStore> {
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.store.as_ref()
    }

    /// Looks up a store mutably. Stale ids resolve to `None`.
    #[inline]
    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut MeshInstanceStore> {
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.store.as_mut()
    }

    /// Iterates over every registered store in id order.
    pub fn iter(&self) -> impl Iterator<Item = &MeshInstanceStore> {
        self.slots.iter().filter_map(|slot| slot.store.as_ref())
    }

    /// Iterates over stores with at least one live record, in id order.
    pub fn iter_active(&self) -> impl Iterator<Item = &MeshInstanceStore> {
        self.iter().filter(|store| !store.is_empty())
    }

    /// Total live records across every mesh.
    #[must_use]
    pub fn total_instances(&self) -> u64 {
        self.iter().map(|store| u64::from(store.count())).sum()
    }

    /// Empties every store without unregistering any mesh (scene reload).
    pub fn clear_all(&mut self) {
        for store in self.slots.iter_mut().filter_map(|slot| slot.store.as_mut()) {
            store.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InstanceSlot;

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = MeshRegistry::new();
        let a = registry.register(MeshDesc::instances("a", 4));
        let b = registry.register(MeshDesc::instances("b", 4));
        assert_eq!((a.index(), a.generation()), (0, 0));
        assert_eq!((b.index(), b.generation()), (1, 0));
        assert_eq!(registry.get(b).unwrap().id(), b);
    }

    #[test]
    fn test_unregister_reuses_slot() {
        let mut registry = MeshRegistry::new();
        let a = registry.register(MeshDesc::instances("a", 4));
        let _b = registry.register(MeshDesc::instances("b", 4));

        assert!(registry.unregister(a));
        assert!(!registry.unregister(a));
        assert_eq!(registry.len(), 1);

        let c = registry.register(MeshDesc::instances("c", 4));
        assert_eq!(c.index(), a.index());
        assert_eq!(c.generation(), a.generation() + 1);
        assert_ne!(c, a);
        assert_eq!(registry.get(c).unwrap().desc().label, "c");
        assert_eq!(registry.get(c).unwrap().id(), c);
    }

    #[test]
    fn test_stale_id_does_not_reach_reused_slot() {
        let mut registry = MeshRegistry::new();
        let rock = registry.register(MeshDesc::instances("rock", 4));
        assert!(registry.unregister(rock));
        let lamp = registry.register(MeshDesc::lights("lamp", 4));
        assert_eq!(lamp.index(), rock.index());

        assert!(registry.get(rock).is_none());
        assert!(registry.get_mut(rock).is_none());
        assert!(!registry.contains(rock));
        assert!(!registry.unregister(rock));

        assert!(registry.contains(lamp));
        assert_eq!(registry.get(lamp).unwrap().desc().label, "lamp");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_unlinks_owners() {
        let mut registry = MeshRegistry::new();
        let a = registry.register(MeshDesc::instances("a", 4));
        let slot = InstanceSlot::new();
        registry.get_mut(a).unwrap().acquire(&slot).unwrap();

        registry.unregister(a);
        assert!(!slot.is_linked());
    }

    #[test]
    fn test_iter_active_skips_empty_and_keeps_order() {
        let mut registry = MeshRegistry::new();
        let ids: Vec<MeshId> = (0..4)
            .map(|i| registry.register(MeshDesc::instances(format!("m{i}"), 4)))
            .collect();
        let slots: Vec<InstanceSlot> = (0..3).map(|_| InstanceSlot::new()).collect();
        registry.get_mut(ids[3]).unwrap().acquire(&slots[0]).unwrap();
        registry.get_mut(ids[1]).unwrap().acquire(&slots[1]).unwrap();
        registry.get_mut(ids[1]).unwrap().acquire(&slots[2]).unwrap();

        let active: Vec<MeshId> = registry.iter_active().map(MeshInstanceStore::id).collect();
        assert_eq!(active, vec![ids[1], ids[3]]);
        assert_eq!(registry.total_instances(), 3);

        registry.clear_all();
        assert_eq!(registry.iter_active().count(), 0);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_display() {
        assert_eq!(MeshId::new(12, 3).to_string(), "mesh#12v3");
    }
}
