//! # Owner Links
//!
//! The back-reference between a scene component and its instance record.
//!
//! ```text
//!   scene component                       MeshInstanceStore
//!  ┌───────────────────┐   Arc<AtomicU32>  ┌─────────────────────┐
//!  │ InstanceSlot ─────┼──────────┬────────┼── owners[i]: Weak   │
//!  └───────────────────┘          │        └─────────────────────┘
//!                          index = i (or UNLINKED)
//! ```
//!
//! The component owns the slot. The store only holds a `Weak`, so dropping a
//! component can never be delayed by the renderer, and the store can always
//! tell the component which index its record currently occupies.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

/// Sentinel meaning "no live record".
const UNLINKED: u32 = u32::MAX;

/// Owner-side handle: remembers which record index belongs to the owner.
///
/// Field setters address records purely by index, so the owner reads its
/// current index from here before every write.
#[derive(Debug)]
pub struct InstanceSlot {
    index: Arc<AtomicU32>,
}

impl InstanceSlot {
    /// Creates an unlinked slot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            index: Arc::new(AtomicU32::new(UNLINKED)),
        }
    }

    /// Current record index, or `None` if the owner has no live record.
    #[inline]
    #[must_use]
    pub fn index(&self) -> Option<u32> {
        match self.index.load(Ordering::Relaxed) {
            UNLINKED => None,
            index => Some(index),
        }
    }

    /// Returns true if the owner currently has a record.
    #[inline]
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.index().is_some()
    }

    /// Creates the store-side weak link.
    #[must_use]
    pub fn link(&self) -> OwnerLink {
        OwnerLink {
            index: Arc::downgrade(&self.index),
        }
    }
}

impl Default for InstanceSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Store-side weak back-reference to an [`InstanceSlot`].
#[derive(Debug, Clone)]
pub struct OwnerLink {
    index: Weak<AtomicU32>,
}

impl OwnerLink {
    /// Tells the owner its record now lives at `index` (`None` = released).
    ///
    /// Returns false if the owner no longer exists.
    pub(crate) fn assign(&self, index: Option<u32>) -> bool {
        match self.index.upgrade() {
            Some(slot) => {
                slot.store(index.unwrap_or(UNLINKED), Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Returns true if the owning slot still exists.
    #[inline]
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.index.strong_count() > 0
    }

    /// The index the owner believes it has, `None` if unlinked or dropped.
    #[must_use]
    pub fn reported_index(&self) -> Option<u32> {
        let slot = self.index.upgrade()?;
        match slot.load(Ordering::Relaxed) {
            UNLINKED => None,
            index => Some(index),
        }
    }

    /// Returns true if both links point at the same slot.
    #[inline]
    #[must_use]
    pub fn same_owner(&self, slot: &InstanceSlot) -> bool {
        std::ptr::eq(self.index.as_ptr(), Arc::as_ptr(&slot.index))
    }
}
