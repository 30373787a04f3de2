//! Slot arena with stable handles and O(1) uniform sampling.
//!
//! Values live in a `Vec` of optional slots addressed by [`SlotId`]; freed
//! slots are recycled through a free list. Alongside the slots the arena keeps
//! a dense vector of occupied indices so that [`SlotArena::sample`] can pick a
//! uniformly random live entry without scanning holes.
//!
//! ```text
//!   slots:  [ A | - | C | D | - ]        free_list: [1, 4]
//!   dense:  [ 0, 3, 2 ]                  (order is arbitrary)
//!
//!   remove(id 0): swap_remove dense[0], patch moved entry's dense_pos
//!   dense:  [ 2, 3 ]
//! ```
//!
//! All operations are O(1); `iter` is O(slots).

use rand::Rng;

/// Stable handle into a [`SlotArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
struct Slot<T> {
    value: T,
    dense_pos: usize,
}

#[derive(Debug)]
pub struct SlotArena<T> {
    slots: Vec<Option<Slot<T>>>,
    free_list: Vec<usize>,
    dense: Vec<usize>,
}

impl<T> SlotArena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            dense: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            dense: Vec::with_capacity(capacity),
        }
    }

    pub fn insert(&mut self, value: T) -> SlotId {
        let slot = Slot {
            value,
            dense_pos: self.dense.len(),
        };
        let idx = if let Some(idx) = self.free_list.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        };
        self.dense.push(idx);
        SlotId(idx)
    }

    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let slot = self.slots.get_mut(id.0)?.take()?;
        self.dense.swap_remove(slot.dense_pos);
        if let Some(&moved) = self.dense.get(slot.dense_pos)
            && let Some(Some(moved_slot)) = self.slots.get_mut(moved)
        {
            moved_slot.dense_pos = slot.dense_pos;
        }
        self.free_list.push(id.0);
        Some(slot.value)
    }

    #[inline]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots
            .get(id.0)
            .and_then(|slot| slot.as_ref().map(|s| &s.value))
    }

    #[inline]
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut().map(|s| &mut s.value))
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.get(id).is_some()
    }

    /// Picks a live entry uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<SlotId> {
        if self.dense.is_empty() {
            return None;
        }
        let pos = rng.gen_range(0..self.dense.len());
        Some(SlotId(self.dense[pos]))
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.dense.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|s| (SlotId(idx), &s.value)))
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        let live = self.slots.iter().filter(|s| s.is_some()).count();
        assert_eq!(live, self.dense.len());
        assert_eq!(live + self.free_list.len(), self.slots.len());
        for (pos, &idx) in self.dense.iter().enumerate() {
            let slot = self.slots[idx].as_ref().expect("dense entry points at empty slot");
            assert_eq!(slot.dense_pos, pos);
        }
    }
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
