//! Bounded FIFO of object ids without data.
//!
//! Used by the two-queue policy to remember ids recently evicted from its
//! probation queue (A1out). Ids live in their own `SlotArena<Links>` and are
//! ordered by an [`IntrusiveList`]; an `FxHashMap` gives O(1) membership.
//!
//! ```text
//!   index: FxHashMap<ObjId, SlotId>      list over SlotArena<Links>
//!   ┌─────────┬─────────┐               head ─► [C] ◄──► [B] ◄──► [A] ◄── tail
//!   │  id A   │  s_0    │                 newest                  oldest
//!   │  id B   │  s_1    │
//!   └─────────┴─────────┘
//! ```
//!
//! - `record(id)`: pushes `id` as newest, dropping the oldest when full
//! - `remove(id)`: forgets `id`
//!
//! All operations are O(1) average.

use rustc_hash::FxHashMap;

use crate::ds::intrusive_list::{IntrusiveList, Links};
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::error::InvariantError;
use crate::request::ObjId;

#[derive(Debug, Default)]
pub struct GhostList {
    nodes: SlotArena<Links>,
    ids: FxHashMap<SlotId, ObjId>,
    index: FxHashMap<ObjId, SlotId>,
    list: IntrusiveList,
    capacity: usize,
}

impl GhostList {
    /// Creates a ghost list remembering at most `capacity` ids.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn contains(&self, obj_id: ObjId) -> bool {
        self.index.contains_key(&obj_id)
    }

    /// Records `obj_id` as the newest ghost.
    pub fn record(&mut self, obj_id: ObjId) {
        if self.capacity == 0 {
            return;
        }
        if let Some(&slot) = self.index.get(&obj_id) {
            self.list.move_to_front(&mut self.nodes, slot);
            return;
        }
        if self.list.len() >= self.capacity
            && let Some(old) = self.list.pop_back(&mut self.nodes)
        {
            self.nodes.remove(old);
            if let Some(old_id) = self.ids.remove(&old) {
                self.index.remove(&old_id);
            }
        }
        let slot = self.nodes.insert(Links::default());
        self.list.push_front(&mut self.nodes, slot);
        self.ids.insert(slot, obj_id);
        self.index.insert(obj_id, slot);
    }

    /// Forgets `obj_id`; returns `true` if it was remembered.
    pub fn remove(&mut self, obj_id: ObjId) -> bool {
        let Some(slot) = self.index.remove(&obj_id) else {
            return false;
        };
        self.list.unlink(&mut self.nodes, slot);
        self.nodes.remove(slot);
        self.ids.remove(&slot);
        true
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.ids.clear();
        self.index.clear();
        self.list.reset();
    }

    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.list.check_invariants(&self.nodes)?;
        if self.list.len() != self.index.len() || self.ids.len() != self.index.len() {
            return Err(InvariantError::new(format!(
                "ghost list holds {} nodes but indexes {} ids",
                self.list.len(),
                self.index.len()
            )));
        }
        if self.list.len() > self.capacity {
            return Err(InvariantError::new("ghost list over capacity"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oldest_ghost_is_dropped() {
        let mut ghost = GhostList::new(2);
        ghost.record(1);
        ghost.record(2);
        ghost.record(3);
        assert!(!ghost.contains(1));
        assert!(ghost.contains(2));
        assert!(ghost.contains(3));
        ghost.check_invariants().unwrap();
    }

    #[test]
    fn re_recording_refreshes_position() {
        let mut ghost = GhostList::new(2);
        ghost.record(1);
        ghost.record(2);
        ghost.record(1);
        ghost.record(3);
        assert!(ghost.contains(1));
        assert!(!ghost.contains(2));
        ghost.check_invariants().unwrap();
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let mut ghost = GhostList::new(0);
        ghost.record(1);
        assert!(ghost.is_empty());
        assert!(!ghost.contains(1));
    }

    #[test]
    fn remove_and_clear() {
        let mut ghost = GhostList::new(3);
        ghost.record(1);
        ghost.record(2);
        assert!(ghost.remove(1));
        assert!(!ghost.remove(1));
        assert_eq!(ghost.len(), 1);
        ghost.clear();
        assert!(ghost.is_empty());
        ghost.check_invariants().unwrap();
    }
}
