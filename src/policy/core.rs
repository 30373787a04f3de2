//! Single-queue building block shared by most policies.
//!
//! [`QueueCore`] bundles the pieces nearly every policy needs: the
//! [`CacheState`] counters, an [`ObjectStore`] of entries carrying metadata
//! `M`, and one [`IntrusiveList`] ordering them (head = most favored,
//! tail = next victim). Policies add their own scalar state around it.
//!
//! ```text
//!   QueueCore<M>
//!   ├── state:  CacheState      capacity, n_req, n_miss, n_promotion ...
//!   ├── store:  ObjectStore<M>  id → entry { size, links, meta: M }
//!   └── queue:  IntrusiveList   head ◄──► ... ◄──► tail
//! ```

use crate::ds::{IntrusiveList, SlotId};
use crate::error::InvariantError;
use crate::request::{ObjId, ObjectRef, Request};
use crate::store::{CacheObject, ObjectStore};
use crate::traits::CacheState;

#[derive(Debug)]
pub struct QueueCore<M> {
    pub state: CacheState,
    pub store: ObjectStore<M>,
    pub queue: IntrusiveList,
}

impl<M> QueueCore<M> {
    pub fn new(capacity: u64, obj_md_size: u64) -> Self {
        Self {
            state: CacheState::new(capacity, obj_md_size),
            store: ObjectStore::new(obj_md_size),
            queue: IntrusiveList::new(),
        }
    }

    #[inline]
    pub fn lookup(&self, obj_id: ObjId) -> Option<SlotId> {
        self.store.lookup(obj_id)
    }

    #[inline]
    pub fn obj_ref(&self, id: SlotId) -> ObjectRef {
        self.store[id].as_ref()
    }

    #[inline]
    pub fn meta(&self, id: SlotId) -> &M {
        &self.store[id].meta
    }

    #[inline]
    pub fn meta_mut(&mut self, id: SlotId) -> &mut M {
        &mut self.store[id].meta
    }

    #[inline]
    pub fn tail(&self) -> Option<SlotId> {
        self.queue.tail()
    }

    /// Stores `req` and links it at the head.
    pub fn push_front(&mut self, req: &Request, meta: M) -> SlotId {
        let id = self.store.insert(req, meta);
        self.queue.push_front(&mut self.store, id);
        id
    }

    /// Stores `req` and links it at the tail.
    pub fn push_back(&mut self, req: &Request, meta: M) -> SlotId {
        let id = self.store.insert(req, meta);
        self.queue.push_back(&mut self.store, id);
        id
    }

    /// Moves `id` to the head and counts a promotion.
    #[inline]
    pub fn requeue(&mut self, id: SlotId) {
        self.queue.move_to_front(&mut self.store, id);
        self.state.n_promotion += 1;
    }

    /// Unlinks and frees `id`.
    pub fn evict_slot(&mut self, id: SlotId) -> Option<CacheObject<M>> {
        self.queue.unlink(&mut self.store, id);
        self.store.remove(id)
    }

    /// Unlinks and frees the tail.
    pub fn evict_tail(&mut self) -> Option<CacheObject<M>> {
        debug_assert!(!self.queue.is_empty(), "evict on an empty cache");
        let id = self.queue.tail()?;
        self.evict_slot(id)
    }

    pub fn remove(&mut self, obj_id: ObjId) -> bool {
        match self.store.lookup(obj_id) {
            Some(id) => self.evict_slot(id).is_some(),
            None => false,
        }
    }

    #[inline]
    pub fn n_obj(&self) -> u64 {
        self.store.len() as u64
    }

    #[inline]
    pub fn occupied_bytes(&self) -> u64 {
        self.store.occupied_bytes()
    }

    /// Queue walks, store accounting, queue length == resident count and
    /// the capacity bound.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        self.queue.check_invariants(&self.store)?;
        self.store.check_invariants()?;
        if self.queue.len() != self.store.len() {
            return Err(InvariantError::new(format!(
                "queue links {} objects, store holds {}",
                self.queue.len(),
                self.store.len()
            )));
        }
        if self.store.occupied_bytes() > self.state.capacity {
            return Err(InvariantError::new(format!(
                "occupied {} exceeds capacity {}",
                self.store.occupied_bytes(),
                self.state.capacity
            )));
        }
        Ok(())
    }
}

/// Implements the [`EvictionPolicy`](crate::traits::EvictionPolicy)
/// accessors that only forward to a `core: QueueCore<_>` field.
macro_rules! delegate_to_core {
    () => {
        fn state(&self) -> &$crate::traits::CacheState {
            &self.core.state
        }

        fn state_mut(&mut self) -> &mut $crate::traits::CacheState {
            &mut self.core.state
        }

        fn contains(&self, obj_id: $crate::request::ObjId) -> bool {
            self.core.store.contains(obj_id)
        }

        fn occupied_bytes(&self) -> u64 {
            self.core.occupied_bytes()
        }

        fn n_obj(&self) -> u64 {
            self.core.n_obj()
        }

        fn check_invariants(&self) -> Result<(), $crate::error::InvariantError> {
            self.core.check_invariants()
        }
    };
}

pub(crate) use delegate_to_core;
