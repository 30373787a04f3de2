//! Belady's MIN: evict the object whose next access is farthest away.
//!
//! Requests must carry `next_access_vtime`. Residents are kept ordered by
//! `(next_access, Reverse(obj_id))`, so the victim is the last element:
//! the farthest next access, and among equal times (typically "never") the
//! smallest id.
//!
//! ```text
//!   order: BTreeSet<(next_access, Reverse(obj_id))>
//!     (3, R7) (5, R2) (NEVER, R9) (NEVER, R4)
//!                                   ▲ victim
//! ```

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::InvariantError;
use crate::request::{ObjId, ObjectRef, Request};
use crate::store::ObjectStore;
use crate::traits::{CacheState, EvictionPolicy};

pub struct Belady {
    state: CacheState,
    store: ObjectStore<i64>,
    order: BTreeSet<(i64, Reverse<ObjId>)>,
}

impl Belady {
    pub const NAME: &'static str = "Belady";

    pub fn new(capacity: u64, obj_md_size: u64) -> Self {
        Self {
            state: CacheState::new(capacity, obj_md_size),
            store: ObjectStore::new(obj_md_size),
            order: BTreeSet::new(),
        }
    }

    /// Recorded next access of a resident object.
    pub fn next_access(&self, obj_id: ObjId) -> Option<i64> {
        self.store.lookup(obj_id).map(|id| self.store[id].meta)
    }
}

impl EvictionPolicy for Belady {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn state(&self) -> &CacheState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut CacheState {
        &mut self.state
    }

    fn requires_oracle(&self) -> bool {
        true
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.store.lookup(req.obj_id)?;
        if update {
            let next = req.next_access_or_never();
            let entry = &mut self.store[id];
            self.order.remove(&(entry.meta, Reverse(req.obj_id)));
            entry.meta = next;
            self.order.insert((next, Reverse(req.obj_id)));
        }
        Some(self.store[id].as_ref())
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        let next = req.next_access_or_never();
        let id = self.store.insert(req, next);
        self.order.insert((next, Reverse(req.obj_id)));
        Some(self.store[id].as_ref())
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        let &(_, Reverse(obj_id)) = self.order.last()?;
        self.store.lookup(obj_id).map(|id| self.store[id].as_ref())
    }

    fn evict(&mut self, _req: &Request) {
        debug_assert!(!self.order.is_empty(), "evict on an empty cache");
        if let Some((_, Reverse(obj_id))) = self.order.pop_last()
            && let Some(id) = self.store.lookup(obj_id)
        {
            self.store.remove(id);
        }
    }

    fn remove(&mut self, obj_id: ObjId) -> bool {
        let Some(id) = self.store.lookup(obj_id) else {
            return false;
        };
        self.order.remove(&(self.store[id].meta, Reverse(obj_id)));
        self.store.remove(id).is_some()
    }

    fn contains(&self, obj_id: ObjId) -> bool {
        self.store.contains(obj_id)
    }

    fn occupied_bytes(&self) -> u64 {
        self.store.occupied_bytes()
    }

    fn n_obj(&self) -> u64 {
        self.store.len() as u64
    }

    fn current_params(&self) -> String {
        String::new()
    }

    fn check_invariants(&self) -> Result<(), InvariantError> {
        self.store.check_invariants()?;
        if self.order.len() != self.store.len() {
            return Err(InvariantError::new(format!(
                "order tracks {} objects, store holds {}",
                self.order.len(),
                self.store.len()
            )));
        }
        for (_, obj) in self.store.iter() {
            if !self.order.contains(&(obj.meta, Reverse(obj.obj_id()))) {
                return Err(InvariantError::new(format!(
                    "object {} missing from the next-access order",
                    obj.obj_id()
                )));
            }
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

impl fmt::Debug for Belady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Belady")
            .field("n_obj", &self.store.len())
            .field("occupied_bytes", &self.store.occupied_bytes())
            .finish_non_exhaustive()
    }
}
