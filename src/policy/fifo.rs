//! First-In-First-Out eviction.
//!
//! New objects enter at the head, victims leave from the tail, and hits do
//! not touch the queue. FIFO is the base policy of the sharded cache and the
//! simplest main cache for HOTCache.
//!
//! ```text
//!   insert D:   head ─► [D] [C] [B] [A] ◄── tail
//!   evict:                          └──► A leaves
//! ```
//!
//! ## Example
//!
//! ```
//! use cachesim::policy::fifo::Fifo;
//! use cachesim::request::Request;
//! use cachesim::traits::EvictionPolicy;
//!
//! let mut cache = Fifo::new(2, 0);
//! assert!(!cache.get(&Request::unit(1)));
//! assert!(!cache.get(&Request::unit(2)));
//! assert!(cache.get(&Request::unit(1)));
//! cache.get(&Request::unit(3)); // evicts 1, the oldest
//! assert!(!cache.contains(1));
//! ```

use std::fmt;

use crate::policy::core::{QueueCore, delegate_to_core};
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

pub struct Fifo {
    core: QueueCore<()>,
}

impl Fifo {
    pub const NAME: &'static str = "FIFO";

    pub fn new(capacity: u64, obj_md_size: u64) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
        }
    }
}

impl EvictionPolicy for Fifo {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[inline]
    fn find(&mut self, req: &Request, _update: bool) -> Option<ObjectRef> {
        self.core.lookup(req.obj_id).map(|id| self.core.obj_ref(id))
    }

    fn insert(&mut self, req: &Request) -> Option<ObjectRef> {
        let id = self.core.push_front(req, ());
        Some(self.core.obj_ref(id))
    }

    fn to_evict(&mut self, _req: &Request) -> Option<ObjectRef> {
        self.core.tail().map(|id| self.core.obj_ref(id))
    }

    fn evict(&mut self, _req: &Request) {
        self.core.evict_tail();
    }

    fn remove(&mut self, obj_id: ObjId) -> bool {
        self.core.remove(obj_id)
    }

    fn current_params(&self) -> String {
        String::new()
    }
}

impl fmt::Debug for Fifo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fifo")
            .field("capacity", &self.core.state.capacity)
            .field("n_obj", &self.core.n_obj())
            .finish_non_exhaustive()
    }
}
