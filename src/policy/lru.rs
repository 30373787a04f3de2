//! Least-Recently-Used eviction.
//!
//! Every hit moves the object to the head; the tail is the least recently
//! used object and the next victim. The move on each hit is the reordering
//! cost that the delayed and probabilistic variants in this crate try to
//! avoid.
//!
//! ```text
//!   get(B):   head ─► [C] [B] [A] ◄── tail
//!        →    head ─► [B] [C] [A] ◄── tail      (n_promotion += 1)
//! ```
//!
//! ## Example
//!
//! ```
//! use cachesim::policy::lru::Lru;
//! use cachesim::request::Request;
//! use cachesim::traits::EvictionPolicy;
//!
//! let mut cache = Lru::new(3, 0);
//! let hits: Vec<bool> = [1, 2, 3, 1, 4, 5]
//!     .iter()
//!     .map(|&id| cache.get(&Request::unit(id)))
//!     .collect();
//! assert_eq!(hits, [false, false, false, true, false, false]);
//! assert!(cache.contains(1) && cache.contains(4) && cache.contains(5));
//! ```

use std::fmt;

use crate::policy::core::{QueueCore, delegate_to_core};
use crate::request::{ObjId, ObjectRef, Request};
use crate::traits::EvictionPolicy;

pub struct Lru {
    core: QueueCore<()>,
}

impl Lru {
    pub const NAME: &'static str = "LRU";

    pub fn new(capacity: u64, obj_md_size: u64) -> Self {
        Self {
            core: QueueCore::new(capacity, obj_md_size),
        }
    }

    /// Resident ids from most to least recently used.
    pub fn recency_order(&self) -> Vec<ObjId> {
        self.core
            .queue
            .iter(&self.core.store)
            .map(|id| self.core.store[id].obj_id())
            .collect()
    }
}

impl EvictionPolicy for Lru {
    delegate_to_core!();

    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn find(&mut self, req: &Request, update: bool) -> Option<ObjectRef> {
        let id = self.core.lookup(req.obj_id)?;
        if update {
            self.core.requeue(id);
        }
        Some(self.core.obj_ref(id))
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

impl fmt::Debug for Lru {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lru")
            .field("capacity", &self.core.state.capacity)
            .field("n_obj", &self.core.n_obj())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod basic_operations {
        use super::*;

        #[test]
        fn hit_moves_to_head() {
            let mut cache = Lru::new(3, 0);
            for id in [1, 2, 3] {
                cache.get(&Request::unit(id));
            }
            assert!(cache.get(&Request::unit(1)));
            assert_eq!(cache.recency_order(), vec![1, 3, 2]);
            assert_eq!(cache.state().n_promotion, 1);
        }

        #[test]
        fn find_without_update_keeps_order() {
            let mut cache = Lru::new(3, 0);
            for id in [1, 2] {
                cache.get(&Request::unit(id));
            }
            assert!(cache.find(&Request::unit(1), false).is_some());
            assert_eq!(cache.recency_order(), vec![2, 1]);
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn classic_scenario() {
            let mut cache = Lru::new(3, 0);
            let hits: Vec<bool> = [1, 2, 3, 1]
                .iter()
                .map(|&id| cache.get(&Request::unit(id)))
                .collect();
            assert_eq!(hits, [false, false, false, true]);
            // after the 4th request, 1 is the most recent of the first three
            assert_eq!(cache.recency_order()[0], 1);

            assert!(!cache.get(&Request::unit(4)));
            assert!(!cache.get(&Request::unit(5)));
            let mut resident = cache.recency_order();
            resident.sort_unstable();
            assert_eq!(resident, vec![1, 4, 5]);
            cache.check_invariants().unwrap();
        }

        #[test]
        fn to_evict_matches_evict() {
            let mut cache = Lru::new(3, 0);
            for id in [1, 2, 3, 1] {
                cache.get(&Request::unit(id));
            }
            let victim = cache.to_evict(&Request::unit(9)).unwrap();
            assert_eq!(victim.obj_id, 2);
            cache.evict(&Request::unit(9));
            assert!(!cache.contains(2));
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn capacity_one() {
            let mut cache = Lru::new(1, 0);
            assert!(!cache.get(&Request::unit(1)));
            assert!(cache.get(&Request::unit(1)));
            assert!(!cache.get(&Request::unit(2)));
            assert!(!cache.contains(1));
            cache.check_invariants().unwrap();
        }
    }
}
