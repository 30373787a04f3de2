//! Resident-object store shared by every policy.
//!
//! Owns the [`CacheObject`]s of one cache instance: an arena of entries, an
//! `obj_id → SlotId` index and the byte accounting. Each entry embeds the
//! [`Links`] used by the policy's queues and a policy-specific metadata value
//! `M`, chosen once by the owning policy type.
//!
//! ## Architecture
//!
//! ```text
//!   index: FxHashMap<ObjId, SlotId>      arena: SlotArena<CacheObject<M>>
//!   ┌────────┬────────┐                 ┌────────┬──────────────────────────────┐
//!   │ obj 17 │ s_0    │────────────────►│ s_0    │ id 17, size, links, meta     │
//!   │ obj 42 │ s_1    │────────────────►│ s_1    │ id 42, size, links, meta     │
//!   └────────┴────────┘                 └────────┴──────────────────────────────┘
//!
//!   occupied_bytes = Σ (obj_size + obj_md_size)
//! ```
//!
//! The store never orders entries; queues built from
//! [`IntrusiveList`](crate::ds::IntrusiveList) do. An entry must be unlinked
//! from its queue before [`ObjectStore::remove`] is called.
//!
//! ## Operations
//!
//! | Operation   | Time | Notes                                   |
//! |-------------|------|-----------------------------------------|
//! | `lookup`    | O(1) | Hash lookup                             |
//! | `insert`    | O(1) | Arena slot + index + accounting         |
//! | `remove`    | O(1) | Frees the slot                          |
//! | `sample`    | O(1) | Uniform over resident entries           |

use std::ops::{Index, IndexMut};

use rand::Rng;
use rustc_hash::FxHashMap;

use crate::ds::intrusive_list::{LinkStore, Links};
use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::error::InvariantError;
use crate::request::{ObjId, ObjectRef, Request};

/// A resident object with its queue links and policy metadata.
#[derive(Debug, Clone)]
pub struct CacheObject<M> {
    obj_id: ObjId,
    obj_size: u64,
    links: Links,
    pub meta: M,
}

impl<M> CacheObject<M> {
    #[inline]
    pub fn obj_id(&self) -> ObjId {
        self.obj_id
    }

    #[inline]
    pub fn obj_size(&self) -> u64 {
        self.obj_size
    }

    #[inline]
    pub fn is_linked(&self) -> bool {
        self.links.is_linked()
    }

    #[inline]
    pub fn as_ref(&self) -> ObjectRef {
        ObjectRef {
            obj_id: self.obj_id,
            obj_size: self.obj_size,
        }
    }
}

/// Arena-backed store of resident objects with O(1) id lookup.
#[derive(Debug)]
pub struct ObjectStore<M> {
    arena: SlotArena<CacheObject<M>>,
    index: FxHashMap<ObjId, SlotId>,
    occupied_bytes: u64,
    obj_md_size: u64,
}

impl<M> ObjectStore<M> {
    /// Creates an empty store charging `obj_md_size` bytes per entry.
    pub fn new(obj_md_size: u64) -> Self {
        Self {
            arena: SlotArena::new(),
            index: FxHashMap::default(),
            occupied_bytes: 0,
            obj_md_size,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Bytes charged for all resident entries, metadata included.
    #[inline]
    pub fn occupied_bytes(&self) -> u64 {
        self.occupied_bytes
    }

    #[inline]
    pub fn obj_md_size(&self) -> u64 {
        self.obj_md_size
    }

    #[inline]
    pub fn lookup(&self, obj_id: ObjId) -> Option<SlotId> {
        self.index.get(&obj_id).copied()
    }

    #[inline]
    pub fn contains(&self, obj_id: ObjId) -> bool {
        self.index.contains_key(&obj_id)
    }

    #[inline]
    pub fn get(&self, id: SlotId) -> Option<&CacheObject<M>> {
        self.arena.get(id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut CacheObject<M>> {
        self.arena.get_mut(id)
    }

    /// Adds an unlinked entry for `req`. The id must not be resident.
    pub fn insert(&mut self, req: &Request, meta: M) -> SlotId {
        debug_assert!(
            !self.index.contains_key(&req.obj_id),
            "object {} inserted twice",
            req.obj_id
        );
        let id = self.arena.insert(CacheObject {
            obj_id: req.obj_id,
            obj_size: req.obj_size,
            links: Links::default(),
            meta,
        });
        self.index.insert(req.obj_id, id);
        self.occupied_bytes += req.obj_size + self.obj_md_size;
        id
    }

    /// Frees the entry at `id`. It must already be unlinked from its queue.
    pub fn remove(&mut self, id: SlotId) -> Option<CacheObject<M>> {
        let obj = self.arena.remove(id)?;
        debug_assert!(!obj.is_linked(), "object {} removed while queued", obj.obj_id);
        self.index.remove(&obj.obj_id);
        self.occupied_bytes -= obj.obj_size + self.obj_md_size;
        Some(obj)
    }

    /// Uniformly random resident entry.
    #[inline]
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<SlotId> {
        self.arena.sample(rng)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &CacheObject<M>)> {
        self.arena.iter()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.index.clear();
        self.occupied_bytes = 0;
    }

    /// Checks index/arena agreement and the byte total.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        if self.arena.len() != self.index.len() {
            return Err(InvariantError::new(format!(
                "arena holds {} entries, index {}",
                self.arena.len(),
                self.index.len()
            )));
        }
        let mut bytes = 0u64;
        for (id, obj) in self.arena.iter() {
            if self.index.get(&obj.obj_id) != Some(&id) {
                return Err(InvariantError::new(format!(
                    "object {} not indexed at {id:?}",
                    obj.obj_id
                )));
            }
            bytes += obj.obj_size + self.obj_md_size;
        }
        if bytes != self.occupied_bytes {
            return Err(InvariantError::new(format!(
                "occupied_bytes is {}, entries sum to {bytes}",
                self.occupied_bytes
            )));
        }
        Ok(())
    }
}

impl<M> Index<SlotId> for ObjectStore<M> {
    type Output = CacheObject<M>;

    #[inline]
    fn index(&self, id: SlotId) -> &Self::Output {
        match self.arena.get(id) {
            Some(obj) => obj,
            None => panic!("no resident object at {id:?}"),
        }
    }
}

impl<M> IndexMut<SlotId> for ObjectStore<M> {
    #[inline]
    fn index_mut(&mut self, id: SlotId) -> &mut Self::Output {
        match self.arena.get_mut(id) {
            Some(obj) => obj,
            None => panic!("no resident object at {id:?}"),
        }
    }
}

impl<M> LinkStore for ObjectStore<M> {
    #[inline]
    fn links(&self, id: SlotId) -> Option<&Links> {
        self.arena.get(id).map(|obj| &obj.links)
    }

    #[inline]
    fn links_mut(&mut self, id: SlotId) -> Option<&mut Links> {
        self.arena.get_mut(id).map(|obj| &mut obj.links)
    }
}
