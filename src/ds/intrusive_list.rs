//! Intrusive doubly linked list over externally stored nodes.
//!
//! The list owns nothing but `head`, `tail` and a length. Each node keeps its
//! own [`Links`] inside whatever store owns it, and the list reaches them
//! through the [`LinkStore`] trait. One store can therefore back several lists
//! (probation and main queue, frozen and dynamic segment) while every entry is
//! linked into at most one of them.
//!
//! ## Architecture
//!
//! ```text
//!   store (impl LinkStore)
//!   ┌────────┬───────────────────────────────────────────────┐
//!   │ SlotId │ Links { prev, next, linked }                  │
//!   ├────────┼───────────────────────────────────────────────┤
//!   │ id_1   │ { prev: None,       next: Some(id_2), true }  │
//!   │ id_2   │ { prev: Some(id_1), next: Some(id_3), true }  │
//!   │ id_3   │ { prev: Some(id_2), next: None,       true }  │
//!   └────────┴───────────────────────────────────────────────┘
//!
//!   head ─► [id_1] ◄──► [id_2] ◄──► [id_3] ◄── tail
//!           favored                    next victim
//! ```
//!
//! ## Operations
//! - `push_front(id)` / `push_back(id)`: attach an unlinked node
//! - `unlink(id)`: detach, the node stays in the store
//! - `move_to_front(id)` / `move_to_back(id)`: detach + attach
//! - `split_front(n)`: detach the first `n` nodes as a new list
//! - `splice_front(other)`: put all of `other` in front of this list
//!
//! ## Performance
//! - everything except `iter`, `split_front` and `check_invariants`: O(1)
//! - `split_front(n)`: O(n)
//!
//! `check_invariants()` walks the list in both directions.

use std::collections::HashSet;

use crate::ds::slot_arena::{SlotArena, SlotId};
use crate::error::InvariantError;

/// Per-node link fields, embedded in the node owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Links {
    pub(crate) prev: Option<SlotId>,
    pub(crate) next: Option<SlotId>,
    pub(crate) linked: bool,
}

impl Links {
    /// Returns `true` while the node is attached to some list.
    #[inline]
    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

/// Access to the [`Links`] of nodes kept in an external store.
pub trait LinkStore {
    fn links(&self, id: SlotId) -> Option<&Links>;
    fn links_mut(&mut self, id: SlotId) -> Option<&mut Links>;
}

impl LinkStore for SlotArena<Links> {
    #[inline]
    fn links(&self, id: SlotId) -> Option<&Links> {
        self.get(id)
    }

    #[inline]
    fn links_mut(&mut self, id: SlotId) -> Option<&mut Links> {
        self.get_mut(id)
    }
}

/// Head/tail view of a doubly linked list whose nodes live in a [`LinkStore`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IntrusiveList {
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
}

impl IntrusiveList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Most favored node.
    #[inline]
    pub fn head(&self) -> Option<SlotId> {
        self.head
    }

    /// Least favored node, the usual eviction candidate.
    #[inline]
    pub fn tail(&self) -> Option<SlotId> {
        self.tail
    }

    /// Node after `id` (towards the tail).
    #[inline]
    pub fn next<S: LinkStore + ?Sized>(&self, store: &S, id: SlotId) -> Option<SlotId> {
        store.links(id).and_then(|l| l.next)
    }

    /// Node before `id` (towards the head).
    #[inline]
    pub fn prev<S: LinkStore + ?Sized>(&self, store: &S, id: SlotId) -> Option<SlotId> {
        store.links(id).and_then(|l| l.prev)
    }

    /// Attaches an unlinked node at the head; returns `false` if the node is
    /// missing or already linked.
    pub fn push_front<S: LinkStore + ?Sized>(&mut self, store: &mut S, id: SlotId) -> bool {
        match store.links(id) {
            Some(links) if !links.linked => {}
            _ => return false,
        }
        self.attach_front(store, id).is_some()
    }

    /// Attaches an unlinked node at the tail.
    pub fn push_back<S: LinkStore + ?Sized>(&mut self, store: &mut S, id: SlotId) -> bool {
        match store.links(id) {
            Some(links) if !links.linked => {}
            _ => return false,
        }
        self.attach_back(store, id).is_some()
    }

    /// Detaches `id` from this list. The caller guarantees `id` belongs to
    /// this list; returns `false` if it is not linked at all.
    pub fn unlink<S: LinkStore + ?Sized>(&mut self, store: &mut S, id: SlotId) -> bool {
        match store.links(id) {
            Some(links) if links.linked => {}
            _ => return false,
        }
        self.detach(store, id).is_some()
    }

    /// Detaches and returns the tail node.
    pub fn pop_back<S: LinkStore + ?Sized>(&mut self, store: &mut S) -> Option<SlotId> {
        let id = self.tail?;
        self.detach(store, id)?;
        Some(id)
    }

    /// Detaches and returns the head node.
    pub fn pop_front<S: LinkStore + ?Sized>(&mut self, store: &mut S) -> Option<SlotId> {
        let id = self.head?;
        self.detach(store, id)?;
        Some(id)
    }

    /// Moves a linked node to the head.
    pub fn move_to_front<S: LinkStore + ?Sized>(&mut self, store: &mut S, id: SlotId) -> bool {
        if !store.links(id).is_some_and(|l| l.linked) {
            return false;
        }
        if self.head == Some(id) {
            return true;
        }
        self.detach(store, id);
        self.attach_front(store, id).is_some()
    }

    /// Moves a linked node to the tail.
    pub fn move_to_back<S: LinkStore + ?Sized>(&mut self, store: &mut S, id: SlotId) -> bool {
        if !store.links(id).is_some_and(|l| l.linked) {
            return false;
        }
        if self.tail == Some(id) {
            return true;
        }
        self.detach(store, id);
        self.attach_back(store, id).is_some()
    }

    /// Cuts the first `n` nodes off into a new list, keeping their order.
    /// Takes the whole list when `n >= len`.
    pub fn split_front<S: LinkStore + ?Sized>(&mut self, store: &mut S, n: usize) -> IntrusiveList {
        if n == 0 || self.is_empty() {
            return IntrusiveList::new();
        }
        if n >= self.len {
            return std::mem::take(self);
        }

        let mut last = self.head;
        for _ in 1..n {
            last = last.and_then(|id| self.next(store, id));
        }
        let Some(last) = last else {
            return IntrusiveList::new();
        };
        let Some(rest) = self.next(store, last) else {
            return std::mem::take(self);
        };

        if let Some(links) = store.links_mut(last) {
            links.next = None;
        }
        if let Some(links) = store.links_mut(rest) {
            links.prev = None;
        }

        let front = IntrusiveList {
            head: self.head,
            tail: Some(last),
            len: n,
        };
        self.head = Some(rest);
        self.len -= n;
        front
    }

    /// Moves every node of `other` in front of this list's head.
    pub fn splice_front<S: LinkStore + ?Sized>(&mut self, store: &mut S, other: IntrusiveList) {
        let (Some(other_head), Some(other_tail)) = (other.head, other.tail) else {
            return;
        };
        match self.head {
            Some(head) => {
                if let Some(links) = store.links_mut(other_tail) {
                    links.next = Some(head);
                }
                if let Some(links) = store.links_mut(head) {
                    links.prev = Some(other_tail);
                }
            }
            None => self.tail = Some(other_tail),
        }
        self.head = Some(other_head);
        self.len += other.len;
    }

    /// Forgets all nodes without touching their links; use only after the
    /// backing store was cleared.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Iterates node ids from head to tail.
    pub fn iter<'a, S: LinkStore + ?Sized>(&self, store: &'a S) -> Iter<'a, S> {
        Iter {
            store,
            current: self.head,
            remaining: self.len,
        }
    }

    fn detach<S: LinkStore + ?Sized>(&mut self, store: &mut S, id: SlotId) -> Option<()> {
        let (prev, next) = {
            let links = store.links(id)?;
            (links.prev, links.next)
        };

        match prev {
            Some(prev_id) => {
                if let Some(links) = store.links_mut(prev_id) {
                    links.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(next_id) => {
                if let Some(links) = store.links_mut(next_id) {
                    links.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        let links = store.links_mut(id)?;
        *links = Links::default();
        self.len -= 1;
        Some(())
    }

    fn attach_front<S: LinkStore + ?Sized>(&mut self, store: &mut S, id: SlotId) -> Option<()> {
        let old_head = self.head;
        *store.links_mut(id)? = Links {
            prev: None,
            next: old_head,
            linked: true,
        };
        match old_head {
            Some(old) => {
                if let Some(links) = store.links_mut(old) {
                    links.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
        Some(())
    }

    fn attach_back<S: LinkStore + ?Sized>(&mut self, store: &mut S, id: SlotId) -> Option<()> {
        let old_tail = self.tail;
        *store.links_mut(id)? = Links {
            prev: old_tail,
            next: None,
            linked: true,
        };
        match old_tail {
            Some(old) => {
                if let Some(links) = store.links_mut(old) {
                    links.next = Some(id);
                }
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        Some(())
    }

    /// Verifies `head.prev == None`, `tail.next == None`, that the forward
    /// and backward walks visit the same nodes, and that the count matches.
    pub fn check_invariants<S: LinkStore + ?Sized>(&self, store: &S) -> Result<(), InvariantError> {
        if self.head.is_none() || self.tail.is_none() {
            if self.head.is_some() || self.tail.is_some() || self.len != 0 {
                return Err(InvariantError::new(format!(
                    "empty list has head {:?}, tail {:?}, len {}",
                    self.head, self.tail, self.len
                )));
            }
            return Ok(());
        }

        let mut forward = HashSet::with_capacity(self.len);
        let mut current = self.head;
        let mut prev = None;
        while let Some(id) = current {
            let links = store
                .links(id)
                .ok_or_else(|| InvariantError::new(format!("node {id:?} missing from store")))?;
            if !links.linked {
                return Err(InvariantError::new(format!("node {id:?} reachable but unlinked")));
            }
            if links.prev != prev {
                return Err(InvariantError::new(format!(
                    "node {id:?} prev is {:?}, expected {prev:?}",
                    links.prev
                )));
            }
            if !forward.insert(id) || forward.len() > self.len {
                return Err(InvariantError::new("cycle or overlong forward walk"));
            }
            if links.next.is_none() && self.tail != Some(id) {
                return Err(InvariantError::new(format!("walk ended at {id:?}, not at tail")));
            }
            prev = Some(id);
            current = links.next;
        }
        if forward.len() != self.len {
            return Err(InvariantError::new(format!(
                "forward walk saw {} nodes, len is {}",
                forward.len(),
                self.len
            )));
        }

        let mut backward = 0usize;
        let mut current = self.tail;
        while let Some(id) = current {
            if !forward.contains(&id) {
                return Err(InvariantError::new(format!(
                    "node {id:?} reachable backward only"
                )));
            }
            backward += 1;
            if backward > self.len {
                return Err(InvariantError::new("cycle in backward walk"));
            }
            current = store.links(id).and_then(|l| l.prev);
        }
        if backward != self.len {
            return Err(InvariantError::new(format!(
                "backward walk saw {backward} nodes, len is {}",
                self.len
            )));
        }
        Ok(())
    }

    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants<S: LinkStore + ?Sized>(&self, store: &S) {
        if let Err(err) = self.check_invariants(store) {
            panic!("intrusive list invariant violated: {err}");
        }
    }
}

/// Iterator over node ids from head to tail.
pub struct Iter<'a, S: ?Sized> {
    store: &'a S,
    current: Option<SlotId>,
    remaining: usize,
}

impl<S: LinkStore + ?Sized> Iterator for Iter<'_, S> {
    type Item = SlotId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.current?;
        self.current = self.store.links(id).and_then(|l| l.next);
        self.remaining -= 1;
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(n: usize) -> (SlotArena<Links>, Vec<SlotId>) {
        let mut store = SlotArena::new();
        let ids = (0..n).map(|_| store.insert(Links::default())).collect();
        (store, ids)
    }

    fn order(list: &IntrusiveList, store: &SlotArena<Links>) -> Vec<usize> {
        list.iter(store).map(SlotId::index).collect()
    }

    mod basic_operations {
        use super::*;

        #[test]
        fn push_front_orders_newest_first() {
            let (mut store, ids) = store_with(3);
            let mut list = IntrusiveList::new();
            for &id in &ids {
                assert!(list.push_front(&mut store, id));
            }
            assert_eq!(order(&list, &store), vec![2, 1, 0]);
            assert_eq!(list.head(), Some(ids[2]));
            assert_eq!(list.tail(), Some(ids[0]));
            list.debug_validate_invariants(&store);
        }

        #[test]
        fn push_back_and_pop_back() {
            let (mut store, ids) = store_with(3);
            let mut list = IntrusiveList::new();
            for &id in &ids {
                list.push_back(&mut store, id);
            }
            assert_eq!(list.pop_back(&mut store), Some(ids[2]));
            assert_eq!(list.pop_front(&mut store), Some(ids[0]));
            assert_eq!(list.len(), 1);
            assert!(!store.get(ids[2]).unwrap().is_linked());
            list.debug_validate_invariants(&store);
        }

        #[test]
        fn move_to_front_and_back() {
            let (mut store, ids) = store_with(4);
            let mut list = IntrusiveList::new();
            for &id in &ids {
                list.push_back(&mut store, id);
            }
            assert!(list.move_to_front(&mut store, ids[2]));
            assert_eq!(order(&list, &store), vec![2, 0, 1, 3]);
            assert!(list.move_to_back(&mut store, ids[0]));
            assert_eq!(order(&list, &store), vec![2, 1, 3, 0]);
            list.debug_validate_invariants(&store);
        }

        #[test]
        fn unlink_middle_node() {
            let (mut store, ids) = store_with(3);
            let mut list = IntrusiveList::new();
            for &id in &ids {
                list.push_back(&mut store, id);
            }
            assert!(list.unlink(&mut store, ids[1]));
            assert_eq!(order(&list, &store), vec![0, 2]);
            assert!(!list.unlink(&mut store, ids[1]));
            list.debug_validate_invariants(&store);
        }
    }

    mod splicing {
        use super::*;

        #[test]
        fn split_front_then_splice_back_restores_order() {
            let (mut store, ids) = store_with(5);
            let mut list = IntrusiveList::new();
            for &id in &ids {
                list.push_back(&mut store, id);
            }
            let front = list.split_front(&mut store, 2);
            assert_eq!(order(&front, &store), vec![0, 1]);
            assert_eq!(order(&list, &store), vec![2, 3, 4]);
            front.debug_validate_invariants(&store);
            list.debug_validate_invariants(&store);

            list.splice_front(&mut store, front);
            assert_eq!(order(&list, &store), vec![0, 1, 2, 3, 4]);
            list.debug_validate_invariants(&store);
        }

        #[test]
        fn split_front_larger_than_len_takes_all() {
            let (mut store, ids) = store_with(2);
            let mut list = IntrusiveList::new();
            for &id in &ids {
                list.push_back(&mut store, id);
            }
            let front = list.split_front(&mut store, 10);
            assert_eq!(front.len(), 2);
            assert!(list.is_empty());
            front.debug_validate_invariants(&store);
        }

        #[test]
        fn splice_into_empty_list() {
            let (mut store, ids) = store_with(2);
            let mut other = IntrusiveList::new();
            for &id in &ids {
                other.push_back(&mut store, id);
            }
            let mut list = IntrusiveList::new();
            list.splice_front(&mut store, other);
            assert_eq!(list.tail(), Some(ids[1]));
            list.debug_validate_invariants(&store);
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn double_push_is_rejected() {
            let (mut store, ids) = store_with(1);
            let mut list = IntrusiveList::new();
            assert!(list.push_front(&mut store, ids[0]));
            assert!(!list.push_front(&mut store, ids[0]));
            assert!(!list.push_back(&mut store, ids[0]));
            assert_eq!(list.len(), 1);
        }

        #[test]
        fn operations_on_empty_list() {
            let (mut store, _) = store_with(0);
            let mut list = IntrusiveList::new();
            assert_eq!(list.pop_back(&mut store), None);
            assert!(list.split_front(&mut store, 3).is_empty());
            assert!(list.check_invariants(&store).is_ok());
        }

        #[test]
        fn corrupted_links_are_reported() {
            let (mut store, ids) = store_with(2);
            let mut list = IntrusiveList::new();
            list.push_back(&mut store, ids[0]);
            list.push_back(&mut store, ids[1]);
            store.get_mut(ids[1]).unwrap().prev = None;
            assert!(list.check_invariants(&store).is_err());
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::VecDeque;

        #[derive(Debug, Clone)]
        enum Op {
            PushFront(usize),
            PushBack(usize),
            MoveToFront(usize),
            Unlink(usize),
            PopBack,
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0usize..16).prop_map(Op::PushFront),
                (0usize..16).prop_map(Op::PushBack),
                (0usize..16).prop_map(Op::MoveToFront),
                (0usize..16).prop_map(Op::Unlink),
                Just(Op::PopBack),
            ]
        }

        proptest! {
            #[cfg_attr(miri, ignore)]
            #[test]
            fn prop_matches_deque_model(ops in prop::collection::vec(op_strategy(), 0..200)) {
                let (mut store, ids) = store_with(16);
                let mut list = IntrusiveList::new();
                let mut model: VecDeque<usize> = VecDeque::new();

                for op in ops {
                    match op {
                        Op::PushFront(i) => {
                            let added = list.push_front(&mut store, ids[i]);
                            prop_assert_eq!(added, !model.contains(&i));
                            if added {
                                model.push_front(i);
                            }
                        }
                        Op::PushBack(i) => {
                            if list.push_back(&mut store, ids[i]) {
                                model.push_back(i);
                            }
                        }
                        Op::MoveToFront(i) => {
                            if list.move_to_front(&mut store, ids[i]) {
                                model.retain(|&x| x != i);
                                model.push_front(i);
                            }
                        }
                        Op::Unlink(i) => {
                            let removed = list.unlink(&mut store, ids[i]);
                            prop_assert_eq!(removed, model.contains(&i));
                            model.retain(|&x| x != i);
                        }
                        Op::PopBack => {
                            let popped = list.pop_back(&mut store).map(SlotId::index);
                            prop_assert_eq!(popped, model.pop_back());
                        }
                    }
                    prop_assert!(list.check_invariants(&store).is_ok());
                    prop_assert_eq!(order(&list, &store), model.iter().copied().collect::<Vec<_>>());
                }
            }
        }
    }
}
