//! Per-promise state and the arena that owns it.

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::frame::{first_frame, Frame};
use crate::observation::{AsyncId, Init};

/// Everything known about one tracked promise.
#[derive(Debug, Serialize)]
pub struct DeferredValueState {
    pub id: AsyncId,
    /// The allocation that created this promise.
    pub allocation: Init,
    /// Settled inside its own execution context.
    pub executed: bool,
    /// First allocation at `<url>:1:1` for its module.
    pub is_module_initialization: bool,
    /// Synthesized by a runtime combinator; never reported.
    pub internal: bool,
    /// Promises allocated while running as a continuation of this one, in
    /// first-seen order.
    pub unwrapped_by: Vec<AsyncId>,
    #[serde(skip)]
    dependent_set: HashSet<AsyncId>,
    /// Promises that settled within this promise's execution.
    pub continued_by: Vec<AsyncId>,
    #[serde(serialize_with = "serialize_once")]
    is_suspension: OnceCell<bool>,
}

fn serialize_once<S: serde::Serializer>(cell: &OnceCell<bool>, s: S) -> Result<S::Ok, S::Error> {
    cell.get().serialize(s)
}

impl DeferredValueState {
    pub fn new(allocation: Init) -> Self {
        Self {
            id: allocation.id,
            allocation,
            executed: false,
            is_module_initialization: false,
            internal: false,
            unwrapped_by: Vec::new(),
            dependent_set: HashSet::new(),
            continued_by: Vec::new(),
            is_suspension: OnceCell::new(),
        }
    }

    /// Allocation stack text.
    pub fn stack(&self) -> &str {
        &self.allocation.stack
    }

    pub fn first_frame(&self) -> Option<Frame<'_>> {
        first_frame(self.stack())
    }

    /// Number of recorded dependents.
    pub fn dependents(&self) -> usize {
        self.unwrapped_by.len()
    }

    /// Record a dependent; the set only grows.
    pub fn add_dependent(&mut self, id: AsyncId) {
        if self.dependent_set.insert(id) {
            self.unwrapped_by.push(id);
        }
    }

    /// `None` until the classifier has looked at this allocation site.
    pub fn is_suspension(&self) -> Option<bool> {
        self.is_suspension.get().copied()
    }

    /// Settled by an `await` rather than a registered continuation.
    pub fn is_awaited(&self) -> bool {
        self.executed && self.is_suspension() == Some(true)
    }

    pub(crate) fn resolve_suspension(&self, value: bool) {
        if self.is_suspension.set(value).is_err() {
            panic!("suspension of promise {} resolved twice", self.id);
        }
    }
}

/// Id-indexed arena owning every tracked state.
///
/// States are kept in insertion order. Edges between states are plain ids
/// resolved through [`StateArena::get`]. Once frozen, any attempt to mutate
/// the arena panics.
#[derive(Debug, Default)]
pub struct StateArena {
    slots: Vec<DeferredValueState>,
    index: HashMap<AsyncId, usize>,
    frozen: bool,
}

impl StateArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: AsyncId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn get(&self, id: AsyncId) -> Option<&DeferredValueState> {
        self.index.get(&id).map(|&slot| &self.slots[slot])
    }

    pub fn get_mut(&mut self, id: AsyncId) -> Option<&mut DeferredValueState> {
        assert!(!self.frozen, "state arena is frozen, cannot mutate promise {}", id);
        self.index.get(&id).map(|&slot| &mut self.slots[slot])
    }

    /// Insert a new state. Returns false if the id is already tracked.
    pub fn insert(&mut self, state: DeferredValueState) -> bool {
        assert!(
            !self.frozen,
            "state arena is frozen, cannot insert promise {}",
            state.id
        );
        if self.index.contains_key(&state.id) {
            return false;
        }
        self.index.insert(state.id, self.slots.len());
        self.slots.push(state);
        true
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// States in insertion order.
    pub fn as_slice(&self) -> &[DeferredValueState] {
        &self.slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::PROMISE_TYPE;

    fn promise(id: AsyncId, stack: &str) -> DeferredValueState {
        DeferredValueState::new(Init {
            type_tag: PROMISE_TYPE.to_string(),
            execution_id: 1,
            trigger_id: 1,
            id,
            stack: stack.to_string(),
        })
    }

    #[test]
    fn test_insert_keeps_first_state() {
        let mut arena = StateArena::new();
        assert!(arena.insert(promise(2, "file:///a.js:1:1")));
        assert!(!arena.insert(promise(2, "file:///b.js:1:1")));
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(2).unwrap().stack(), "file:///a.js:1:1");
    }

    #[test]
    fn test_insertion_order() {
        let mut arena = StateArena::new();
        for id in [9, 3, 5] {
            arena.insert(promise(id, ""));
        }
        let ids: Vec<_> = arena.as_slice().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![9, 3, 5]);
    }

    #[test]
    fn test_dependents_are_a_set() {
        let mut state = promise(1, "");
        state.add_dependent(4);
        state.add_dependent(4);
        state.add_dependent(6);
        assert_eq!(state.unwrapped_by, vec![4, 6]);
        assert_eq!(state.dependents(), 2);
    }

    #[test]
    fn test_many_dependents_keep_first_seen_order() {
        let mut state = promise(1, "");
        for id in (0..5_000).rev().chain(0..5_000) {
            state.add_dependent(id);
        }
        assert_eq!(state.dependents(), 5_000);
        assert_eq!(state.unwrapped_by.first(), Some(&4_999));
        assert_eq!(state.unwrapped_by.last(), Some(&0));
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn test_insert_after_freeze_panics() {
        let mut arena = StateArena::new();
        arena.freeze();
        arena.insert(promise(1, ""));
    }

    #[test]
    #[should_panic(expected = "frozen")]
    fn test_get_mut_after_freeze_panics() {
        let mut arena = StateArena::new();
        arena.insert(promise(1, ""));
        arena.freeze();
        let _ = arena.get_mut(1);
    }

    #[test]
    #[should_panic(expected = "resolved twice")]
    fn test_suspension_is_write_once() {
        let state = promise(1, "");
        state.resolve_suspension(true);
        state.resolve_suspension(false);
    }

    #[test]
    fn test_awaited_requires_execution() {
        let mut state = promise(1, "");
        state.resolve_suspension(true);
        assert!(!state.is_awaited());
        state.executed = true;
        assert!(state.is_awaited());
    }
}
