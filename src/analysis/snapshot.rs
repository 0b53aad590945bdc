//! Frozen, classified view of a finished session.

use std::collections::HashSet;
use std::iter::FusedIterator;
use std::slice;

use super::state::{DeferredValueState, StateArena};
use crate::observation::AsyncId;

/// Read-only result of a finished analysis.
#[derive(Debug)]
pub struct Snapshot {
    states: StateArena,
    last_executing_id: Option<AsyncId>,
    ticks: u64,
}

impl Snapshot {
    pub(crate) fn new(states: StateArena, last_executing_id: Option<AsyncId>, ticks: u64) -> Self {
        assert!(states.is_frozen(), "snapshot requires a frozen arena");
        Self {
            states,
            last_executing_id,
            ticks,
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, id: AsyncId) -> Option<&DeferredValueState> {
        self.states.get(id)
    }

    /// The context still running when the stream ended.
    pub fn last_executing_id(&self) -> Option<AsyncId> {
        self.last_executing_id
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Serialized final state of each requested id that was tracked, in
    /// allocation order.
    pub fn raw_states(&self, ids: &HashSet<AsyncId>) -> Vec<String> {
        if ids.is_empty() {
            return Vec::new();
        }
        self.states()
            .filter(|state| ids.contains(&state.id))
            .filter_map(|state| serde_json::to_string(state).ok())
            .collect()
    }

    /// Every tracked state, in allocation order.
    pub fn states(&self) -> Finalized<'_> {
        Finalized {
            inner: self.states.as_slice().iter(),
        }
    }
}

/// Single pass over a snapshot's states.
#[derive(Debug)]
pub struct Finalized<'a> {
    inner: slice::Iter<'a, DeferredValueState>,
}

impl<'a> Iterator for Finalized<'a> {
    type Item = &'a DeferredValueState;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Finalized<'_> {}

impl FusedIterator for Finalized<'_> {}
