//! Event-correlation state machine.
//!
//! Turns the ordered observation stream into a causal graph of promise
//! states. Rules are order dependent (the combinator window and the last
//! executing context in particular), so observations must be fed exactly in
//! the order the runtime emitted them.

use std::collections::HashSet;
use tracing::{debug, trace, warn};

use super::classify::{SourceProvider, SuspensionClassifier};
use super::frame::first_frame;
use super::snapshot::Snapshot;
use super::state::{DeferredValueState, StateArena};
use crate::observation::{AsyncId, Callback, Init, Observation, Resolve};

/// Correlates lifecycle observations into promise states.
#[derive(Debug, Default)]
pub struct Analyzer {
    states: StateArena,
    last_executing_id: Option<AsyncId>,
    /// Most recent allocation made outside a handler. Combinators such as
    /// `Promise.all` allocate their per-element listeners with the same stack
    /// right after it.
    current_batch: Option<AsyncId>,
    seen_module_urls: HashSet<String>,
    ticks: u64,
    raw_ids: HashSet<AsyncId>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dump the state of these ids to the debug log as they are allocated.
    pub fn with_raw_ids<I: IntoIterator<Item = AsyncId>>(mut self, ids: I) -> Self {
        self.raw_ids.extend(ids);
        self
    }

    pub fn states(&self) -> &StateArena {
        &self.states
    }

    pub fn last_executing_id(&self) -> Option<AsyncId> {
        self.last_executing_id
    }

    /// Number of callback turns observed.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Apply one observation.
    pub fn process(&mut self, observation: Observation) {
        trace!(kind = %observation.kind(), id = observation.id(), "observation");
        match observation {
            Observation::Init(init) => self.on_init(init),
            Observation::PromiseResolve(resolve) => self.on_resolve(&resolve),
            Observation::Before(cb) => self.on_before(&cb),
            Observation::After(_) | Observation::Destroy(_) => {}
        }
    }

    fn on_init(&mut self, init: Init) {
        if !init.is_promise() {
            return;
        }
        let id = init.id;
        if self.states.contains(id) {
            warn!(id, "promise id allocated twice, keeping the first allocation");
            return;
        }

        let module_url = first_frame(&init.stack)
            .filter(|frame| frame.is_module_start())
            .map(|frame| frame.url.to_string());
        let registering_handler = init.execution_id != init.trigger_id;

        let mut state = DeferredValueState::new(init);
        if let Some(url) = module_url {
            state.is_module_initialization = self.seen_module_urls.insert(url);
        }

        if registering_handler {
            if let Some(cause) = self.states.get_mut(state.allocation.trigger_id) {
                cause.add_dependent(id);
            }
        }

        let same_batch_stack = self
            .current_batch
            .and_then(|batch| self.states.get(batch))
            .is_some_and(|batch| batch.stack() == state.stack());
        if registering_handler && same_batch_stack {
            state.internal = true;
        } else if registering_handler {
            self.current_batch = None;
        } else {
            self.current_batch = Some(id);
        }

        debug!(
            id,
            execution_id = state.allocation.execution_id,
            trigger_id = state.allocation.trigger_id,
            internal = state.internal,
            module_init = state.is_module_initialization,
            "promise allocated"
        );

        self.states.insert(state);
    }

    fn on_resolve(&mut self, resolve: &Resolve) {
        if resolve.execution_id != resolve.id {
            return;
        }
        let Some(state) = self.states.get_mut(resolve.id) else {
            return;
        };
        state.executed = true;

        let queued_during = state.allocation.execution_id;
        if queued_during != resolve.id {
            if let Some(parent) = self.states.get_mut(queued_during) {
                parent.continued_by.push(resolve.id);
            }
        }
    }

    fn on_before(&mut self, cb: &Callback) {
        self.current_batch = None;
        self.ticks += 1;
        if self.states.contains(cb.id) {
            self.last_executing_id = Some(cb.id);
        }
    }

    /// Freeze the state map, classify executed allocation sites and hand
    /// back the read-only snapshot.
    ///
    /// Requested raw ids are dumped here, once their state is final.
    pub fn finish<P: SourceProvider>(mut self, classifier: &SuspensionClassifier<P>) -> Snapshot {
        self.states.freeze();
        classifier.classify_all(&self.states);
        let snapshot = Snapshot::new(self.states, self.last_executing_id, self.ticks);
        for dump in snapshot.raw_states(&self.raw_ids) {
            debug!(state = %dump, "raw promise state");
        }
        snapshot
    }
}
