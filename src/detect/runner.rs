//! Detection runner that turns a finished snapshot into grouped findings.

use std::collections::HashMap;
use tracing::debug;

use crate::analysis::{DeferredValueState, Snapshot};
use crate::config::Config;
use crate::observation::AsyncId;

use super::{DependentGroup, Diagnostics, OverusedGroup, SuppressionFilter, UnusedGroup};

/// Classifies and groups the states of a snapshot.
pub struct Runner {
    filter: SuppressionFilter,
}

impl Runner {
    pub fn new(filter: SuppressionFilter) -> Self {
        Self { filter }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(SuppressionFilter::from_config(config)?))
    }

    /// Report the last executing context as well.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.filter = self.filter.verbose(verbose);
        self
    }

    /// Run detection over every state of the snapshot.
    pub fn run(&self, snapshot: &Snapshot) -> Diagnostics {
        let mut result = Diagnostics::new();
        result.ticks = snapshot.ticks();
        result.tracked = snapshot.len();

        let mut unused: Grouped<UnusedGroup> = Grouped::default();
        let mut overused: Grouped<OverusedGroup> = Grouped::default();

        for state in snapshot.states() {
            if let Some(reason) = self.filter.check(state, snapshot.last_executing_id()) {
                result.record_suppressed(reason);
                continue;
            }

            match state.dependents() {
                0 => {
                    if let Some(reason) = self.filter.check_unused(state) {
                        result.record_suppressed(reason);
                        continue;
                    }
                    debug!(id = state.id, "unused allocation");
                    unused
                        .entry(state.stack(), || UnusedGroup {
                            stack: state.stack().to_string(),
                            ids: Vec::new(),
                        })
                        .ids
                        .push(state.id);
                }
                1 => {}
                n => {
                    debug!(id = state.id, dependents = n, "overused allocation");
                    let group = overused.entry(state.stack(), || OverusedGroup {
                        stack: state.stack().to_string(),
                        ids: Vec::new(),
                        unwrapped_at: Vec::new(),
                        continued_at: Vec::new(),
                    });
                    group.ids.push(state.id);
                    add_by_site(&mut group.unwrapped_at, &state.unwrapped_by, snapshot);
                    add_by_site(&mut group.continued_at, &state.continued_by, snapshot);
                }
            }
        }

        result.unused = unused.into_vec();
        result.overused = overused.into_vec();
        result
    }
}

/// Sub-group dependents by their own allocation stack, keeping first-seen
/// order of sites.
fn add_by_site(groups: &mut Vec<DependentGroup>, ids: &[AsyncId], snapshot: &Snapshot) {
    for &id in ids {
        let stack = snapshot
            .get(id)
            .map(DeferredValueState::stack)
            .unwrap_or_default();
        match groups.iter_mut().find(|g| g.stack == stack) {
            Some(group) => group.ids.push(id),
            None => groups.push(DependentGroup {
                stack: stack.to_string(),
                ids: vec![id],
            }),
        }
    }
}

/// Groups keyed by stack text, in first-seen order.
struct Grouped<T> {
    index: HashMap<String, usize>,
    groups: Vec<T>,
}

impl<T> Default for Grouped<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }
}

impl<T> Grouped<T> {
    fn entry(&mut self, key: &str, create: impl FnOnce() -> T) -> &mut T {
        let slot = match self.index.get(key) {
            Some(&slot) => slot,
            None => {
                self.groups.push(create());
                self.index.insert(key.to_string(), self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        &mut self.groups[slot]
    }

    fn into_vec(self) -> Vec<T> {
        self.groups
    }
}
