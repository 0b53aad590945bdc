//! Filters deciding which promise states are never reported.

use globset::GlobSet;
use regex::RegexSet;
use serde::{Deserialize, Serialize};

use crate::analysis::DeferredValueState;
use crate::config::Config;
use crate::observation::AsyncId;

/// Why a promise was left out of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    /// Still running when the stream ended
    LastExecuting,
    /// No user frames captured
    EmptyStack,
    /// Only runtime frames captured
    RuntimeInternal,
    /// Allocation site matches an excluded path
    ExcludedPath,
    /// Listener synthesized by a runtime combinator
    InternalCombinator,
    /// Synthetic allocation for a module's top-level await
    ModuleInitialization,
    /// Settled by an `await`
    Awaited,
}

impl SuppressionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressionReason::LastExecuting => "last_executing",
            SuppressionReason::EmptyStack => "empty_stack",
            SuppressionReason::RuntimeInternal => "runtime_internal",
            SuppressionReason::ExcludedPath => "excluded_path",
            SuppressionReason::InternalCombinator => "internal_combinator",
            SuppressionReason::ModuleInitialization => "module_initialization",
            SuppressionReason::Awaited => "awaited",
        }
    }
}

impl std::fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Filters applied before and after dependent counting.
pub struct SuppressionFilter {
    internal_frames: RegexSet,
    excluded_paths: GlobSet,
    verbose: bool,
}

impl SuppressionFilter {
    pub fn new(internal_frames: RegexSet, excluded_paths: GlobSet) -> Self {
        Self {
            internal_frames,
            excluded_paths,
            verbose: false,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(config.internal_frames()?, config.excluded_path_set()?)
            .verbose(config.is_verbose()))
    }

    /// Report the last executing context as well.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Filters that apply to every state, in order.
    pub fn check(
        &self,
        state: &DeferredValueState,
        last_executing_id: Option<AsyncId>,
    ) -> Option<SuppressionReason> {
        if !self.verbose && last_executing_id == Some(state.id) {
            return Some(SuppressionReason::LastExecuting);
        }

        let stack = state.stack();
        if stack.trim().is_empty() {
            return Some(SuppressionReason::EmptyStack);
        }
        if self.is_runtime_internal(stack) {
            return Some(SuppressionReason::RuntimeInternal);
        }
        if self.is_excluded(state) {
            return Some(SuppressionReason::ExcludedPath);
        }
        if state.internal {
            return Some(SuppressionReason::InternalCombinator);
        }
        None
    }

    /// Filters for states nothing depends on.
    pub fn check_unused(&self, state: &DeferredValueState) -> Option<SuppressionReason> {
        if state.is_module_initialization {
            return Some(SuppressionReason::ModuleInitialization);
        }
        if state.is_awaited() {
            return Some(SuppressionReason::Awaited);
        }
        None
    }

    /// Every non-blank line is a runtime frame.
    fn is_runtime_internal(&self, stack: &str) -> bool {
        stack
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .all(|line| self.internal_frames.is_match(line))
    }

    fn is_excluded(&self, state: &DeferredValueState) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }
        let Some(frame) = state.first_frame() else {
            return false;
        };
        match frame.local_path() {
            Some(path) => self.excluded_paths.is_match(path),
            None => self.excluded_paths.is_match(frame.url),
        }
    }
}
