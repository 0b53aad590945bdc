//! Core types for detection results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::SuppressionReason;
use crate::observation::AsyncId;

/// Rule names for the two promise anti-patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FindingRule {
    /// Allocated and never unwrapped
    #[serde(rename = "unused_allocation")]
    UnusedAllocation,
    /// Unwrapped by more than one dependent
    #[serde(rename = "overused_allocation")]
    OverusedAllocation,
}

impl FindingRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingRule::UnusedAllocation => "unused_allocation",
            FindingRule::OverusedAllocation => "overused_allocation",
        }
    }
}

impl std::fmt::Display for FindingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unused promises sharing one allocation site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedGroup {
    pub stack: String,
    pub ids: Vec<AsyncId>,
}

impl UnusedGroup {
    pub fn count(&self) -> usize {
        self.ids.len()
    }
}

/// Dependents of an overused site that share their own allocation site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentGroup {
    pub stack: String,
    pub ids: Vec<AsyncId>,
}

/// Overused promises sharing one allocation site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverusedGroup {
    pub stack: String,
    /// The overused promises allocated at this site
    pub ids: Vec<AsyncId>,
    /// Sites that unwrapped them, in first-seen order
    pub unwrapped_at: Vec<DependentGroup>,
    /// Sites whose promises settled inside them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub continued_at: Vec<DependentGroup>,
}

impl OverusedGroup {
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Total number of unwraps across all instances.
    pub fn unwrap_count(&self) -> usize {
        self.unwrapped_at.iter().map(|g| g.ids.len()).sum()
    }
}

/// Results of running detection over a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Callback turns observed
    pub ticks: u64,
    /// Promises tracked
    pub tracked: usize,
    pub unused: Vec<UnusedGroup>,
    pub overused: Vec<OverusedGroup>,
    /// Promises skipped, by reason
    #[serde(default)]
    pub suppressed: BTreeMap<SuppressionReason, usize>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of reported promises.
    pub fn finding_count(&self) -> usize {
        self.unused.iter().map(UnusedGroup::count).sum::<usize>()
            + self.overused.iter().map(OverusedGroup::count).sum::<usize>()
    }

    pub fn has_findings(&self) -> bool {
        !self.unused.is_empty() || !self.overused.is_empty()
    }

    pub fn suppressed_count(&self) -> usize {
        self.suppressed.values().sum()
    }

    pub(crate) fn record_suppressed(&mut self, reason: SuppressionReason) {
        *self.suppressed.entry(reason).or_default() += 1;
    }
}
