//! Detection of promise misuse in a finished snapshot.

mod runner;
mod suppress;
mod types;

pub use runner::Runner;
pub use suppress::{SuppressionFilter, SuppressionReason};
pub use types::{DependentGroup, Diagnostics, FindingRule, OverusedGroup, UnusedGroup};
