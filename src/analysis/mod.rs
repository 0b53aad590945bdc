//! Promise lifecycle correlation.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐  end  ┌──────────────┐
//! │ Observations │────▶│ Analyzer     │──────▶│ Snapshot     │
//! └──────────────┘     │ (StateArena) │       │ (frozen)     │
//!                      └──────────────┘       └──────────────┘
//!                                                    │
//!                             SuspensionClassifier ──┘
//! ```
//!
//! The [`Analyzer`] owns every [`DeferredValueState`] in a single arena and
//! records causal edges as plain ids. Finishing the analyzer freezes the
//! arena, classifies executed allocation sites as `await` or continuation,
//! and yields a [`Snapshot`] the detection runner reads.

mod classify;
mod frame;
mod machine;
mod snapshot;
mod state;

pub use classify::{is_await_at, FsSourceProvider, SourceProvider, SuspensionClassifier};
pub use frame::{first_frame, Frame};
pub use machine::Analyzer;
pub use snapshot::{Finalized, Snapshot};
pub use state::{DeferredValueState, StateArena};
