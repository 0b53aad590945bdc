//! promise-misuse - diagnose promise misuse from async lifecycle traces.
//!
//! A collector running inside the traced process writes one JSON array per
//! async lifecycle event. This crate replays that trace, correlates the
//! events into a graph of promise states and reports two anti-patterns:
//! promises allocated but never consumed, and promises whose result was
//! unwrapped by more than one dependent.
//!
//! # Architecture
//!
//! - `observation`: The closed set of lifecycle events
//! - `codec`: Schema-negotiated wire format (meta, data and end records)
//! - `analysis`: Correlation state machine, frozen snapshot and the
//!   source-reading `await` classifier
//! - `session`: One run threading a decoder and a state machine through a
//!   record stream
//! - `detect`: Suppression filters and grouping of findings
//! - `config`: YAML configuration
//! - `report`: Output formatting (pretty, JSON)

pub mod analysis;
pub mod cli;
pub mod codec;
pub mod config;
pub mod detect;
pub mod observation;
pub mod report;
pub mod session;

pub use analysis::{
    Analyzer, DeferredValueState, FsSourceProvider, Snapshot, SourceProvider,
    SuspensionClassifier,
};
pub use codec::{CodecError, Encoder, LineProcessor, Record};
pub use config::Config;
pub use detect::{Diagnostics, Runner, SuppressionReason};
pub use observation::{AsyncId, Observation, ObservationKind};
pub use session::{Flow, IngestStats, Session};
