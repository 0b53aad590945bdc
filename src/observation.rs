//! Typed lifecycle observations emitted by the runtime's async hooks.
//!
//! Each kind has a fixed canonical field order. The wire codec negotiates a
//! sender-specific ordering per kind, then re-projects every data record into
//! this canonical order before deserializing it into one of the structs below.

use serde::{Deserialize, Serialize};

/// Runtime identifier of a trackable asynchronous resource.
pub type AsyncId = i64;

/// Type tag the runtime uses for promise allocations.
pub const PROMISE_TYPE: &str = "PROMISE";

/// The five observation kinds carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObservationKind {
    Init,
    PromiseResolve,
    Before,
    After,
    Destroy,
}

impl ObservationKind {
    pub const ALL: [ObservationKind; 5] = [
        ObservationKind::Init,
        ObservationKind::PromiseResolve,
        ObservationKind::Before,
        ObservationKind::After,
        ObservationKind::Destroy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::Init => "init",
            ObservationKind::PromiseResolve => "promiseResolve",
            ObservationKind::Before => "before",
            ObservationKind::After => "after",
            ObservationKind::Destroy => "destroy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "init" => Some(ObservationKind::Init),
            "promiseResolve" => Some(ObservationKind::PromiseResolve),
            "before" => Some(ObservationKind::Before),
            "after" => Some(ObservationKind::After),
            "destroy" => Some(ObservationKind::Destroy),
            _ => None,
        }
    }

    /// Canonical field names, in the order the typed records declare them.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            ObservationKind::Init => &[
                "type",
                "executionAsyncId",
                "triggerAsyncId",
                "asyncId",
                "stack",
            ],
            ObservationKind::PromiseResolve => &[
                "executionAsyncId",
                "triggerAsyncId",
                "asyncId",
                "inspected",
            ],
            ObservationKind::Before | ObservationKind::After => &["triggerAsyncId", "asyncId"],
            ObservationKind::Destroy => &["asyncId"],
        }
    }
}

impl ObservationKind {
    /// Whether a sender may leave the field out of its header.
    pub fn is_optional(&self, field: &str) -> bool {
        matches!((self, field), (ObservationKind::PromiseResolve, "inspected"))
    }
}

impl std::fmt::Display for ObservationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A resource allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Init {
    /// Resource type tag (only [`PROMISE_TYPE`] is tracked)
    #[serde(rename = "type")]
    pub type_tag: String,
    pub execution_id: AsyncId,
    pub trigger_id: AsyncId,
    pub id: AsyncId,
    /// Newline-separated `url:line:col` frames, caller first
    pub stack: String,
}

impl Init {
    pub fn is_promise(&self) -> bool {
        self.type_tag == PROMISE_TYPE
    }
}

/// A promise settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolve {
    pub execution_id: AsyncId,
    pub trigger_id: AsyncId,
    pub id: AsyncId,
    #[serde(default)]
    pub inspected: Option<String>,
}

/// A callback boundary (`before` or `after`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callback {
    pub trigger_id: AsyncId,
    pub id: AsyncId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destroy {
    pub id: AsyncId,
}

/// One lifecycle event, in the order the runtime emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Init(Init),
    PromiseResolve(Resolve),
    Before(Callback),
    After(Callback),
    Destroy(Destroy),
}

impl Observation {
    pub fn kind(&self) -> ObservationKind {
        match self {
            Observation::Init(_) => ObservationKind::Init,
            Observation::PromiseResolve(_) => ObservationKind::PromiseResolve,
            Observation::Before(_) => ObservationKind::Before,
            Observation::After(_) => ObservationKind::After,
            Observation::Destroy(_) => ObservationKind::Destroy,
        }
    }

    /// The async id the observation is about.
    pub fn id(&self) -> AsyncId {
        match self {
            Observation::Init(init) => init.id,
            Observation::PromiseResolve(resolve) => resolve.id,
            Observation::Before(cb) | Observation::After(cb) => cb.id,
            Observation::Destroy(destroy) => destroy.id,
        }
    }
}
