//! Per-(model, version) lifecycle record (spec §3, §4.4).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{engine::EngineHandle, error::ErrorCode};

/// States of a Version Record, in the order they're first reachable from
/// `DISCOVERED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionState {
    Discovered,
    Loading,
    Available,
    Unloading,
    End,
    Failed,
}

impl VersionState {
    /// Whether `to` is a legal transition from `self`, per the state diagram
    /// in spec §4.4.
    pub fn can_transition_to(self, to: VersionState) -> bool {
        use VersionState::*;
        matches!(
            (self, to),
            (Discovered, Loading)
                | (Discovered, End) // retired before ever being wanted by policy
                | (Loading, Available)
                | (Loading, Failed)
                | (Available, Unloading)
                | (Available, Loading) // reload
                | (Unloading, End)
                | (Failed, Loading) // retry
                | (Failed, End)
        )
    }
}

/// Deterministic `(state, error_code)` -> message table. Implementers must
/// replicate these exact strings: clients parse `error_message` (spec §4.4,
/// §6).
pub fn error_message(state: VersionState, code: ErrorCode) -> &'static str {
    use ErrorCode::*;
    use VersionState::*;
    match (state, code) {
        (Discovered, Ok) => "",
        (Loading, Ok) => "",
        (Available, Ok) => "",
        (Unloading, Ok) => "",
        (End, Ok) => "",
        (Failed, LoadFailed) => "Failed to load model version.",
        (Failed, Internal) => "Could not load model version: internal error.",
        (Failed, _) => "Could not load model version.",
        (_, NotFound) => "Requested version is not present in the model repository.",
        (_, InvalidInput) => "Invalid input for model version.",
        (_, UnloadPending) => "Model version is being unloaded.",
        (_, IoError) => "Storage backend IO error.",
        (_, Internal) => "Internal error.",
        (_, DeadlineExceeded) => "Deadline exceeded.",
        (_, LoadFailed) => "Could not load model version.",
    }
}

/// A single (model, version) lifecycle record (spec §3).
///
/// `engine` is present iff `state ∈ {AVAILABLE, UNLOADING}` (invariant 2).
#[derive(Clone)]
pub struct VersionRecord {
    pub version: u64,
    pub state: VersionState,
    pub error_code: ErrorCode,
    pub engine: Option<Arc<EngineHandle>>,
}

impl VersionRecord {
    pub fn discovered(version: u64) -> Self {
        VersionRecord {
            version,
            state: VersionState::Discovered,
            error_code: ErrorCode::Ok,
            engine: None,
        }
    }

    /// Apply a transition, updating `error_code` and `engine` consistently
    /// with invariant 2. Panics if the transition is illegal — the Model
    /// Manager is the sole mutator and must never attempt an illegal one.
    pub fn transition(&mut self, to: VersionState, code: ErrorCode, engine: Option<Arc<EngineHandle>>) {
        assert!(
            self.state.can_transition_to(to),
            "illegal version-state transition {:?} -> {:?}",
            self.state,
            to
        );
        debug_assert_eq!(
            matches!(to, VersionState::Available | VersionState::Unloading),
            engine.is_some(),
            "engine presence must match invariant 2 for state {to:?}"
        );
        self.state = to;
        self.error_code = code;
        self.engine = engine;
    }

    pub fn error_message(&self) -> &'static str {
        error_message(self.state, self.error_code)
    }

    /// Snapshot used by `list_statuses` (spec §4.5) — carries no engine
    /// reference so callers can't bypass the concurrency guard.
    pub fn status(&self) -> VersionStatus {
        VersionStatus {
            version: self.version,
            state: self.state,
            error_code: self.error_code,
            error_message: self.error_message(),
        }
    }
}

/// Lock-free snapshot of one Version Record, as returned by
/// `ModelManager::list_statuses` and serialized by `GetModelStatus`.
#[derive(Debug, Clone, Serialize)]
pub struct VersionStatus {
    pub version: u64,
    pub state: VersionState,
    pub error_code: ErrorCode,
    pub error_message: &'static str,
}

impl Serialize for ErrorCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ErrorCode::from_str(&s).ok_or_else(|| serde::de::Error::custom(format!("unknown error code {s}")))
    }
}
