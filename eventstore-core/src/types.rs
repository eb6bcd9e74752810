use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The highest stream version an aggregate can have before any events exist.
///
/// First-event convention fixed per spec Open Question 1: the first
/// recorded event has `version == 1`, so an `expected_version` of `0`
/// on a brand-new aggregate succeeds.
pub const EMPTY_STREAM_VERSION: i64 = -1;

/// Bridges the CAS's two numbering scales: callers pass `expected_version
/// == 0` for "no events yet", but a fresh aggregate row is persisted at
/// `EMPTY_STREAM_VERSION` (`-1`), not `0`. Every other expected version
/// already equals the stored version directly (appending through version
/// `N` leaves `aggregate.version == N`), so only the empty-stream case
/// needs translating before it is compared against the persisted row.
pub fn expected_stored_version(expected_version: i64) -> i64 {
    if expected_version == 0 {
        EMPTY_STREAM_VERSION
    } else {
        expected_version
    }
}

/// A caller-constructed event awaiting assignment of store identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub aggregate_id: String,
    pub version: i64,
    pub event_type: String,
    pub json_payload: Value,
}

impl NewEvent {
    pub fn new(
        aggregate_id: impl Into<String>,
        version: i64,
        event_type: impl Into<String>,
        json_payload: Value,
    ) -> Self {
        Self {
            aggregate_id: aggregate_id.into(),
            version,
            event_type: event_type.into(),
            json_payload,
        }
    }
}

/// A `NewEvent` plus everything the store assigned on commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub id: i64,
    pub aggregate_id: String,
    pub aggregate_type: String,
    pub version: i64,
    pub event_type: String,
    pub json_payload: Value,
    pub transaction_id: i64,
}

/// A subscription's durable read position: `(transaction_id, event_id)`,
/// lexicographically non-decreasing for the life of the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubCheckpoint {
    pub last_transaction_id: i64,
    pub last_event_id: i64,
}

impl SubCheckpoint {
    pub const INITIAL: SubCheckpoint = SubCheckpoint {
        last_transaction_id: 0,
        last_event_id: 0,
    };
}

impl Default for SubCheckpoint {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Identity root of a stream, as seen by callers (the version CAS itself
/// lives in the store, this is the read-only snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub id: String,
    pub aggregate_type: String,
    pub version: i64,
}

/// Parameters for `EventStore::load_stream`.
#[derive(Debug, Clone, Copy)]
pub struct LoadStreamOptions {
    /// Exclusive lower bound. `0` means "from the start".
    pub from_version: i64,
    /// Inclusive upper bound. `None` means unbounded.
    pub to_version: Option<i64>,
    pub limit: i64,
    pub reverse: bool,
}

impl LoadStreamOptions {
    pub const DEFAULT_LIMIT: i64 = 512;
}

impl Default for LoadStreamOptions {
    fn default() -> Self {
        Self {
            from_version: 0,
            to_version: None,
            limit: Self::DEFAULT_LIMIT,
            reverse: false,
        }
    }
}

/// Parameters for `EventStore::load_all`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadAllOptions {
    /// Exclusive lower bound.
    pub from_transaction_id: Option<i64>,
    /// Inclusive upper bound.
    pub to_transaction_id: Option<i64>,
    pub limit: Option<i64>,
}
