use async_trait::async_trait;
use std::future::Future;

use crate::errors::StoreError;
use crate::types::{LoadAllOptions, LoadStreamOptions, NewEvent, RecordedEvent};

/// A per-event callback invoked inside the subscription engine's nested
/// transaction (see `EventStore::handle_batch`).
///
/// `S` is the backend's notion of a "session" the handler can use to
/// perform its own writes atomically with the checkpoint advance: a
/// `sqlx::PgConnection` for the Postgres backend, `()` for the in-memory
/// one. Returning `Err` rolls back the handler's savepoint; it does not
/// abort the batch, so earlier events in the same call stay checkpointed.
#[async_trait]
pub trait EventHandler<S>: Send + Sync
where
    S: Send,
{
    async fn handle(&self, session: &mut S, event: &RecordedEvent) -> anyhow::Result<()>;
}

#[async_trait]
impl<S, F, Fut> EventHandler<S> for F
where
    S: Send,
    F: Fn(&mut S, &RecordedEvent) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    async fn handle(&self, session: &mut S, event: &RecordedEvent) -> anyhow::Result<()> {
        (self)(session, event).await
    }
}

/// Append, stream reads, global reads, and subscription dispatch bound
/// into one trait per backend.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    /// The session type a subscription handler receives. Concrete per
    /// backend; see `EventHandler`.
    type Session: Send;

    /// Idempotent schema setup (`es_aggregate`, `es_event`,
    /// `es_event_subscription` + indexes).
    async fn setup(&self) -> Result<(), StoreError>;

    /// Append `events` to `aggregate_id`'s stream under a single
    /// transaction: aggregate upsert, version CAS, event inserts.
    ///
    /// Preconditions (violation is `InvalidBatch`, raised before any I/O):
    /// `events` non-empty; versions form a contiguous run starting at
    /// `events[0].version`; the expected version for the CAS is
    /// `events[0].version - 1`.
    async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Read one aggregate's stream, ordered by `version`.
    async fn load_stream(
        &self,
        aggregate_id: &str,
        options: LoadStreamOptions,
    ) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Read the global log ordered by `transaction_id`. Fails with
    /// `UnboundedRead` unless `to_transaction_id` or `limit` is set.
    async fn load_all(&self, options: LoadAllOptions) -> Result<Vec<RecordedEvent>, StoreError>;

    /// Dispatch up to `batch_size` unprocessed events of `aggregate_type`
    /// to `handler`, advancing `subscription_name`'s checkpoint as each
    /// one commits. Returns the number of events actually dispatched;
    /// `0` means either the backlog was empty or another worker currently
    /// holds the subscription's lease; lease contention is routine
    /// under `SKIP LOCKED`, so it is never surfaced as an error.
    async fn handle_batch(
        &self,
        subscription_name: &str,
        aggregate_type: &str,
        batch_size: i64,
        handler: &(dyn EventHandler<Self::Session> + Send + Sync),
    ) -> Result<usize, StoreError>;
}
