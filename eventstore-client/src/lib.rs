//! The one entry point callers use instead of talking to a backend's
//! `EventStore` impl directly. `Client` wraps a backend in-process rather
//! than dialing one over the network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eventstore_core::{
    Backoff, EventHandler, EventStore, LoadAllOptions, LoadStreamOptions, NewEvent,
    RecordedEvent, StoreError,
};
use tracing::{debug, info};

/// Wraps a configured backend and exposes the store's public surface
/// plus the polling `subscribe` loop.
#[derive(Clone)]
pub struct Client<B: EventStore> {
    store: Arc<B>,
}

impl<B: EventStore> Client<B> {
    pub fn new(store: Arc<B>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<B> {
        &self.store
    }

    pub async fn setup_tables(&self) -> Result<(), StoreError> {
        self.store.setup().await
    }

    pub async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        self.store.append(aggregate_type, aggregate_id, events).await
    }

    pub async fn load_stream(
        &self,
        aggregate_id: &str,
        options: LoadStreamOptions,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        self.store.load_stream(aggregate_id, options).await
    }

    pub async fn load_all(&self, options: LoadAllOptions) -> Result<Vec<RecordedEvent>, StoreError> {
        self.store.load_all(options).await
    }

    /// One non-blocking dispatch attempt, returning the number of events
    /// handled. `0` means the backlog was empty, or another worker holds
    /// the subscription's lease; both are the caller's cue to back off.
    pub async fn poll_once(
        &self,
        subscription_name: &str,
        aggregate_type: &str,
        batch_size: i64,
        handler: &(dyn EventHandler<B::Session> + Send + Sync),
    ) -> Result<usize, StoreError> {
        self.store
            .handle_batch(subscription_name, aggregate_type, batch_size, handler)
            .await
    }

    /// Polls `subscription_name` forever, dispatching up to `batch_size`
    /// events of `aggregate_type` to `handler` each round and backing off
    /// via [`Backoff`] between empty polls (reset on the first non-empty
    /// one). Mirrors the shape commented out in the original demo's
    /// `while True: processed = handle_subscription_events(...); if
    /// processed == 0: sleep(...)` loop.
    ///
    /// Returns once `running` is set to `false`; checked between polls so
    /// a caller can shut a worker down cooperatively.
    pub async fn subscribe(
        &self,
        subscription_name: &str,
        aggregate_type: &str,
        handler: &(dyn EventHandler<B::Session> + Send + Sync),
        batch_size: i64,
        poll_limit_seconds: u64,
        running: &AtomicBool,
    ) -> Result<(), StoreError> {
        let mut backoff = Backoff::with_poll_limit(poll_limit_seconds);

        while running.load(Ordering::Relaxed) {
            let processed = self
                .poll_once(subscription_name, aggregate_type, batch_size, handler)
                .await?;

            if processed == 0 {
                debug!(subscription_name, "no events, backing off");
                backoff.sleep().await;
                backoff.record_empty_poll();
            } else {
                info!(subscription_name, processed, "dispatched subscription batch");
                backoff.reset();
            }
        }

        Ok(())
    }
}
