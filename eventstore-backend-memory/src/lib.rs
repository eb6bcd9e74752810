//! An in-process `EventStore` implementation, for fast unit tests of
//! everything layered above a backend (codec, registry, client façade,
//! backoff) without a real database.
//!
//! This backend has no MVCC and no concurrent transactions, so the
//! commit-order visibility filter is a no-op here: every appended event
//! is immediately visible to every reader the moment `append` returns.
//! That is a deliberate simplification, not a faithful reproduction of
//! the Postgres backend's commit-order semantics; that property is only
//! meaningfully tested against `eventstore-backend-postgres`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use eventstore_core::{
    types::{expected_stored_version, LoadAllOptions, LoadStreamOptions, EMPTY_STREAM_VERSION},
    Aggregate, EventHandler, EventStore as EventStoreTrait, NewEvent, RecordedEvent, StoreError,
    SubCheckpoint,
};

#[derive(Default)]
struct Inner {
    aggregates: HashMap<String, Aggregate>,
    events_by_aggregate: HashMap<String, Vec<RecordedEvent>>,
    all_events: Vec<RecordedEvent>,
    next_event_id: i64,
    next_transaction_id: i64,
    subscriptions: HashMap<String, SubCheckpoint>,
    locked_subscriptions: HashSet<String>,
}

pub struct InMemoryStore {
    state: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(Inner {
                next_event_id: 1,
                next_transaction_id: 1,
                ..Default::default()
            }),
        })
    }

    fn validate_batch(events: &[NewEvent]) -> Result<i64, StoreError> {
        let first = events.first().ok_or_else(|| {
            StoreError::InvalidBatch("append requires at least one event".into())
        })?;
        for (i, event) in events.iter().enumerate() {
            let expected = first.version + i as i64;
            if event.version != expected {
                return Err(StoreError::InvalidBatch(format!(
                    "events must carry contiguous versions: event {i} has version {}, expected {expected}",
                    event.version
                )));
            }
        }
        Ok(first.version - 1)
    }
}

#[async_trait]
impl EventStoreTrait for InMemoryStore {
    /// No real session object exists for the in-memory backend; handlers
    /// still receive a mutable reference so the signature matches the
    /// Postgres backend's.
    type Session = ();

    async fn setup(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn append(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let expected_version = Self::validate_batch(&events)?;
        let last_version = events.last().expect("validated non-empty").version;

        let mut state = self.state.write();

        let current_version = state
            .aggregates
            .entry(aggregate_id.to_string())
            .or_insert_with(|| Aggregate {
                id: aggregate_id.to_string(),
                aggregate_type: aggregate_type.to_string(),
                version: EMPTY_STREAM_VERSION,
            })
            .version;

        if current_version != expected_stored_version(expected_version) {
            return Err(StoreError::concurrent_stream_write(
                aggregate_id,
                expected_version,
                current_version,
            ));
        }

        let transaction_id = state.next_transaction_id;
        state.next_transaction_id += 1;

        let mut recorded = Vec::with_capacity(events.len());
        for event in events {
            let id = state.next_event_id;
            state.next_event_id += 1;
            recorded.push(RecordedEvent {
                id,
                aggregate_id: aggregate_id.to_string(),
                aggregate_type: aggregate_type.to_string(),
                version: event.version,
                event_type: event.event_type,
                json_payload: event.json_payload,
                transaction_id,
            });
        }

        if let Some(aggregate) = state.aggregates.get_mut(aggregate_id) {
            aggregate.version = last_version;
        }
        state
            .events_by_aggregate
            .entry(aggregate_id.to_string())
            .or_default()
            .extend(recorded.iter().cloned());
        state.all_events.extend(recorded.iter().cloned());

        Ok(recorded)
    }

    async fn load_stream(
        &self,
        aggregate_id: &str,
        options: LoadStreamOptions,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let state = self.state.read();
        let mut events: Vec<RecordedEvent> = state
            .events_by_aggregate
            .get(aggregate_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|e| {
                e.version > options.from_version
                    && options.to_version.map_or(true, |to| e.version <= to)
            })
            .collect();

        if options.reverse {
            events.reverse();
        }
        events.truncate(options.limit.max(0) as usize);
        Ok(events)
    }

    async fn load_all(&self, options: LoadAllOptions) -> Result<Vec<RecordedEvent>, StoreError> {
        if options.to_transaction_id.is_none() && options.limit.is_none() {
            return Err(StoreError::UnboundedRead);
        }

        let state = self.state.read();
        let mut events: Vec<RecordedEvent> = state
            .all_events
            .iter()
            .filter(|e| {
                options
                    .from_transaction_id
                    .map_or(true, |from| e.transaction_id > from)
                    && options
                        .to_transaction_id
                        .map_or(true, |to| e.transaction_id <= to)
            })
            .cloned()
            .collect();

        events.sort_by_key(|e| (e.transaction_id, e.id));
        if let Some(limit) = options.limit {
            events.truncate(limit.max(0) as usize);
        }
        Ok(events)
    }

    async fn handle_batch(
        &self,
        subscription_name: &str,
        aggregate_type: &str,
        batch_size: i64,
        handler: &(dyn EventHandler<()> + Send + Sync),
    ) -> Result<usize, StoreError> {
        {
            let mut state = self.state.write();
            state
                .subscriptions
                .entry(subscription_name.to_string())
                .or_insert(SubCheckpoint::INITIAL);
            if !state.locked_subscriptions.insert(subscription_name.to_string()) {
                return Ok(0);
            }
        }

        let result = self
            .handle_batch_while_locked(subscription_name, aggregate_type, batch_size, handler)
            .await;

        self.state
            .write()
            .locked_subscriptions
            .remove(subscription_name);

        result
    }
}

impl InMemoryStore {
    async fn handle_batch_while_locked(
        &self,
        subscription_name: &str,
        aggregate_type: &str,
        batch_size: i64,
        handler: &(dyn EventHandler<()> + Send + Sync),
    ) -> Result<usize, StoreError> {
        let checkpoint = *self
            .state
            .read()
            .subscriptions
            .get(subscription_name)
            .unwrap_or(&SubCheckpoint::INITIAL);

        let events: Vec<RecordedEvent> = {
            let state = self.state.read();
            let mut matching: Vec<RecordedEvent> = state
                .all_events
                .iter()
                .filter(|e| {
                    e.aggregate_type == aggregate_type
                        && (e.transaction_id, e.id)
                            > (checkpoint.last_transaction_id, checkpoint.last_event_id)
                })
                .cloned()
                .collect();
            matching.sort_by_key(|e| (e.transaction_id, e.id));
            matching.truncate(batch_size.max(0) as usize);
            matching
        };

        let mut processed = 0usize;
        for event in events {
            match handler.handle(&mut (), &event).await {
                Ok(()) => {
                    let mut state = self.state.write();
                    state.subscriptions.insert(
                        subscription_name.to_string(),
                        SubCheckpoint {
                            last_transaction_id: event.transaction_id,
                            last_event_id: event.id,
                        },
                    );
                    processed += 1;
                }
                Err(err) => {
                    return Err(StoreError::HandlerFailed(err));
                }
            }
        }

        Ok(processed)
    }
}
