//! Exclusive lease via `FOR UPDATE SKIP
//! LOCKED`, visibility-safe reads past `pg_snapshot_xmin`, per-event
//! savepoint dispatch with checkpoint advance. Grounded on
//! `original_source/src/meowmx/esp/esp.py::handle_subscription_events`
//! (and its `read_checkpoint_and_lock_subscription` /
//! `read_events_after_checkpoint` / `update_event_subscription` helpers),
//! which is the one file in the retrieval corpus that implements this
//! exact protocol.

use eventstore_core::{EventHandler, RecordedEvent, StoreError, SubCheckpoint};
use sqlx::{Acquire, PgConnection, Postgres, Transaction};
use tracing::{info, instrument, warn};

use crate::map_db_error;
use crate::store::row_to_event;
use crate::PostgresStore;

/// `SELECT ... FOR UPDATE SKIP LOCKED` on the subscription row. `None`
/// means another worker currently holds the lease.
async fn acquire_lease(
    tx: &mut Transaction<'_, Postgres>,
    subscription_name: &str,
) -> Result<Option<SubCheckpoint>, StoreError> {
    let row = sqlx::query_as::<_, (i64, i64)>(
        "SELECT last_transaction_id, last_event_id FROM es_event_subscription \
         WHERE subscription_name = $1 FOR UPDATE SKIP LOCKED",
    )
    .bind(subscription_name)
    .fetch_optional(&mut **tx)
    .await
    .map_err(map_db_error)?;

    Ok(row.map(|(last_transaction_id, last_event_id)| SubCheckpoint {
        last_transaction_id,
        last_event_id,
    }))
}

/// Events for `aggregate_type` strictly after `checkpoint`, excluding
/// anything committed by a transaction still in flight relative to this
/// reader's own snapshot. Without it a
/// consumer could observe a higher transaction_id while a lower one is
/// still uncommitted, and permanently skip it once the checkpoint moves
/// past.
async fn read_after(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_type: &str,
    checkpoint: SubCheckpoint,
    limit: i64,
) -> Result<Vec<RecordedEvent>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT a.aggregate_type, e.id, e.transaction_id, e.aggregate_id, e.version, e.event_type, e.json_data
        FROM es_event e
        JOIN es_aggregate a ON a.id = e.aggregate_id
        WHERE a.aggregate_type = $1
          AND (e.transaction_id, e.id) > ($2, $3)
          AND e.transaction_id < (pg_snapshot_xmin(pg_current_snapshot())::text::bigint)
        ORDER BY e.transaction_id ASC, e.id ASC
        LIMIT $4
        "#,
    )
    .bind(aggregate_type)
    .bind(checkpoint.last_transaction_id)
    .bind(checkpoint.last_event_id)
    .bind(limit)
    .fetch_all(&mut **tx)
    .await
    .map_err(map_db_error)?;

    rows.iter().map(row_to_event).collect()
}

async fn advance_checkpoint(
    tx: &mut Transaction<'_, Postgres>,
    subscription_name: &str,
    checkpoint: SubCheckpoint,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE es_event_subscription SET last_transaction_id = $1, last_event_id = $2 \
         WHERE subscription_name = $3",
    )
    .bind(checkpoint.last_transaction_id)
    .bind(checkpoint.last_event_id)
    .bind(subscription_name)
    .execute(&mut **tx)
    .await
    .map_err(map_db_error)?;
    Ok(())
}

impl PostgresStore {
    #[instrument(skip(self, handler), fields(subscription_name, aggregate_type, batch_size))]
    pub(crate) async fn handle_batch_impl(
        &self,
        subscription_name: &str,
        aggregate_type: &str,
        batch_size: i64,
        handler: &(dyn EventHandler<PgConnection> + Send + Sync),
    ) -> Result<usize, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;

        sqlx::query(
            "INSERT INTO es_event_subscription (subscription_name) VALUES ($1) \
             ON CONFLICT (subscription_name) DO NOTHING",
        )
        .bind(subscription_name)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let checkpoint = match acquire_lease(&mut tx, subscription_name).await? {
            Some(checkpoint) => checkpoint,
            None => {
                // Another worker holds the lease. Not an error, since
                // lease contention is never surfaced; commit releases
                // whatever row-creation work we just did and the caller
                // backs off.
                tx.commit()
                    .await
                    .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;
                return Ok(0);
            }
        };

        let events = read_after(&mut tx, aggregate_type, checkpoint, batch_size).await?;

        let mut processed = 0usize;
        let mut checkpoint_advanced = false;

        for event in events.into_iter().take(batch_size as usize) {
            let mut savepoint = tx
                .begin()
                .await
                .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;

            match handler.handle(&mut *savepoint, &event).await {
                Ok(()) => {
                    savepoint
                        .commit()
                        .await
                        .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;

                    let new_checkpoint = SubCheckpoint {
                        last_transaction_id: event.transaction_id,
                        last_event_id: event.id,
                    };
                    advance_checkpoint(&mut tx, subscription_name, new_checkpoint).await?;
                    checkpoint_advanced = true;
                    processed += 1;
                }
                Err(err) => {
                    savepoint
                        .rollback()
                        .await
                        .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;
                    warn!(event_id = event.id, error = %err, "subscription handler failed");

                    // Preserve any progress already checkpointed this batch
                    // before surfacing the error; otherwise there is
                    // nothing to keep and we roll the whole attempt back.
                    if checkpoint_advanced {
                        tx.commit()
                            .await
                            .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;
                    } else {
                        tx.rollback()
                            .await
                            .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;
                    }
                    return Err(StoreError::HandlerFailed(err));
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;

        if processed > 0 {
            info!(processed, "dispatched subscription batch");
        }

        Ok(processed)
    }
}
