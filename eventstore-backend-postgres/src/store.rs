//! Append with optimistic concurrency, stream reads, global reads.
//! Grounded on `original_source/src/meowmx/esp/esp.py` (`append_event`,
//! `create_aggregate_if_absent`, `check_and_update_aggregate_version`,
//! `read_events_by_aggregate_id`, `read_all_events`) for the SQL shape,
//! and on `store_postgres.rs`'s transaction/error-mapping idiom.

use eventstore_core::{
    types::{expected_stored_version, EMPTY_STREAM_VERSION, LoadAllOptions, LoadStreamOptions},
    NewEvent, RecordedEvent, StoreError,
};
use sqlx::{postgres::PgRow, Row};

use crate::map_db_error;
use crate::PostgresStore;

pub(crate) fn row_to_event(row: &PgRow) -> Result<RecordedEvent, StoreError> {
    Ok(RecordedEvent {
        id: row.try_get("id").map_err(|e| StoreError::Internal(e.into()))?,
        aggregate_id: row
            .try_get("aggregate_id")
            .map_err(|e| StoreError::Internal(e.into()))?,
        aggregate_type: row
            .try_get("aggregate_type")
            .map_err(|e| StoreError::Internal(e.into()))?,
        version: row
            .try_get("version")
            .map_err(|e| StoreError::Internal(e.into()))?,
        event_type: row
            .try_get("event_type")
            .map_err(|e| StoreError::Internal(e.into()))?,
        json_payload: row
            .try_get("json_data")
            .map_err(|e| StoreError::Internal(e.into()))?,
        transaction_id: row
            .try_get("transaction_id")
            .map_err(|e| StoreError::Internal(e.into()))?,
    })
}

/// Validates the append precondition before any I/O:
/// `events` non-empty, and `events[i].version == events[0].version + i`.
/// Returns the CAS's expected version (`events[0].version - 1`).
fn validate_batch(events: &[NewEvent]) -> Result<i64, StoreError> {
    let first = events
        .first()
        .ok_or_else(|| StoreError::InvalidBatch("append requires at least one event".into()))?;

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

impl PostgresStore {
    pub(crate) async fn append_impl(
        &self,
        aggregate_type: &str,
        aggregate_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let expected_version = validate_batch(&events)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;

        sqlx::query(
            "INSERT INTO es_aggregate (id, version, aggregate_type) \
             VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING",
        )
        .bind(aggregate_id)
        .bind(EMPTY_STREAM_VERSION)
        .bind(aggregate_type)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let current_version: i64 = sqlx::query_scalar(
            "SELECT version FROM es_aggregate WHERE id = $1 FOR UPDATE",
        )
        .bind(aggregate_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_db_error)?;

        let last_version = events.last().expect("validated non-empty").version;

        let cas_rows = sqlx::query(
            "UPDATE es_aggregate SET version = $1 WHERE id = $2 AND version = $3",
        )
        .bind(last_version)
        .bind(aggregate_id)
        .bind(expected_stored_version(expected_version))
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?
        .rows_affected();

        if cas_rows == 0 {
            tx.rollback()
                .await
                .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;
            return Err(StoreError::concurrent_stream_write(
                aggregate_id,
                expected_version,
                current_version,
            ));
        }

        let mut recorded = Vec::with_capacity(events.len());
        for event in events {
            let row = sqlx::query(
                r#"
                INSERT INTO es_event (transaction_id, aggregate_id, version, event_type, json_data)
                VALUES ((pg_current_xact_id()::text)::bigint, $1, $2, $3, $4)
                RETURNING id, transaction_id
                "#,
            )
            .bind(aggregate_id)
            .bind(event.version)
            .bind(&event.event_type)
            .bind(&event.json_payload)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_db_error)?;

            recorded.push(RecordedEvent {
                id: row.get("id"),
                aggregate_id: aggregate_id.to_string(),
                aggregate_type: aggregate_type.to_string(),
                version: event.version,
                event_type: event.event_type,
                json_payload: event.json_payload,
                transaction_id: row.get("transaction_id"),
            });
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::DatabaseUnavailable(e.into()))?;

        Ok(recorded)
    }

    pub(crate) async fn load_stream_impl(
        &self,
        aggregate_id: &str,
        options: LoadStreamOptions,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        let order = if options.reverse { "DESC" } else { "ASC" };
        let query = format!(
            r#"
            SELECT a.aggregate_type, e.id, e.transaction_id, e.aggregate_id, e.version, e.event_type, e.json_data
            FROM es_event e
            JOIN es_aggregate a ON a.id = e.aggregate_id
            WHERE e.aggregate_id = $1
              AND e.version > $2
              AND ($3::bigint IS NULL OR e.version <= $3)
            ORDER BY e.version {order}
            LIMIT $4
            "#
        );

        let rows = sqlx::query(&query)
            .bind(aggregate_id)
            .bind(options.from_version)
            .bind(options.to_version)
            .bind(options.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)?;

        rows.iter().map(row_to_event).collect()
    }

    pub(crate) async fn load_all_impl(
        &self,
        options: LoadAllOptions,
    ) -> Result<Vec<RecordedEvent>, StoreError> {
        if options.to_transaction_id.is_none() && options.limit.is_none() {
            return Err(StoreError::UnboundedRead);
        }

        let rows = sqlx::query(
            r#"
            SELECT a.aggregate_type, e.id, e.transaction_id, e.aggregate_id, e.version, e.event_type, e.json_data
            FROM es_event e
            JOIN es_aggregate a ON a.id = e.aggregate_id
            WHERE ($1::bigint IS NULL OR e.transaction_id > $1)
              AND ($2::bigint IS NULL OR e.transaction_id <= $2)
            ORDER BY e.transaction_id ASC, e.id ASC
            LIMIT $3
            "#,
        )
        .bind(options.from_transaction_id)
        .bind(options.to_transaction_id)
        .bind(options.limit.unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)?;

        rows.iter().map(row_to_event).collect()
    }
}
