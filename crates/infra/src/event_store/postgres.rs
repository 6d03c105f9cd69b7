//! Postgres-backed event store implementation.
//!
//! Persists event streams in an append-only `events` table. Optimistic
//! concurrency is enforced twice: by the version check inside the append
//! transaction, and by the unique constraint on
//! `(aggregate_id, sequence_number)` which turns a lost race into a
//! `Concurrency` error instead of a duplicate sequence number.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use cubemerch_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Postgres-backed append-only event store.
///
/// All operations use the SQLx connection pool; the pool handles
/// thread-safe connection management, so the store is freely shareable.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the `events` table and its indexes if they don't exist yet.
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                event_id        UUID PRIMARY KEY,
                aggregate_id    UUID NOT NULL,
                aggregate_type  TEXT NOT NULL,
                sequence_number BIGINT NOT NULL CHECK (sequence_number > 0),
                event_type      TEXT NOT NULL,
                event_version   INT NOT NULL,
                occurred_at     TIMESTAMPTZ NOT NULL,
                payload         JSONB NOT NULL,
                created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (aggregate_id, sequence_number)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }

    /// Load all events for an aggregate stream, in sequence number order.
    #[instrument(skip(self), fields(aggregate_id = %aggregate_id.as_uuid()), err)]
    pub async fn load_stream_async(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, aggregate_id, aggregate_type, sequence_number,
                   event_type, event_version, occurred_at, payload
            FROM events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            stored.push(row_to_stored(&row)?);
        }
        Ok(stored)
    }

    /// Append events with optimistic concurrency control.
    ///
    /// The version check and inserts run in a single transaction; a
    /// concurrent append that commits first trips the unique constraint and
    /// maps to `Concurrency`.
    #[instrument(skip(self, events), fields(event_count = events.len(), expected = ?expected_version), err)]
    pub async fn append_async(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("append.begin", e))?;

        let current: i64 = sqlx::query(
            "SELECT COALESCE(MAX(sequence_number), 0) AS v FROM events WHERE aggregate_id = $1",
        )
        .bind(aggregate_id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("append.version", e))?
        .get("v");

        let current = current as u64;
        if !expected_version.matches(current) {
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current}"
            )));
        }

        if current > 0 {
            let existing_type: String = sqlx::query(
                "SELECT aggregate_type FROM events WHERE aggregate_id = $1 AND sequence_number = 1",
            )
            .bind(aggregate_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("append.type_check", e))?
            .get("aggregate_type");

            if existing_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "stream aggregate_type is '{existing_type}', attempted append with '{aggregate_type}'"
                )));
            }
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for e in events {
            sqlx::query(
                r#"
                INSERT INTO events
                    (event_id, aggregate_id, aggregate_type, sequence_number,
                     event_type, event_version, occurred_at, payload)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(e.event_id)
            .bind(e.aggregate_id.as_uuid())
            .bind(&e.aggregate_type)
            .bind(next as i64)
            .bind(&e.event_type)
            .bind(e.event_version as i32)
            .bind(e.occurred_at)
            .bind(&e.payload)
            .execute(&mut *tx)
            .await
            .map_err(|err| map_sqlx_error("append.insert", err))?;

            committed.push(StoredEvent {
                event_id: e.event_id,
                aggregate_id: e.aggregate_id,
                aggregate_type: e.aggregate_type,
                sequence_number: next,
                event_type: e.event_type,
                event_version: e.event_version,
                occurred_at: e.occurred_at,
                payload: e.payload,
            });
            next += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("append.commit", e))?;

        Ok(committed)
    }
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        // The EventStore trait is synchronous; bridge onto the current tokio
        // runtime. `block_in_place` requires the multi-thread runtime flavor.
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            EventStoreError::InvalidAppend(
                "PostgresEventStore requires a tokio runtime context".to_string(),
            )
        })?;

        tokio::task::block_in_place(|| handle.block_on(self.append_async(events, expected_version)))
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            EventStoreError::InvalidAppend(
                "PostgresEventStore requires a tokio runtime context".to_string(),
            )
        })?;

        tokio::task::block_in_place(|| handle.block_on(self.load_stream_async(aggregate_id)))
    }
}

fn row_to_stored(row: &sqlx::postgres::PgRow) -> Result<StoredEvent, EventStoreError> {
    let event_id: Uuid = row.get("event_id");
    let aggregate_id: Uuid = row.get("aggregate_id");
    let aggregate_type: String = row.get("aggregate_type");
    let sequence_number: i64 = row.get("sequence_number");
    let event_type: String = row.get("event_type");
    let event_version: i32 = row.get("event_version");
    let occurred_at: DateTime<Utc> = row.get("occurred_at");
    let payload: serde_json::Value = row.get("payload");

    Ok(StoredEvent {
        event_id,
        aggregate_id: AggregateId::from_uuid(aggregate_id),
        aggregate_type,
        sequence_number: sequence_number as u64,
        event_type,
        event_version: event_version as u32,
        occurred_at,
        payload,
    })
}

fn map_sqlx_error(op: &str, err: sqlx::Error) -> EventStoreError {
    if let sqlx::Error::Database(db) = &err {
        // 23505: unique violation on (aggregate_id, sequence_number) — a
        // concurrent append won the race.
        if db.code().as_deref() == Some("23505") {
            return EventStoreError::Concurrency(format!("{op}: concurrent append detected"));
        }
    }
    EventStoreError::InvalidAppend(format!("{op}: {err}"))
}
