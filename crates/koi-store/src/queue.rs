//! Durable event queue (C2): per-subscriber at-least-once delivery with TTL,
//! idempotent acknowledgement, and broadcast semantics. Ported from the
//! original asyncpg-backed `EventQueue` onto `sqlx::PgPool`.

use chrono::{DateTime, Duration, Utc};
use koi_core::{extract_rid_type, Event, EventType};
use serde_json::Value;
use sqlx::postgres::PgPool;
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

/// Default TTL for locally-originated events.
pub const DEFAULT_TTL_HOURS: i64 = 24;
/// Default TTL for events received from a remote peer (kept longer so a
/// slow subscriber still gets a chance to poll them).
pub const REMOTE_TTL_HOURS: i64 = 72;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct EventQueue {
    pool: PgPool,
}

fn event_type_str(t: EventType) -> &'static str {
    match t {
        EventType::New => "NEW",
        EventType::Update => "UPDATE",
        EventType::Forget => "FORGET",
    }
}

fn parse_event_type(raw: &str) -> EventType {
    match raw {
        "UPDATE" => EventType::Update,
        "FORGET" => EventType::Forget,
        _ => EventType::New,
    }
}

struct EventRow {
    event_id: Uuid,
    event_type: String,
    rid: String,
    manifest: Option<Value>,
    contents: Option<Value>,
    source_node: String,
    target_node: Option<String>,
    queued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    delivered_to: Vec<String>,
    confirmed_by: Vec<String>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            event_id: row.event_id,
            event_type: parse_event_type(&row.event_type),
            rid: row.rid,
            manifest: row.manifest.map(|m| serde_json::from_value(m).unwrap_or_else(|_| {
                koi_core::Manifest { rid: String::new(), timestamp: Utc::now(), sha256_hash: None }
            })),
            contents: row.contents,
            source_node: row.source_node,
            target_node: row.target_node,
            queued_at: row.queued_at,
            expires_at: row.expires_at,
            delivered_to: row.delivered_to,
            confirmed_by: row.confirmed_by,
        }
    }
}

fn row_from_sql(row: &sqlx::postgres::PgRow) -> EventRow {
    EventRow {
        event_id: row.get("event_id"),
        event_type: row.get("event_type"),
        rid: row.get("rid"),
        manifest: row.get("manifest"),
        contents: row.get("contents"),
        source_node: row.get("source_node"),
        target_node: row.get("target_node"),
        queued_at: row.get("queued_at"),
        expires_at: row.get("expires_at"),
        delivered_to: row.get("delivered_to"),
        confirmed_by: row.get("confirmed_by"),
    }
}

impl EventQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue an event. If `event_id` is supplied, dedups on
    /// `(source_node, event_id)`, returning `None` for a duplicate. If
    /// absent, assigns a fresh UUID.
    pub async fn add(
        &self,
        event_type: EventType,
        rid: &str,
        manifest: Option<Value>,
        contents: Option<Value>,
        source_node: &str,
        ttl_hours: i64,
        event_id: Option<Uuid>,
        target_node: Option<&str>,
    ) -> Result<Option<Uuid>, QueueError> {
        let event_id = event_id.unwrap_or_else(Uuid::new_v4);
        let now = Utc::now();
        let expires_at = now + Duration::hours(ttl_hours);

        let result = sqlx::query(
            r#"
            INSERT INTO events
                (event_id, event_type, rid, manifest, contents, source_node,
                 target_node, queued_at, expires_at, delivered_to, confirmed_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, '{}', '{}')
            ON CONFLICT (source_node, event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type_str(event_type))
        .bind(rid)
        .bind(manifest)
        .bind(contents)
        .bind(source_node)
        .bind(target_node)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(event_id))
    }

    /// Select the oldest visible events for `node`, optionally filtered by
    /// RID type, up to `limit`. If `mark_delivered` is true, each returned
    /// event is atomically appended to `delivered_to`.
    async fn select_visible(
        &self,
        node: &str,
        limit: i64,
        rid_types: Option<&[String]>,
        mark_delivered: bool,
    ) -> Result<Vec<Event>, QueueError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, rid, manifest, contents, source_node,
                   target_node, queued_at, expires_at, delivered_to, confirmed_by
            FROM events
            WHERE expires_at > now()
              AND (target_node IS NULL OR target_node = $1)
              AND NOT ($1 = ANY(delivered_to))
              AND ($2::text[] IS NULL OR split_part(rid, ':', 1) = ANY($2))
            ORDER BY queued_at ASC
            LIMIT $3
            "#,
        )
        .bind(node)
        .bind(rid_types)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        let events: Vec<EventRow> = rows.iter().map(row_from_sql).collect();

        if mark_delivered {
            for row in &events {
                sqlx::query(
                    r#"
                    UPDATE events
                    SET delivered_to = array_append(delivered_to, $1)
                    WHERE source_node = $2 AND event_id = $3
                      AND NOT ($1 = ANY(delivered_to))
                    "#,
                )
                .bind(node)
                .bind(&row.source_node)
                .bind(row.event_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(events.into_iter().map(Event::from).collect())
    }

    /// Atomically selects visible events for `requesting_node` and marks
    /// them delivered. At-least-once: a crash after this call but before
    /// processing means the events are not re-delivered to this node, but
    /// they remain available to other subscribers via `target_node = NULL`.
    pub async fn poll(
        &self,
        requesting_node: &str,
        limit: i64,
        rid_types: Option<&[String]>,
    ) -> Result<Vec<Event>, QueueError> {
        self.select_visible(requesting_node, limit, rid_types, true).await
    }

    /// Same selection rule as `poll` but does not mark delivered; for push
    /// delivery where mark-delivered only happens after transport succeeds.
    pub async fn peek(
        &self,
        target_node: &str,
        limit: i64,
        rid_types: Option<&[String]>,
    ) -> Result<Vec<Event>, QueueError> {
        self.select_visible(target_node, limit, rid_types, false).await
    }

    /// Idempotent append to `delivered_to` for each event in `event_ids`
    /// across any source node. Returns the count actually transitioned.
    pub async fn mark_delivered(
        &self,
        event_ids: &[Uuid],
        target_node: &str,
    ) -> Result<i64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET delivered_to = array_append(delivered_to, $1)
            WHERE event_id = ANY($2) AND NOT ($1 = ANY(delivered_to))
            "#,
        )
        .bind(target_node)
        .bind(event_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as i64)
    }

    /// Idempotent append to `confirmed_by`.
    pub async fn confirm(
        &self,
        event_ids: &[Uuid],
        confirming_node: &str,
    ) -> Result<i64, QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET confirmed_by = array_append(confirmed_by, $1)
            WHERE event_id = ANY($2) AND NOT ($1 = ANY(confirmed_by))
            "#,
        )
        .bind(confirming_node)
        .bind(event_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() as i64)
    }

    /// Delete expired events; returns the count deleted.
    pub async fn cleanup(&self) -> Result<i64, QueueError> {
        let result = sqlx::query("DELETE FROM events WHERE expires_at < now()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as i64)
    }

    pub async fn queue_size(&self) -> Result<i64, QueueError> {
        let row = sqlx::query("SELECT count(*) AS n FROM events WHERE expires_at > now()")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Appropriate TTL for an event from `source_node`: remote if the
    /// source differs from `local_node_rid`, local default otherwise.
    pub fn ttl_hours_for(local_node_rid: &str, source_node: &str) -> i64 {
        if source_node == local_node_rid {
            DEFAULT_TTL_HOURS
        } else {
            REMOTE_TTL_HOURS
        }
    }
}

/// `scheme:rest` RID-type extraction re-exported at the queue boundary for
/// callers that need to pre-filter without a DB round trip.
pub fn rid_type(rid: &str) -> &str {
    extract_rid_type(rid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_hours_for_local_vs_remote_source() {
        assert_eq!(EventQueue::ttl_hours_for("node-a", "node-a"), DEFAULT_TTL_HOURS);
        assert_eq!(EventQueue::ttl_hours_for("node-a", "node-b"), REMOTE_TTL_HOURS);
    }

    #[test]
    fn event_type_round_trips_through_sql_strings() {
        for t in [EventType::New, EventType::Update, EventType::Forget] {
            assert_eq!(parse_event_type(event_type_str(t)), t);
        }
    }

    #[test]
    fn rid_type_extracts_scheme() {
        assert_eq!(rid_type("github:acme/widgets/src/widget.py"), "github");
        assert_eq!(rid_type("web:https://example.com"), "web");
    }

    /// Requires a live Postgres reachable via `DATABASE_URL`; opt in with
    /// `cargo test -- --ignored`.
    #[tokio::test]
    #[ignore]
    async fn add_then_poll_marks_delivered_and_hides_from_repeat_poll() {
        let pool = crate::connect(&std::env::var("DATABASE_URL").unwrap()).await.unwrap();
        crate::run_migrations(&pool).await.unwrap();
        let queue = EventQueue::new(pool);

        let event_id = queue
            .add(EventType::New, "github:acme/widgets/a.py", None, None, "node-a", DEFAULT_TTL_HOURS, None, None)
            .await
            .unwrap();
        assert!(event_id.is_some());

        let first_poll = queue.poll("node-b", 10, None).await.unwrap();
        assert!(first_poll.iter().any(|e| e.event_id == event_id.unwrap()));

        let second_poll = queue.poll("node-b", 10, None).await.unwrap();
        assert!(!second_poll.iter().any(|e| e.event_id == event_id.unwrap()));
    }
}
