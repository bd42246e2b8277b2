//! Postgres-backed queue
//!
//! Messages live in `queue_messages`. Receive leases one row with
//! `FOR UPDATE SKIP LOCKED` so concurrent consumers never take the same
//! message; a lease that expires without an ack makes the row visible again.
//! Ack deletes the row.

use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::backends::BackendError;

use super::{Acknowledger, Delivery, QueuePublisher, QueueSubscriber};

#[derive(Debug, Clone)]
pub struct PgQueue {
    pool: PgPool,
    lease: Duration,
}

impl PgQueue {
    pub fn new(pool: PgPool, lease: Duration) -> Self {
        Self { pool, lease }
    }

    /// Messages waiting or leased on `channel`
    pub async fn depth(&self, channel: &str) -> Result<i64, BackendError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_messages WHERE channel = $1")
                .bind(channel)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

#[async_trait]
impl QueuePublisher for PgQueue {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BackendError> {
        sqlx::query(
            r#"
            INSERT INTO queue_messages (id, channel, payload)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(channel)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl QueueSubscriber for PgQueue {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn receive(&self, channel: &str) -> Result<Option<Delivery>, BackendError> {
        let row: Option<(Uuid, String, i32)> = sqlx::query_as(
            r#"
            UPDATE queue_messages
            SET attempts = attempts + 1,
                leased_until = NOW() + make_interval(secs => $2)
            WHERE id = (
                SELECT id FROM queue_messages
                WHERE channel = $1
                  AND (leased_until IS NULL OR leased_until < NOW())
                ORDER BY created_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, payload, attempts
            "#,
        )
        .bind(channel)
        .bind(self.lease.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, payload, attempts)| {
            Delivery::new(
                id,
                channel,
                payload,
                attempts.max(0) as u32,
                Arc::new(self.clone()),
            )
        }))
    }
}

#[async_trait]
impl Acknowledger for PgQueue {
    async fn ack(&self, channel: &str, message_id: Uuid) -> Result<(), BackendError> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE id = $1 AND channel = $2")
            .bind(message_id)
            .bind(channel)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BackendError::InvalidData(format!(
                "message {} no longer on '{}'",
                message_id, channel
            )));
        }

        Ok(())
    }
}
