//! Postgres balance store
//!
//! Table `user_balances (user_id TEXT PK, balance NUMERIC, version BIGINT)`.
//! Writes are conditional on `version`, so two instances sharing one database
//! cannot lose each other's updates.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::backends::BackendError;
use crate::domain::Balance;

use super::{BalanceRecord, BalanceStore};

#[derive(Debug, Clone)]
pub struct PgBalanceStore {
    pool: PgPool,
}

impl PgBalanceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BalanceStore for PgBalanceStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn load(&self, user_id: &str) -> Result<Option<BalanceRecord>, BackendError> {
        let row: Option<(Decimal, i64)> = sqlx::query_as(
            r#"
            SELECT balance, version FROM user_balances WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(balance, version)| {
            let balance = Balance::new(balance)
                .map_err(|e| BackendError::InvalidData(format!("user {}: {}", user_id, e)))?;
            Ok(BalanceRecord {
                user_id: user_id.to_string(),
                balance,
                version,
            })
        })
        .transpose()
    }

    async fn save(&self, record: &BalanceRecord, expected_version: i64) -> Result<(), BackendError> {
        let rows_affected = if expected_version == 0 {
            // First write for this user: lose the race if someone else created it.
            sqlx::query(
                r#"
                INSERT INTO user_balances (user_id, balance, version, updated_at)
                VALUES ($1, $2, $3, NOW())
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(&record.user_id)
            .bind(record.balance.value())
            .bind(record.version)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE user_balances
                SET balance = $2, version = $3, updated_at = NOW()
                WHERE user_id = $1 AND version = $4
                "#,
            )
            .bind(&record.user_id)
            .bind(record.balance.value())
            .bind(record.version)
            .bind(expected_version)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if rows_affected == 0 {
            return Err(BackendError::VersionConflict {
                key: record.user_id.clone(),
                expected: expected_version,
            });
        }

        Ok(())
    }
}
