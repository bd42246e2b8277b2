//! Postgres payment repository

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::backends::BackendError;
use crate::domain::PaymentRecord;

use super::PaymentRepository;

#[derive(Debug, Clone)]
pub struct PgPaymentRepository {
    name: &'static str,
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self::named(pool, "postgres")
    }

    /// Tell the primary and replica apart in logs.
    pub fn named(pool: PgPool, name: &'static str) -> Self {
        Self { name, pool }
    }

    /// Fetch a stored payment by transaction id
    pub async fn get(&self, transaction_id: Uuid) -> Result<Option<PaymentRecord>, BackendError> {
        let row: Option<(Uuid, Decimal, String, String, String)> = sqlx::query_as(
            r#"
            SELECT transaction_id, amount, currency, source_account, destination_account
            FROM payments
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, amount, currency, source, destination)| {
            PaymentRecord::from_parts(id, amount, currency, source, destination)
        }))
    }
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    fn backend(&self) -> &'static str {
        self.name
    }

    async fn save(&self, record: &PaymentRecord) -> Result<(), BackendError> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                transaction_id, amount, currency, source_account, destination_account
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (transaction_id) DO NOTHING
            "#,
        )
        .bind(record.transaction_id())
        .bind(record.amount())
        .bind(record.currency())
        .bind(record.source_account())
        .bind(record.destination_account())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
