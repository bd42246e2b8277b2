//! Database module
//!
//! Pool creation and schema verification. Tables are created by the SQL
//! files in `migrations/`.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Table backing `PgBalanceStore`
pub const BALANCE_TABLE: &str = "user_balances";
/// Table backing `PgPaymentRepository`
pub const PAYMENTS_TABLE: &str = "payments";
/// Table backing `PgQueue`
pub const QUEUE_TABLE: &str = "queue_messages";

/// Open a pool and verify the server answers.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await?;

    verify_connection(&pool).await?;
    Ok(pool)
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check that every table in `required_tables` exists
pub async fn check_schema(pool: &PgPool, required_tables: &[&str]) -> Result<bool, sqlx::Error> {
    for table in required_tables {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}
