// Repository layer for database operations

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::SubscriptionRow;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

/// Input for inserting or replacing a subscription row
#[derive(Debug, Clone)]
pub struct UpsertSubscription {
    pub id: Uuid,
    pub base_id: String,
    pub table_id: String,
    pub webhook_id: Option<String>,
    pub secret_sealed: Option<String>,
    pub last_cursor: i64,
    pub config: sqlx::types::JsonValue,
    pub expiration_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create database connection from URL
    pub async fn from_url(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Run pending migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============================================
    // Subscriptions
    // ============================================

    pub async fn upsert_subscription(&self, input: UpsertSubscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, base_id, table_id, webhook_id, secret_sealed, last_cursor,
                 config, expiration_time, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            ON CONFLICT (id) DO UPDATE SET
                base_id = EXCLUDED.base_id,
                table_id = EXCLUDED.table_id,
                webhook_id = EXCLUDED.webhook_id,
                secret_sealed = EXCLUDED.secret_sealed,
                last_cursor = EXCLUDED.last_cursor,
                config = EXCLUDED.config,
                expiration_time = EXCLUDED.expiration_time,
                updated_at = NOW()
            "#,
        )
        .bind(input.id)
        .bind(&input.base_id)
        .bind(&input.table_id)
        .bind(&input.webhook_id)
        .bind(&input.secret_sealed)
        .bind(input.last_cursor)
        .bind(&input.config)
        .bind(input.expiration_time)
        .bind(input.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_subscription(&self, id: Uuid) -> Result<Option<SubscriptionRow>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, base_id, table_id, webhook_id, secret_sealed, last_cursor,
                   config, expiration_time, created_at, updated_at
            FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn find_subscription_by_webhook(
        &self,
        base_id: &str,
        webhook_id: &str,
    ) -> Result<Option<SubscriptionRow>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, base_id, table_id, webhook_id, secret_sealed, last_cursor,
                   config, expiration_time, created_at, updated_at
            FROM subscriptions
            WHERE base_id = $1 AND webhook_id = $2
            "#,
        )
        .bind(base_id)
        .bind(webhook_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionRow>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, base_id, table_id, webhook_id, secret_sealed, last_cursor,
                   config, expiration_time, created_at, updated_at
            FROM subscriptions
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Advance the cursor high-water mark, never backwards.
    /// Returns the cursor value actually stored.
    pub async fn advance_subscription_cursor(&self, id: Uuid, cursor: i64) -> Result<Option<i64>> {
        let stored: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE subscriptions
            SET last_cursor = GREATEST(last_cursor, $2), updated_at = NOW()
            WHERE id = $1
            RETURNING last_cursor
            "#,
        )
        .bind(id)
        .bind(cursor)
        .fetch_optional(&self.pool)
        .await?;

        Ok(stored.map(|(c,)| c))
    }

    pub async fn delete_subscription(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
