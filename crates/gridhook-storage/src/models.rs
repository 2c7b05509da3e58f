// Database models (internal, may differ from the core entity)

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// One durable subscription record.
///
/// `secret_sealed` is the encryption envelope of the webhook MAC secret;
/// `config` is the trigger configuration serialized as JSONB.
#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub base_id: String,
    pub table_id: String,
    pub webhook_id: Option<String>,
    pub secret_sealed: Option<String>,
    pub last_cursor: i64,
    pub config: sqlx::types::JsonValue,
    pub expiration_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
