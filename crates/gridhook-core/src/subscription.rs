// Subscription entity
//
// The Subscription is the one durable record per configured trigger instance.
// It is created at activation, mutated only by advancing `last_cursor`, and
// fully cleared at deactivation. `last_cursor` owns the invariant that it
// never moves backwards; stores enforce advance-only commits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TriggerConfig;

/// Sentinel cursor value meaning "no payload processed yet".
///
/// Not a valid cursor: the payload-log request must omit the cursor
/// parameter entirely when the subscription is at this value.
pub const CURSOR_SENTINEL: i64 = 0;

/// Durable subscription record for one watched table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Local identity (UUID v7)
    pub id: Uuid,

    /// Base containing the watched table; immutable after creation
    pub base_id: String,

    /// Watched table; immutable after creation
    pub table_id: String,

    /// Opaque identifier assigned by the service at creation.
    /// `None` only after teardown.
    pub webhook_id: Option<String>,

    /// Base64-encoded MAC secret returned at creation, used to verify
    /// inbound ping authenticity. Sealed at rest by the storage layer.
    pub secret: Option<String>,

    /// Highest payload cursor fully processed; `CURSOR_SENTINEL` until the
    /// first successful batch. Monotonically non-decreasing.
    pub last_cursor: i64,

    /// Creation-time configuration, echoed into the filter request and
    /// retained for reference
    pub config: TriggerConfig,

    /// Service-reported expiry of the webhook, refreshed periodically
    pub expiration_time: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a fresh subscription record for a newly registered webhook
    pub fn new(
        base_id: impl Into<String>,
        config: TriggerConfig,
        webhook_id: impl Into<String>,
        secret: Option<String>,
        expiration_time: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            base_id: base_id.into(),
            table_id: config.table_id.clone(),
            webhook_id: Some(webhook_id.into()),
            secret,
            last_cursor: CURSOR_SENTINEL,
            config,
            expiration_time,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any payload has ever been processed for this subscription
    pub fn has_processed(&self) -> bool {
        self.last_cursor != CURSOR_SENTINEL
    }

    /// Clear every service-assigned field after teardown.
    ///
    /// The record keeps its identity and configuration so a later
    /// reactivation can recreate the feed from the same settings.
    pub fn clear_registration(&mut self) {
        self.webhook_id = None;
        self.secret = None;
        self.last_cursor = CURSOR_SENTINEL;
        self.expiration_time = None;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_subscription_starts_at_sentinel() {
        let config = TriggerConfig::new("tblXYZ");
        let sub = Subscription::new("appABC", config, "achWebhook1", None, None);

        assert_eq!(sub.last_cursor, CURSOR_SENTINEL);
        assert!(!sub.has_processed());
        assert_eq!(sub.table_id, "tblXYZ");
        assert_eq!(sub.webhook_id.as_deref(), Some("achWebhook1"));
    }

    #[test]
    fn clear_registration_resets_service_fields() {
        let config = TriggerConfig::new("tblXYZ");
        let mut sub = Subscription::new(
            "appABC",
            config,
            "achWebhook1",
            Some("c2VjcmV0".to_string()),
            None,
        );
        sub.last_cursor = 42;

        sub.clear_registration();

        assert!(sub.webhook_id.is_none());
        assert!(sub.secret.is_none());
        assert_eq!(sub.last_cursor, CURSOR_SENTINEL);
        // Identity and configuration survive teardown
        assert_eq!(sub.base_id, "appABC");
        assert_eq!(sub.table_id, "tblXYZ");
    }
}
