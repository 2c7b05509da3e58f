// Subscription lifecycle management
//
// Creates, verifies, refreshes and tears down the change-feed subscription
// against the external service, and owns the durable subscription record.
// Runs at setup/teardown time, not on the hot path.
//
// Failure posture: everything here is fail-open. The existence check treats
// transport failure as "does not exist" so activation can recreate a feed;
// deletion reports failure as a boolean so workflow deactivation is never
// blocked; refresh failure leaves the subscription untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{TriggerConfig, WebhookSpecification};
use crate::error::{FeedError, Result};
use crate::subscription::Subscription;
use crate::traits::{Method, SubscriptionStore, Transport};

/// Manages the feed subscription's lifetime against the external service
pub struct SubscriptionLifecycle<T, S>
where
    T: Transport,
    S: SubscriptionStore,
{
    transport: T,
    store: S,
    /// Externally-reachable URL registered as the notification target
    notification_url: String,
}

impl<T, S> SubscriptionLifecycle<T, S>
where
    T: Transport,
    S: SubscriptionStore,
{
    pub fn new(transport: T, store: S, notification_url: impl Into<String>) -> Self {
        Self {
            transport,
            store,
            notification_url: notification_url.into(),
        }
    }

    /// Whether the subscription's webhook is still registered at the service.
    ///
    /// Any transport or decode failure reads as "does not exist": recreating
    /// a feed that was actually alive is recoverable, while skipping
    /// recreation of a dead one is not.
    pub async fn exists(&self, subscription: &Subscription) -> bool {
        let Some(webhook_id) = subscription.webhook_id.as_deref() else {
            return false;
        };

        let path = format!("/bases/{}/webhooks", subscription.base_id);
        let response = match self.transport.request(Method::Get, &path, &[], None).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Webhook existence check failed: {}", e);
                return false;
            }
        };

        match serde_json::from_value::<ListWebhooksResponse>(response) {
            Ok(list) => list.webhooks.iter().any(|w| w.id == webhook_id),
            Err(e) => {
                tracing::warn!("Malformed webhook list: {}", e);
                false
            }
        }
    }

    /// Register a new webhook and persist the fresh subscription record.
    ///
    /// The filter specification is built from the configuration as-is; the
    /// service validates filter semantics, not this side.
    pub async fn create(&self, base_id: &str, config: TriggerConfig) -> Result<Subscription> {
        let request = CreateWebhookRequest {
            notification_url: self.notification_url.clone(),
            specification: config.build_specification(),
        };
        let body = serde_json::to_value(&request)
            .map_err(|e| FeedError::creation(e.to_string()))?;

        let path = format!("/bases/{}/webhooks", base_id);
        let response = self
            .transport
            .request(Method::Post, &path, &[], Some(&body))
            .await
            .map_err(|e| FeedError::creation(e.to_string()))?;

        let created: CreateWebhookResponse = serde_json::from_value(response)
            .map_err(|e| FeedError::creation(format!("Malformed creation response: {}", e)))?;

        let subscription = Subscription::new(
            base_id,
            config,
            created.id,
            created.mac_secret_base64,
            created.expiration_time,
        );
        self.store.upsert(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            webhook_id = ?subscription.webhook_id,
            base_id,
            "Created change-feed subscription"
        );
        Ok(subscription)
    }

    /// Tear down the webhook and clear the durable record's service fields.
    ///
    /// A subscription with no webhook id is already torn down: no-op success.
    /// Transport failure returns `false` and leaves the record untouched so
    /// a later deactivation attempt can retry.
    pub async fn delete(&self, subscription: &Subscription) -> bool {
        if let Some(webhook_id) = subscription.webhook_id.as_deref() {
            let path = format!(
                "/bases/{}/webhooks/{}",
                subscription.base_id, webhook_id
            );
            if let Err(e) = self.transport.request(Method::Delete, &path, &[], None).await {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    "Webhook teardown failed: {}",
                    e
                );
                return false;
            }
        }

        let mut cleared = subscription.clone();
        cleared.clear_registration();
        if let Err(e) = self.store.upsert(&cleared).await {
            tracing::warn!(
                subscription_id = %subscription.id,
                "Failed to persist cleared subscription: {}",
                e
            );
            return false;
        }
        true
    }

    /// Extend the webhook's life at the service; returns the new expiry.
    ///
    /// Fail-open: `None` on any failure, subscription untouched.
    pub async fn refresh(&self, subscription: &Subscription) -> Option<DateTime<Utc>> {
        let webhook_id = subscription.webhook_id.as_deref()?;
        let path = format!(
            "/bases/{}/webhooks/{}/refresh",
            subscription.base_id, webhook_id
        );

        let response = match self.transport.request(Method::Post, &path, &[], None).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(subscription_id = %subscription.id, "Webhook refresh failed: {}", e);
                return None;
            }
        };

        let refreshed: RefreshWebhookResponse = match serde_json::from_value(response) {
            Ok(refreshed) => refreshed,
            Err(e) => {
                tracing::warn!("Malformed refresh response: {}", e);
                return None;
            }
        };

        let mut updated = subscription.clone();
        updated.expiration_time = refreshed.expiration_time;
        updated.updated_at = Utc::now();
        if let Err(e) = self.store.upsert(&updated).await {
            tracing::warn!("Failed to persist refreshed expiry: {}", e);
            return None;
        }

        refreshed.expiration_time
    }
}

// ============================================================================
// Webhook API wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateWebhookRequest {
    notification_url: String,
    specification: WebhookSpecification,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWebhookResponse {
    id: String,
    #[serde(default)]
    mac_secret_base64: Option<String>,
    #[serde(default)]
    expiration_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ListWebhooksResponse {
    #[serde(default)]
    webhooks: Vec<WebhookSummary>,
}

#[derive(Debug, Deserialize)]
struct WebhookSummary {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshWebhookResponse {
    #[serde(default)]
    expiration_time: Option<DateTime<Utc>>,
}
