// In-memory implementations for examples and testing
//
// These implementations keep all data in memory, making them perfect for:
// - Standalone examples that don't need a database or network
// - Unit tests
// - Quick prototyping

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{FeedError, Result};
use crate::subscription::Subscription;
use crate::traits::{Method, SubscriptionStore, Transport};

// ============================================================================
// InMemorySubscriptionStore - Stores subscription records in memory
// ============================================================================

/// In-memory subscription store
///
/// Stores subscription records in a HashMap keyed by local id.
#[derive(Debug, Default, Clone)]
pub struct InMemorySubscriptionStore {
    subscriptions: Arc<RwLock<HashMap<Uuid, Subscription>>>,
}

impl InMemorySubscriptionStore {
    /// Create a new in-memory subscription store
    pub fn new() -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Pre-populate with a subscription (useful for testing)
    pub async fn seed(&self, subscription: Subscription) {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription);
    }

    /// Clear all subscriptions
    pub async fn clear(&self) {
        self.subscriptions.write().await.clear();
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn get(&self, id: Uuid) -> Result<Option<Subscription>> {
        Ok(self.subscriptions.read().await.get(&id).cloned())
    }

    async fn find_by_webhook(
        &self,
        base_id: &str,
        webhook_id: &str,
    ) -> Result<Option<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| {
                s.base_id == base_id && s.webhook_id.as_deref() == Some(webhook_id)
            })
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Subscription>> {
        Ok(self.subscriptions.read().await.values().cloned().collect())
    }

    async fn upsert(&self, subscription: &Subscription) -> Result<()> {
        self.subscriptions
            .write()
            .await
            .insert(subscription.id, subscription.clone());
        Ok(())
    }

    async fn advance_cursor(&self, id: Uuid, cursor: i64) -> Result<i64> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(&id)
            .ok_or_else(|| FeedError::store(format!("Subscription not found: {}", id)))?;

        // Advance-only: a stale caller can never move the cursor backwards
        subscription.last_cursor = subscription.last_cursor.max(cursor);
        subscription.updated_at = chrono::Utc::now();
        Ok(subscription.last_cursor)
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        Ok(self.subscriptions.write().await.remove(&id).is_some())
    }
}

// ============================================================================
// StaticTransport - Scripted transport for testing
// ============================================================================

/// A request issued through a `StaticTransport`, recorded for assertions
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Scripted transport for testing
///
/// Returns queued responses in order and records every issued request.
/// An exhausted script surfaces as a transport error, which conveniently
/// doubles as a forced-failure fixture.
#[derive(Debug, Default, Clone)]
pub struct StaticTransport {
    responses: Arc<RwLock<VecDeque<std::result::Result<Value, String>>>>,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
}

impl StaticTransport {
    /// Create a transport with an empty script (every request fails)
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful JSON response
    pub async fn push_response(&self, response: Value) {
        self.responses.write().await.push_back(Ok(response));
    }

    /// Queue a transport failure
    pub async fn push_error(&self, message: impl Into<String>) {
        self.responses.write().await.push_back(Err(message.into()));
    }

    /// All requests issued so far
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// The most recent request issued
    pub async fn last_request(&self) -> Option<RecordedRequest> {
        self.requests.read().await.last().cloned()
    }
}

#[async_trait]
impl Transport for StaticTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        self.requests.write().await.push(RecordedRequest {
            method,
            path: path.to_string(),
            query: query.to_vec(),
            body: body.cloned(),
        });

        match self.responses.write().await.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(FeedError::transport(message)),
            None => Err(FeedError::transport(format!(
                "No scripted response for {} {}",
                method.as_str(),
                path
            ))),
        }
    }
}
