// Core traits for pluggable backends
//
// These traits allow the change feed to be used with different backends:
// - In-memory implementations for examples and testing
// - reqwest/Postgres implementations for production

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::subscription::Subscription;

// ============================================================================
// Transport - Authenticated request/response to the table-database API
// ============================================================================

/// HTTP method of an outbound API request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Trait for the authenticated transport to the table-database API.
///
/// Transport-level failures (network, non-success HTTP status, malformed
/// JSON response) all surface as `FeedError::Transport`; the core does not
/// distinguish them. Retry/backoff is the implementation's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request and return the decoded JSON response body
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value>;
}

// ============================================================================
// SubscriptionStore - Durable storage for the subscription record
// ============================================================================

/// Trait for storing the durable subscription record.
///
/// Implementations can:
/// - Persist records in a database
/// - Keep records in memory for testing
///
/// The store owns the cursor-monotonicity invariant: `advance_cursor` never
/// moves a cursor backwards, regardless of what the caller passes.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Load a subscription by local id
    async fn get(&self, id: Uuid) -> Result<Option<Subscription>>;

    /// Resolve an inbound ping's `(base, webhook)` pair to a subscription
    async fn find_by_webhook(
        &self,
        base_id: &str,
        webhook_id: &str,
    ) -> Result<Option<Subscription>>;

    /// List all subscriptions
    async fn list(&self) -> Result<Vec<Subscription>>;

    /// Insert or fully replace a subscription record
    async fn upsert(&self, subscription: &Subscription) -> Result<()>;

    /// Advance the cursor high-water mark, never backwards.
    /// Returns the cursor value actually stored.
    async fn advance_cursor(&self, id: Uuid, cursor: i64) -> Result<i64>;

    /// Remove a subscription record entirely. Returns whether it existed.
    async fn remove(&self, id: Uuid) -> Result<bool>;
}
