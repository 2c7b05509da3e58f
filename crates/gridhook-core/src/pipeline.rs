// Ping processing pipeline
//
// Orchestrates one inbound ping end to end: validate the ping shape, resolve
// the subscription, fetch new payloads, normalize them in cursor order, and
// commit the advanced cursor. Strictly sequential; each step suspends on I/O.
//
// Failure posture: nothing here raises to the caller. A malformed or unknown
// ping is ignored; any failure after that point degrades to a fallback
// outcome carrying the original raw ping body, with the cursor untouched so
// the failed range is retried on the next ping.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::events::ChangeEvent;
use crate::fetcher;
use crate::normalizer::{self, NormalizeOptions};
use crate::traits::{SubscriptionStore, Transport};

/// Parsed inbound ping body: `{base: {id}, webhook: {id}, timestamp}`.
/// Anything else is malformed and ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Ping {
    pub base: PingRef,
    pub webhook: PingRef,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingRef {
    pub id: String,
}

impl Ping {
    /// Parse a raw ping body; `None` when the required shape is missing
    pub fn parse(body: &Value) -> Option<Self> {
        serde_json::from_value::<Ping>(body.clone())
            .ok()
            .filter(|p| !p.base.id.is_empty() && !p.webhook.id.is_empty())
    }
}

/// Result of processing one ping
#[derive(Debug, Clone)]
pub enum PingOutcome {
    /// Malformed ping or no matching subscription: emit nothing, succeed
    Ignored,

    /// The normalized batch; empty when the fetched range held nothing
    /// relevant (the cursor still advanced)
    Events(Vec<ChangeEvent>),

    /// Exactly one diagnostic item carrying the original raw ping body;
    /// the cursor was left untouched
    Fallback(Value),
}

impl PingOutcome {
    pub fn is_ignored(&self) -> bool {
        matches!(self, PingOutcome::Ignored)
    }

    /// The emitted events, if any
    pub fn events(&self) -> &[ChangeEvent] {
        match self {
            PingOutcome::Events(events) => events,
            _ => &[],
        }
    }
}

/// Per-subscription mutual exclusion.
///
/// The host may dispatch pings for the same subscription concurrently; the
/// subscription record is the only shared mutable state, so processing is
/// serialized per subscription id. Distinct subscriptions proceed in
/// parallel.
#[derive(Debug, Default, Clone)]
struct SubscriptionLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl SubscriptionLocks {
    async fn acquire(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Processes inbound pings into normalized event batches
pub struct PingPipeline<T, S>
where
    T: Transport,
    S: SubscriptionStore,
{
    transport: T,
    store: S,
    locks: SubscriptionLocks,
}

impl<T, S> PingPipeline<T, S>
where
    T: Transport,
    S: SubscriptionStore,
{
    pub fn new(transport: T, store: S) -> Self {
        Self {
            transport,
            store,
            locks: SubscriptionLocks::default(),
        }
    }

    /// Get reference to the subscription store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Process one inbound ping to completion.
    ///
    /// Never returns an error: see the module header for the failure posture.
    pub async fn handle_ping(&self, raw_body: Value) -> PingOutcome {
        // Validating
        let Some(ping) = Ping::parse(&raw_body) else {
            tracing::debug!("Ignoring malformed ping");
            return PingOutcome::Ignored;
        };

        let subscription_id = match self
            .store
            .find_by_webhook(&ping.base.id, &ping.webhook.id)
            .await
        {
            Ok(Some(subscription)) => subscription.id,
            Ok(None) => {
                tracing::debug!(
                    base_id = %ping.base.id,
                    webhook_id = %ping.webhook.id,
                    "Ignoring ping for unknown subscription"
                );
                return PingOutcome::Ignored;
            }
            Err(e) => {
                tracing::error!("Subscription lookup failed: {}", e);
                return PingOutcome::Fallback(raw_body);
            }
        };

        let _guard = self.locks.acquire(subscription_id).await;

        // Re-read under the lock: a concurrent ping may have advanced the
        // cursor while this one waited
        let subscription = match self.store.get(subscription_id).await {
            Ok(Some(subscription)) => subscription,
            Ok(None) => {
                tracing::debug!(%subscription_id, "Subscription vanished before processing");
                return PingOutcome::Ignored;
            }
            Err(e) => {
                tracing::error!("Subscription re-read failed: {}", e);
                return PingOutcome::Fallback(raw_body);
            }
        };

        // Fetching
        let outcome = match fetcher::fetch_new(&self.transport, &subscription).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(%subscription_id, "Payload fetch failed: {}", e);
                return PingOutcome::Fallback(raw_body);
            }
        };

        // Normalizing: payloads arrive in ascending cursor order
        let options = NormalizeOptions::from_subscription(&subscription);
        let mut events = Vec::new();
        for payload in &outcome.payloads {
            events.extend(normalizer::normalize(payload, &options));
        }

        // Committing: unconditional once normalization succeeded, even for an
        // empty batch. A payload holding only irrelevant-table changes still
        // advances the cursor and is never re-fetched.
        if let Some(new_cursor) = outcome.new_cursor {
            match self.store.advance_cursor(subscription_id, new_cursor).await {
                Ok(stored) => {
                    tracing::debug!(%subscription_id, cursor = stored, "Committed cursor");
                }
                Err(e) => {
                    tracing::error!(%subscription_id, "Cursor commit failed: {}", e);
                    return PingOutcome::Fallback(raw_body);
                }
            }
        }

        tracing::info!(
            %subscription_id,
            payloads = outcome.payloads.len(),
            events = events.len(),
            "Processed ping"
        );
        PingOutcome::Events(events)
    }
}
