// Cursor-tracked payload retrieval
//
// Given a subscription's last fully-processed cursor (an exclusive lower
// bound), retrieve every newer payload from the service's payload log, in
// ascending cursor order, and report the new high-water cursor.
//
// The service may redeliver entries at or below the last-seen cursor, omit
// the cursor field, or deliver out of order; all three are handled here so
// downstream normalization sees a clean, ordered, deduplicated batch.

use std::collections::HashMap;

use crate::error::{FeedError, Result};
use crate::payload::{PayloadListResponse, RawPayload};
use crate::subscription::{Subscription, CURSOR_SENTINEL};
use crate::traits::{Method, Transport};

/// Upper bound on continuation pages read per fetch. A single page is the
/// common case; the cap only guards against a service that never clears
/// `mightHaveMore`.
const MAX_PAGES: usize = 50;

/// Result of one payload-log read
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Retained payloads, ascending by cursor. Every entry has a cursor
    /// strictly greater than the subscription's `last_cursor`.
    pub payloads: Vec<RawPayload>,

    /// `max(cursor)` over the retained payloads; `None` when nothing new
    /// arrived, in which case the caller must not advance its cursor.
    pub new_cursor: Option<i64>,
}

impl FetchOutcome {
    fn empty() -> Self {
        Self {
            payloads: Vec::new(),
            new_cursor: None,
        }
    }
}

/// Retrieve all payloads newer than the subscription's high-water cursor
pub async fn fetch_new<T: Transport>(
    transport: &T,
    subscription: &Subscription,
) -> Result<FetchOutcome> {
    let webhook_id = subscription
        .webhook_id
        .as_deref()
        .ok_or_else(|| FeedError::fetch("Subscription has no registered webhook"))?;

    let path = format!(
        "/bases/{}/webhooks/{}/payloads",
        subscription.base_id, webhook_id
    );
    let last_cursor = subscription.last_cursor;

    let mut collected: Vec<RawPayload> = Vec::new();
    // The sentinel means "never processed": the request must omit the cursor
    // parameter entirely. Sending cursor=0 is NOT equivalent at the service.
    let mut page_cursor = (last_cursor != CURSOR_SENTINEL).then_some(last_cursor);

    for page in 0..MAX_PAGES {
        let query: Vec<(String, String)> = page_cursor
            .map(|c| vec![("cursor".to_string(), c.to_string())])
            .unwrap_or_default();

        let response = transport
            .request(Method::Get, &path, &query, None)
            .await
            .map_err(|e| FeedError::fetch(e.to_string()))?;

        let page_body: PayloadListResponse = serde_json::from_value(response)
            .map_err(|e| FeedError::fetch(format!("Malformed payload list: {}", e)))?;

        collected.extend(page_body.payloads);

        if !page_body.might_have_more {
            break;
        }
        match page_body.cursor {
            Some(next) => page_cursor = Some(next),
            None => {
                tracing::warn!(path = %path, "mightHaveMore set without a continuation cursor");
                break;
            }
        }
        if page + 1 == MAX_PAGES {
            tracing::warn!(path = %path, "Stopping payload read at page cap");
        }
    }

    let mut retained: Vec<RawPayload> = collected
        .into_iter()
        .filter(|p| matches!(p.cursor, Some(c) if c > last_cursor))
        .collect();

    if retained.is_empty() {
        tracing::debug!(last_cursor, "No new payloads");
        return Ok(FetchOutcome::empty());
    }

    warn_on_duplicate_cursors(&retained);

    // Delivery order is not trusted end-to-end; sort so normalization sees
    // ascending cursors, and take the max rather than the last element.
    retained.sort_by_key(|p| p.cursor);
    let new_cursor = retained.iter().filter_map(|p| p.cursor).max();

    tracing::debug!(
        count = retained.len(),
        new_cursor = ?new_cursor,
        last_cursor,
        "Retained new payloads"
    );

    Ok(FetchOutcome {
        payloads: retained,
        new_cursor,
    })
}

/// Two distinct payload bodies sharing a cursor indicate an upstream fault.
/// Both are passed through (retention is by lower bound, not uniqueness),
/// but the condition is surfaced rather than silently merged.
fn warn_on_duplicate_cursors(payloads: &[RawPayload]) {
    let mut seen: HashMap<i64, usize> = HashMap::new();
    for payload in payloads {
        if let Some(cursor) = payload.cursor {
            *seen.entry(cursor).or_insert(0) += 1;
        }
    }
    for (cursor, count) in seen {
        if count > 1 {
            tracing::warn!(cursor, count, "Duplicate cursor in payload batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TriggerConfig;
    use crate::memory::StaticTransport;
    use serde_json::json;

    fn subscription_at(cursor: i64) -> Subscription {
        let mut sub =
            Subscription::new("appA", TriggerConfig::new("tbl1"), "ach1", None, None);
        sub.last_cursor = cursor;
        sub
    }

    fn payload_json(cursor: i64) -> serde_json::Value {
        json!({"cursor": cursor, "timestamp": "2024-03-01T12:00:00.000Z"})
    }

    #[tokio::test]
    async fn sentinel_omits_cursor_parameter() {
        let transport = StaticTransport::new();
        transport
            .push_response(json!({"payloads": [payload_json(1)]}))
            .await;

        let outcome = fetch_new(&transport, &subscription_at(CURSOR_SENTINEL))
            .await
            .unwrap();

        let request = transport.last_request().await.unwrap();
        assert!(request.query.is_empty(), "sentinel must omit cursor param");
        assert_eq!(outcome.new_cursor, Some(1));
    }

    #[tokio::test]
    async fn nonzero_cursor_is_passed_through() {
        let transport = StaticTransport::new();
        transport.push_response(json!({"payloads": []})).await;

        fetch_new(&transport, &subscription_at(12)).await.unwrap();

        let request = transport.last_request().await.unwrap();
        assert_eq!(
            request.query,
            vec![("cursor".to_string(), "12".to_string())]
        );
    }

    #[tokio::test]
    async fn retains_only_cursors_above_lower_bound() {
        let transport = StaticTransport::new();
        transport
            .push_response(json!({"payloads": [
                payload_json(5),
                payload_json(7),
                payload_json(7),
                payload_json(9),
            ]}))
            .await;

        let outcome = fetch_new(&transport, &subscription_at(5)).await.unwrap();

        // Both entries at cursor 7 pass: dedup is by lower bound, not
        // uniqueness within the batch
        let cursors: Vec<i64> = outcome.payloads.iter().filter_map(|p| p.cursor).collect();
        assert_eq!(cursors, vec![7, 7, 9]);
        assert_eq!(outcome.new_cursor, Some(9));
    }

    #[tokio::test]
    async fn drops_entries_without_cursor() {
        let transport = StaticTransport::new();
        transport
            .push_response(json!({"payloads": [
                {"timestamp": "2024-03-01T12:00:00.000Z"},
                payload_json(8),
            ]}))
            .await;

        let outcome = fetch_new(&transport, &subscription_at(5)).await.unwrap();
        assert_eq!(outcome.payloads.len(), 1);
        assert_eq!(outcome.new_cursor, Some(8));
    }

    #[tokio::test]
    async fn empty_result_reports_no_new_cursor() {
        let transport = StaticTransport::new();
        transport
            .push_response(json!({"payloads": [payload_json(3), payload_json(5)]}))
            .await;

        let outcome = fetch_new(&transport, &subscription_at(5)).await.unwrap();
        assert!(outcome.payloads.is_empty());
        assert_eq!(outcome.new_cursor, None);
    }

    #[tokio::test]
    async fn out_of_order_delivery_is_sorted_and_max_taken() {
        let transport = StaticTransport::new();
        transport
            .push_response(json!({"payloads": [
                payload_json(9),
                payload_json(7),
                payload_json(8),
            ]}))
            .await;

        let outcome = fetch_new(&transport, &subscription_at(6)).await.unwrap();
        let cursors: Vec<i64> = outcome.payloads.iter().filter_map(|p| p.cursor).collect();
        assert_eq!(cursors, vec![7, 8, 9]);
        assert_eq!(outcome.new_cursor, Some(9));
    }

    #[tokio::test]
    async fn follows_continuation_pages() {
        let transport = StaticTransport::new();
        transport
            .push_response(json!({
                "payloads": [payload_json(6)],
                "cursor": 7,
                "mightHaveMore": true
            }))
            .await;
        transport
            .push_response(json!({"payloads": [payload_json(7)]}))
            .await;

        let outcome = fetch_new(&transport, &subscription_at(5)).await.unwrap();

        let requests = transport.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].query,
            vec![("cursor".to_string(), "7".to_string())]
        );
        let cursors: Vec<i64> = outcome.payloads.iter().filter_map(|p| p.cursor).collect();
        assert_eq!(cursors, vec![6, 7]);
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_fetch_error() {
        let transport = StaticTransport::new();
        transport.push_error("connection refused").await;

        let result = fetch_new(&transport, &subscription_at(5)).await;
        assert!(matches!(result, Err(FeedError::Fetch(_))));
    }

    #[tokio::test]
    async fn unregistered_subscription_cannot_fetch() {
        let transport = StaticTransport::new();
        let mut sub = subscription_at(5);
        sub.webhook_id = None;

        let result = fetch_new(&transport, &sub).await;
        assert!(matches!(result, Err(FeedError::Fetch(_))));
        assert!(transport.requests().await.is_empty());
    }
}
