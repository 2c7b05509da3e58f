// Notification endpoint
//
// This is the URL registered with the service at subscription creation. The
// handler takes the raw body because MAC verification must run over the
// exact bytes the service signed, before any JSON round-trip.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use utoipa::ToSchema;

use gridhook_airtable::AirtableTransport;
use gridhook_core::{signature, ChangeEvent, Ping, PingOutcome, PingPipeline, SubscriptionStore};
use gridhook_storage::PgSubscriptionStore;

/// App state for the notification route
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PingPipeline<AirtableTransport, PgSubscriptionStore>>,
    pub store: PgSubscriptionStore,
    /// When set, pings failing MAC verification are rejected with 401
    pub verify_pings: bool,
}

/// Result of one delivered ping
#[derive(Debug, Serialize, ToSchema)]
pub struct PingResponse {
    /// One of `ignored`, `events`, `fallback`, `rejected`
    #[schema(example = "events")]
    pub outcome: &'static str,
    /// Normalized change events, in batch order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[schema(value_type = Vec<Object>)]
    pub events: Vec<ChangeEvent>,
    /// The original raw ping body, present only on fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub fallback: Option<Value>,
}

impl PingResponse {
    fn ignored() -> Self {
        Self {
            outcome: "ignored",
            events: Vec::new(),
            fallback: None,
        }
    }

    fn rejected() -> Self {
        Self {
            outcome: "rejected",
            events: Vec::new(),
            fallback: None,
        }
    }
}

/// Create the notification route
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/notifications", post(receive_ping))
        .with_state(state)
}

/// POST /v1/notifications - Receive a change-notification ping
#[utoipa::path(
    post,
    path = "/v1/notifications",
    request_body = Object,
    responses(
        (status = 200, description = "Ping processed (or ignored)", body = PingResponse),
        (status = 401, description = "MAC verification failed")
    ),
    tag = "notifications"
)]
pub async fn receive_ping(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<PingResponse>) {
    let Ok(raw_body) = serde_json::from_slice::<Value>(&body) else {
        tracing::debug!("Ignoring non-JSON ping body");
        return (StatusCode::OK, Json(PingResponse::ignored()));
    };

    if state.verify_pings && !verify(&state, &headers, &raw_body, &body).await {
        return (StatusCode::UNAUTHORIZED, Json(PingResponse::rejected()));
    }

    let response = match state.pipeline.handle_ping(raw_body).await {
        PingOutcome::Ignored => PingResponse::ignored(),
        PingOutcome::Events(events) => PingResponse {
            outcome: "events",
            events,
            fallback: None,
        },
        PingOutcome::Fallback(raw) => PingResponse {
            outcome: "fallback",
            events: Vec::new(),
            fallback: Some(raw),
        },
    };

    (StatusCode::OK, Json(response))
}

/// Check the ping's MAC against the subscription's stored secret.
///
/// Pings that cannot be attributed to a subscription pass through: the
/// pipeline ignores them anyway, and rejecting them would leak which
/// webhook ids exist. A subscription without a stored secret also passes,
/// with a warning, so enabling verification cannot strand old records.
async fn verify(state: &AppState, headers: &HeaderMap, raw_body: &Value, body: &[u8]) -> bool {
    let Some(ping) = Ping::parse(raw_body) else {
        return true;
    };

    let subscription = match state
        .store
        .find_by_webhook(&ping.base.id, &ping.webhook.id)
        .await
    {
        Ok(Some(subscription)) => subscription,
        Ok(None) => return true,
        Err(e) => {
            tracing::error!("Subscription lookup failed during verification: {}", e);
            return true;
        }
    };

    let Some(secret) = subscription.secret.as_deref() else {
        tracing::warn!(
            subscription_id = %subscription.id,
            "Verification enabled but subscription has no stored secret"
        );
        return true;
    };

    let Some(mac) = headers
        .get(signature::MAC_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        tracing::warn!(subscription_id = %subscription.id, "Ping is missing the MAC header");
        return false;
    };

    let verified = signature::verify_ping_mac(secret, mac, body);
    if !verified {
        tracing::warn!(subscription_id = %subscription.id, "Ping MAC verification failed");
    }
    verified
}
