// Subscription management HTTP routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use gridhook_airtable::AirtableTransport;
use gridhook_core::{
    ChangeSource, ChangeType, Subscription, SubscriptionLifecycle, SubscriptionStore,
    TriggerConfig, WatchDataType,
};
use gridhook_storage::PgSubscriptionStore;

use crate::common::ListResponse;

/// App state for subscription routes
#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<SubscriptionLifecycle<AirtableTransport, PgSubscriptionStore>>,
    pub store: PgSubscriptionStore,
}

/// Request to activate a change-feed subscription
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    /// Base containing the watched table.
    #[schema(example = "appEhx2Lv7YVWjDmp")]
    pub base_id: String,
    /// Table whose changes are delivered.
    #[schema(example = "tblFWyRGs7hMZWnxF")]
    pub table_id: String,
    /// Change categories to watch; defaults to record data only.
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>, example = json!(["tableData"]))]
    pub data_types: Option<Vec<WatchDataType>>,
    /// Change kinds to deliver; omitted means the service default (all).
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>, example = json!(["update"]))]
    pub change_types: Option<Vec<ChangeType>>,
    /// Restrict cell-data watching to these fields.
    #[serde(default)]
    pub watch_field_ids: Option<Vec<String>>,
    /// Restrict schema watching to these fields.
    #[serde(default)]
    pub watch_schema_field_ids: Option<Vec<String>>,
    /// Fields whose values are attached to every record event as context.
    #[serde(default)]
    pub include_field_ids: Option<Vec<String>>,
    /// Originating channels to include; omitted means all.
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>, example = json!(["client"]))]
    pub from_sources: Option<Vec<ChangeSource>>,
    /// Per-source filter options as a raw JSON object string.
    #[serde(default)]
    pub source_options_json: Option<String>,
    /// Ask the service to include prior cell values in payloads.
    #[serde(default)]
    pub include_previous_values: bool,
}

impl CreateSubscriptionRequest {
    fn into_parts(self) -> (String, TriggerConfig) {
        let config = TriggerConfig {
            table_id: self.table_id,
            data_types: self
                .data_types
                .unwrap_or_else(|| vec![WatchDataType::TableData]),
            change_types: self.change_types.unwrap_or_default(),
            watch_field_ids: self.watch_field_ids,
            watch_schema_field_ids: self.watch_schema_field_ids,
            include_field_ids: self.include_field_ids,
            from_sources: self.from_sources.unwrap_or_default(),
            source_options_json: self.source_options_json,
            include_previous_values: self.include_previous_values,
        };
        (self.base_id, config)
    }
}

/// Public view of a subscription. Never carries the MAC secret.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionView {
    pub id: Uuid,
    pub base_id: String,
    pub table_id: String,
    /// Service-assigned webhook id; unset after teardown
    pub webhook_id: Option<String>,
    /// Highest payload cursor fully processed; 0 means nothing yet
    pub last_cursor: i64,
    /// Whether the feed is currently registered at the service
    pub active: bool,
    pub expiration_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Subscription> for SubscriptionView {
    fn from(sub: Subscription) -> Self {
        Self {
            id: sub.id,
            base_id: sub.base_id,
            table_id: sub.table_id,
            active: sub.webhook_id.is_some(),
            webhook_id: sub.webhook_id,
            last_cursor: sub.last_cursor,
            expiration_time: sub.expiration_time,
            created_at: sub.created_at,
            updated_at: sub.updated_at,
        }
    }
}

/// Response to a refresh request
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    /// New expiry reported by the service; unset when the refresh failed
    pub expiration_time: Option<DateTime<Utc>>,
}

/// Response to a deactivation request
#[derive(Debug, Serialize, ToSchema)]
pub struct DeactivateResponse {
    /// Whether the service-side teardown succeeded. `false` is non-fatal:
    /// the record is kept so deactivation can be retried.
    pub torn_down: bool,
}

/// Create subscription routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/subscriptions",
            post(create_subscription).get(list_subscriptions),
        )
        .route(
            "/v1/subscriptions/:subscription_id",
            get(get_subscription).delete(deactivate_subscription),
        )
        .route(
            "/v1/subscriptions/:subscription_id/refresh",
            post(refresh_subscription),
        )
        .with_state(state)
}

/// POST /v1/subscriptions - Activate a change feed
#[utoipa::path(
    post,
    path = "/v1/subscriptions",
    request_body = CreateSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionView),
        (status = 502, description = "The service rejected the specification"),
        (status = 500, description = "Internal server error")
    ),
    tag = "subscriptions"
)]
pub async fn create_subscription(
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionView>), StatusCode> {
    let (base_id, config) = req.into_parts();

    let subscription = state.lifecycle.create(&base_id, config).await.map_err(|e| {
        tracing::error!("Failed to create subscription: {}", e);
        match e {
            gridhook_core::FeedError::Creation(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    })?;

    Ok((StatusCode::CREATED, Json(subscription.into())))
}

/// GET /v1/subscriptions - List subscriptions
#[utoipa::path(
    get,
    path = "/v1/subscriptions",
    responses(
        (status = 200, description = "List of subscriptions", body = ListResponse<SubscriptionView>),
        (status = 500, description = "Internal server error")
    ),
    tag = "subscriptions"
)]
pub async fn list_subscriptions(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<SubscriptionView>>, StatusCode> {
    let subscriptions = state.store.list().await.map_err(|e| {
        tracing::error!("Failed to list subscriptions: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ListResponse::new(
        subscriptions.into_iter().map(Into::into).collect(),
    )))
}

/// GET /v1/subscriptions/{subscription_id} - Get subscription
#[utoipa::path(
    get,
    path = "/v1/subscriptions/{subscription_id}",
    params(
        ("subscription_id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Subscription found", body = SubscriptionView),
        (status = 404, description = "Subscription not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "subscriptions"
)]
pub async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<SubscriptionView>, StatusCode> {
    let subscription = state
        .store
        .get(subscription_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load subscription: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(subscription.into()))
}

/// POST /v1/subscriptions/{subscription_id}/refresh - Extend the webhook's life
#[utoipa::path(
    post,
    path = "/v1/subscriptions/{subscription_id}/refresh",
    params(
        ("subscription_id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Refresh attempted", body = RefreshResponse),
        (status = 404, description = "Subscription not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "subscriptions"
)]
pub async fn refresh_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<RefreshResponse>, StatusCode> {
    let subscription = state
        .store
        .get(subscription_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load subscription: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    // Fail-open: a failed refresh reports an unset expiry, never an error
    let expiration_time = state.lifecycle.refresh(&subscription).await;
    Ok(Json(RefreshResponse { expiration_time }))
}

/// DELETE /v1/subscriptions/{subscription_id} - Deactivate a change feed
#[utoipa::path(
    delete,
    path = "/v1/subscriptions/{subscription_id}",
    params(
        ("subscription_id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Deactivation attempted", body = DeactivateResponse),
        (status = 404, description = "Subscription not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "subscriptions"
)]
pub async fn deactivate_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<DeactivateResponse>, StatusCode> {
    let subscription = state
        .store
        .get(subscription_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load subscription: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    let torn_down = state.lifecycle.delete(&subscription).await;
    if torn_down {
        if let Err(e) = state.store.remove(subscription_id).await {
            tracing::warn!("Failed to remove deactivated subscription record: {}", e);
        }
    }

    Ok(Json(DeactivateResponse { torn_down }))
}
