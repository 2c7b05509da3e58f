// Gridhook API server
// Decision: one process serves both the notification endpoint and the
// subscription management routes; the feed itself holds no other state

mod common;
mod notifications;
mod subscriptions;

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use gridhook_airtable::AirtableTransport;
use gridhook_core::{PingPipeline, SubscriptionLifecycle};
use gridhook_storage::{Database, PgSubscriptionStore, SecretCipher};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    verify_pings: bool,
}

/// State for health endpoint
#[derive(Clone)]
struct HealthState {
    verify_pings: bool,
}

async fn health(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        verify_pings: state.verify_pings,
    })
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        notifications::receive_ping,
        subscriptions::create_subscription,
        subscriptions::list_subscriptions,
        subscriptions::get_subscription,
        subscriptions::refresh_subscription,
        subscriptions::deactivate_subscription,
    ),
    components(
        schemas(
            notifications::PingResponse,
            subscriptions::CreateSubscriptionRequest,
            subscriptions::SubscriptionView,
            subscriptions::RefreshResponse,
            subscriptions::DeactivateResponse,
            common::ListResponse<subscriptions::SubscriptionView>,
        )
    ),
    tags(
        (name = "notifications", description = "Inbound change-notification endpoint"),
        (name = "subscriptions", description = "Change-feed subscription management")
    ),
    info(
        title = "Gridhook API",
        version = "0.3.0",
        description = "Webhook ingestion service turning table-database change pings into normalized event batches",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gridhook_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("gridhook-api starting...");

    // Initialize database
    let database_url =
        std::env::var("DATABASE_URL").context("DATABASE_URL environment variable required")?;
    let db = Database::from_url(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    tracing::info!("Connected to database");

    // Secret sealing for the webhook MAC secret at rest
    let cipher = SecretCipher::from_env().context("Failed to initialize secret sealing")?;
    let store = PgSubscriptionStore::new(db, cipher);

    // Outbound transport to the table-database API
    let transport = AirtableTransport::from_env().map_err(|e| anyhow::anyhow!("{}", e))?;

    // The externally-reachable URL registered as the notification target
    let notification_url = std::env::var("GRIDHOOK_NOTIFICATION_URL")
        .context("GRIDHOOK_NOTIFICATION_URL environment variable required")?;

    let verify_pings = std::env::var("GRIDHOOK_VERIFY_PINGS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    tracing::info!(verify_pings, "Ping MAC verification configured");

    // Create module-specific states
    let pipeline = Arc::new(PingPipeline::new(transport.clone(), store.clone()));
    let lifecycle = Arc::new(SubscriptionLifecycle::new(
        transport,
        store.clone(),
        notification_url,
    ));

    let notifications_state = notifications::AppState {
        pipeline,
        store: store.clone(),
        verify_pings,
    };
    let subscriptions_state = subscriptions::AppState { lifecycle, store };
    let health_state = HealthState { verify_pings };

    // Build API routes
    let api_routes = Router::new()
        .merge(notifications::routes(notifications_state))
        .merge(subscriptions::routes(subscriptions_state));

    // Load API prefix from environment (default: empty)
    // Example: API_PREFIX="/api" results in routes like /api/v1/notifications
    let api_prefix = std::env::var("API_PREFIX").unwrap_or_default();
    if !api_prefix.is_empty() {
        tracing::info!(prefix = %api_prefix, "API prefix configured");
    }

    let app = Router::new()
        .route("/health", get(health).with_state(health_state))
        .merge(build_router_with_prefix(api_routes, &api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr =
        std::env::var("GRIDHOOK_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:9100".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}
