// Change Feed Abstraction
//
// This crate provides a backend-agnostic implementation of an incremental
// change-feed consumer for a hosted table-database service: the service
// delivers a lightweight "something changed" ping, and the real change data
// is read separately from an ordered, cursor-indexed payload log that can
// redeliver, gap, or arrive out of order.
//
// Key design decisions:
// - Uses traits (Transport, SubscriptionStore) for pluggable backends
// - Wire payloads are decoded into typed structs at the boundary
// - The pipeline never raises on the hot path: malformed pings are ignored,
//   failures degrade to a diagnostic fallback with the cursor untouched
// - The cursor high-water mark is advance-only; stores enforce it and the
//   pipeline serializes processing per subscription
// - Lifecycle operations (create/exists/refresh/delete) are fail-open so the
//   host's activation/deactivation flows never crash

pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod lifecycle;
pub mod normalizer;
pub mod payload;
pub mod pipeline;
pub mod signature;
pub mod subscription;
pub mod traits;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use config::{ChangeSource, ChangeType, TriggerConfig, WatchDataType, WebhookSpecification};
pub use error::{FeedError, Result};
pub use events::{ChangeEvent, ChangedBy, EventStamp, MetadataKey, SchemaAspect, SchemaChange};
pub use fetcher::{fetch_new, FetchOutcome};
pub use lifecycle::SubscriptionLifecycle;
pub use normalizer::{normalize, NormalizeOptions};
pub use payload::{RawPayload, TableChange};
pub use pipeline::{Ping, PingOutcome, PingPipeline};
pub use subscription::{Subscription, CURSOR_SENTINEL};
pub use traits::{Method, SubscriptionStore, Transport};
