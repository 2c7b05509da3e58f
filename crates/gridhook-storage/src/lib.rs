// Durable subscription storage
//
// Postgres-backed implementation of the core SubscriptionStore trait, plus
// at-rest sealing of the webhook MAC secret.

pub mod models;
pub mod repositories;
pub mod secret;
pub mod subscription_store;

pub use repositories::Database;
pub use secret::SecretCipher;
pub use subscription_store::PgSubscriptionStore;
