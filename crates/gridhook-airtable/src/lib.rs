// Airtable Transport Implementation
//
// This crate provides the Airtable implementation of the Transport trait
// from gridhook-core, enabling the change feed to talk to the Airtable
// webhooks API (create/list/delete webhooks, read the payload log).

mod transport;

pub use transport::AirtableTransport;

// Re-export core types for convenience
pub use gridhook_core::{Method, Transport};
