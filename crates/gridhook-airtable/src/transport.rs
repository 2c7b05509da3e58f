// Airtable Web API transport
//
// Implements the core Transport trait with reqwest. The core builds the
// paths; this side owns authentication, the base URL, and the collapse of
// network / HTTP-status / malformed-JSON failures into the single transport
// error kind the core expects. Retry/backoff is deliberately absent: the
// change feed retries naturally on the next ping.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use gridhook_core::{FeedError, Method, Result, Transport};

const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";

/// Authenticated transport to the Airtable Web API
///
/// # Example
///
/// ```ignore
/// use gridhook_airtable::AirtableTransport;
///
/// let transport = AirtableTransport::from_env()?;
/// // or
/// let transport = AirtableTransport::new("your-access-token");
/// ```
#[derive(Clone)]
pub struct AirtableTransport {
    client: Client,
    token: String,
    base_url: String,
}

impl AirtableTransport {
    /// Create a new transport with the given personal access token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            base_url: DEFAULT_API_URL.to_string(),
        }
    }

    /// Create a new transport from the AIRTABLE_API_TOKEN environment variable
    pub fn from_env() -> Result<Self> {
        let token = std::env::var("AIRTABLE_API_TOKEN").map_err(|_| {
            FeedError::transport("AIRTABLE_API_TOKEN environment variable not set")
        })?;
        Ok(Self::new(token))
    }

    /// Create a new transport with a custom API URL (for mock servers)
    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            token: token.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Transport for AirtableTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(method = method.as_str(), %url, "Issuing API request");

        let mut request = match method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };

        request = request.bearer_auth(&self.token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            FeedError::transport(format!("Failed to send request: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FeedError::transport(format!(
                "Airtable API error ({}): {}",
                status, error_text
            )));
        }

        // DELETE replies with an empty body; everything else is JSON
        let bytes = response.bytes().await.map_err(|e| {
            FeedError::transport(format!("Failed to read response body: {}", e))
        })?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_slice(&bytes)
            .map_err(|e| FeedError::transport(format!("Malformed JSON response: {}", e)))
    }
}

impl std::fmt::Debug for AirtableTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableTransport")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .finish()
    }
}
