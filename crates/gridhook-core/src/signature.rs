// Inbound ping authenticity
//
// The service signs each ping body with HMAC-SHA256 keyed by the secret it
// returned at subscription creation (handed out base64-encoded), and sends
// the signature as `X-Airtable-Content-MAC: hmac-sha256=<hex>`.
//
// Verification never panics: an undecodable secret or header reads as a
// failed verification.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the ping signature
pub const MAC_HEADER: &str = "x-airtable-content-mac";

const MAC_PREFIX: &str = "hmac-sha256=";

/// Verify a ping body against its MAC header value.
///
/// Accepts the signature in either raw hex or `hmac-sha256=<hex>` format.
pub fn verify_ping_mac(secret_base64: &str, mac_header: &str, body: &[u8]) -> bool {
    let Ok(secret) = BASE64.decode(secret_base64) else {
        tracing::warn!("Ping MAC secret is not valid base64");
        return false;
    };

    let sig = mac_header.trim();
    let sig_hex = sig.strip_prefix(MAC_PREFIX).unwrap_or(sig);
    let Ok(provided) = hex::decode(sig_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(&secret) else {
        return false;
    };
    mac.update(body);
    // `hmac` verifies in constant time
    mac.verify_slice(&provided).is_ok()
}

/// Compute the MAC header value for a body. Used by tests and tooling that
/// simulate the service's side.
pub fn sign_ping_body(secret_base64: &str, body: &[u8]) -> Option<String> {
    let secret = BASE64.decode(secret_base64).ok()?;
    let mut mac = HmacSha256::new_from_slice(&secret).ok()?;
    mac.update(body);
    Some(format!("{}{}", MAC_PREFIX, hex::encode(mac.finalize().into_bytes())))
}
