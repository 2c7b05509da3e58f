// At-rest sealing of the webhook MAC secret.
// Uses AES-256-GCM with a single key supplied via the environment. The sealed
// form is a versioned JSON envelope, so the scheme can evolve without a data
// migration.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const ENVELOPE_VERSION: u8 = 1;
const ALGORITHM: &str = "AES-256-GCM";

/// Sealed value stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedEnvelope {
    /// Envelope format version
    v: u8,
    /// Encryption algorithm identifier
    alg: String,
    /// Base64-encoded nonce
    nonce: String,
    /// Base64-encoded ciphertext (includes auth tag)
    ct: String,
}

/// Seals and opens webhook MAC secrets.
/// Thread-safe and designed for concurrent use.
#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Create from a base64-encoded 32-byte key
    pub fn new(key_base64: &str) -> Result<Self> {
        let key_bytes = BASE64
            .decode(key_base64)
            .context("Failed to decode sealing key from base64")?;

        if key_bytes.len() != KEY_SIZE {
            anyhow::bail!(
                "Sealing key must be {} bytes, got {} bytes",
                KEY_SIZE,
                key_bytes.len()
            );
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| anyhow::anyhow!("Failed to create cipher: {}", e))?;
        Ok(Self { cipher })
    }

    /// Create from the GRIDHOOK_SEALING_KEY environment variable
    pub fn from_env() -> Result<Self> {
        let key = std::env::var("GRIDHOOK_SEALING_KEY")
            .context("GRIDHOOK_SEALING_KEY environment variable not set")?;
        Self::new(&key)
    }

    /// Seal a secret for storage. Returns the JSON envelope as a string.
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("Sealing failed: {}", e))?;

        let envelope = SealedEnvelope {
            v: ENVELOPE_VERSION,
            alg: ALGORITHM.to_string(),
            nonce: BASE64.encode(nonce_bytes),
            ct: BASE64.encode(&ciphertext),
        };

        serde_json::to_string(&envelope).context("Failed to serialize sealed envelope")
    }

    /// Open a sealed envelope back into the secret
    pub fn open(&self, sealed: &str) -> Result<String> {
        let envelope: SealedEnvelope =
            serde_json::from_str(sealed).context("Failed to parse sealed envelope")?;

        if envelope.v != ENVELOPE_VERSION {
            anyhow::bail!(
                "Unsupported envelope version: {} (expected {})",
                envelope.v,
                ENVELOPE_VERSION
            );
        }
        if envelope.alg != ALGORITHM {
            anyhow::bail!(
                "Unsupported algorithm: {} (expected {})",
                envelope.alg,
                ALGORITHM
            );
        }

        let nonce_bytes = BASE64
            .decode(&envelope.nonce)
            .context("Failed to decode nonce")?;
        if nonce_bytes.len() != NONCE_SIZE {
            anyhow::bail!("Nonce must be {} bytes", NONCE_SIZE);
        }
        let ciphertext = BASE64
            .decode(&envelope.ct)
            .context("Failed to decode ciphertext")?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| anyhow::anyhow!("Opening failed: wrong key or tampered data"))?;

        String::from_utf8(plaintext).context("Sealed value is not valid UTF-8")
    }
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}
