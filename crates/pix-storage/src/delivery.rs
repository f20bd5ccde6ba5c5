//! Signed file tokens.
//!
//! Owners can hand out links to individual media items without exposing their
//! credentials. A link carries an HMAC-SHA256 signed token naming the object
//! key, the allowed scope and an expiry; the API verifies it statelessly.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{StorageError, StorageResult};

type HmacSha256 = Hmac<Sha256>;

/// Default link lifetime (1 hour).
pub const DEFAULT_EXPIRY_SECS: u64 = 3600;

/// Maximum allowed expiry (7 days) to prevent long-lived URL leakage.
pub const MAX_EXPIRY_SECS: u64 = 604800;

/// What the link holder may do with the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileScope {
    /// Served inline
    View,
    /// Served with Content-Disposition: attachment
    Download,
}

impl FileScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileScope::View => "view",
            FileScope::Download => "download",
        }
    }
}

/// Token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileToken {
    /// Media ID
    pub mid: String,
    /// Storage key; trusted because the token is signed
    pub key: String,
    pub scope: FileScope,
    /// Expiry timestamp (Unix seconds)
    pub exp: u64,
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl FileToken {
    /// Create a token. The expiry is capped at [`MAX_EXPIRY_SECS`].
    pub fn new(media_id: &str, key: &str, scope: FileScope, expiry: Duration) -> Self {
        Self {
            mid: media_id.to_string(),
            key: key.to_string(),
            scope,
            exp: now_secs() + expiry.as_secs().min(MAX_EXPIRY_SECS),
        }
    }

    pub fn is_expired(&self) -> bool {
        now_secs() >= self.exp
    }

    /// Seconds until expiry.
    pub fn expires_in(&self) -> u64 {
        self.exp.saturating_sub(now_secs())
    }

    fn encode(&self) -> StorageResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(encoded: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    fn mac(secret: &str) -> StorageResult<HmacSha256> {
        HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| StorageError::ConfigError(format!("Invalid HMAC key: {}", e)))
    }

    /// Sign the token as `payload.signature`.
    pub fn sign(&self, secret: &str) -> StorageResult<String> {
        let payload = self.encode()?;
        let mut mac = Self::mac(secret)?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify a signed token.
    ///
    /// Returns `None` if the token is malformed, expired, or the signature does
    /// not match. Returns an error only for configuration issues.
    pub fn verify(signed: &str, secret: &str) -> StorageResult<Option<Self>> {
        let Some((payload, sig_encoded)) = signed.split_once('.') else {
            return Ok(None);
        };
        let Ok(sig_bytes) = URL_SAFE_NO_PAD.decode(sig_encoded) else {
            return Ok(None);
        };

        let mut mac = Self::mac(secret)?;
        mac.update(payload.as_bytes());
        if mac.verify_slice(&sig_bytes).is_err() {
            return Ok(None);
        }

        match Self::decode(payload) {
            Some(token) if !token.is_expired() => Ok(Some(token)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-32-bytes-long!!!";

    fn token() -> FileToken {
        FileToken::new(
            "media-123",
            "users/u1/originals/media-123.jpg",
            FileScope::View,
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_sign_verify() {
        let signed = token().sign(SECRET).unwrap();
        let verified = FileToken::verify(&signed, SECRET).unwrap().unwrap();
        assert_eq!(verified.mid, "media-123");
        assert_eq!(verified.scope, FileScope::View);
    }

    #[test]
    fn test_wrong_secret() {
        let signed = token().sign(SECRET).unwrap();
        assert!(FileToken::verify(&signed, "wrong-secret").unwrap().is_none());
    }

    #[test]
    fn test_tampered_payload() {
        let signed = token().sign(SECRET).unwrap();
        let (_, sig) = signed.split_once('.').unwrap();
        let mut forged = token();
        forged.key = "users/u2/originals/other.jpg".to_string();
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let tampered = format!("{}.{}", forged_payload, sig);
        assert!(FileToken::verify(&tampered, SECRET).unwrap().is_none());
    }

    #[test]
    fn test_expired() {
        let mut t = token();
        t.exp = now_secs() - 1;
        let signed = t.sign(SECRET).unwrap();
        assert!(FileToken::verify(&signed, SECRET).unwrap().is_none());
    }

    #[test]
    fn test_expiry_capped() {
        let t = FileToken::new("m", "k", FileScope::Download, Duration::from_secs(365 * 86400));
        assert!(t.expires_in() <= MAX_EXPIRY_SECS);
    }

    #[test]
    fn test_malformed() {
        assert!(FileToken::verify("no-dot-here", SECRET).unwrap().is_none());
        assert!(FileToken::verify("abc.!!!", SECRET).unwrap().is_none());
    }
}
