//! Admin session tokens: `base64url(payload).base64url(hmac_sha256(payload))`
//! with payload `{"exp": <unix seconds>}`.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const AUTH_COOKIE: &str = "atsbuddy_auth";
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    exp: i64,
}

#[derive(Clone)]
pub struct TokenSigner {
    secret: Arc<[u8]>,
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Arc::from(secret.as_bytes()),
        }
    }

    pub fn issue(&self, ttl_secs: i64) -> String {
        self.issue_at(ttl_secs, chrono::Utc::now().timestamp())
    }

    pub fn verify(&self, token: &str) -> bool {
        self.verify_at(token, chrono::Utc::now().timestamp())
    }

    fn issue_at(&self, ttl_secs: i64, now: i64) -> String {
        let claims = serde_json::json!({ "exp": now + ttl_secs }).to_string();
        let payload = URL_SAFE_NO_PAD.encode(claims.as_bytes());
        let sig = self.sign(payload.as_bytes());
        format!("{payload}.{}", URL_SAFE_NO_PAD.encode(sig))
    }

    fn verify_at(&self, token: &str, now: i64) -> bool {
        let Some((payload, sig)) = token.split_once('.') else {
            return false;
        };
        let Ok(sig) = URL_SAFE_NO_PAD.decode(sig) else {
            return false;
        };
        if sig.is_empty() {
            return false;
        }
        if !bool::from(self.sign(payload.as_bytes()).as_slice().ct_eq(&sig)) {
            return false;
        }
        URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|raw| serde_json::from_slice::<Claims>(&raw).ok())
            .is_some_and(|c| c.exp > now)
    }

    fn sign(&self, payload: &[u8]) -> Vec<u8> {
        // HMAC accepts keys of any length.
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return Vec::new();
        };
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Constant-time password check.
pub fn password_matches(expected: &str, given: &str) -> bool {
    expected.len() == given.len() && bool::from(expected.as_bytes().ct_eq(given.as_bytes()))
}
