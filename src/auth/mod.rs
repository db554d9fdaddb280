//! Bearer tokens for the dashboard API.
//!
//! Tokens are `base64url(claims) "." hex(hmac_sha256(secret, base64url(claims)))`
//! with claims `{sub, tenantId, exp}`. The tenant in a verified token is the
//! only tenant an API request may act on.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use wa_relay_core::{Caller, RelayError, RelayResult, TokenVerifier};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(rename = "tenantId")]
    tenant_id: String,
    /// Expiry, Unix seconds.
    exp: i64,
}

pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenSigner {
    pub fn new(secret: &str) -> RelayResult<Self> {
        if secret.is_empty() {
            return Err(RelayError::Config("auth.tokenSecret is empty".into()));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    fn signature(&self, payload: &str) -> RelayResult<String> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| RelayError::Internal(anyhow::anyhow!("hmac key rejected: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Mint a token for `subject` acting on `tenant_id`, valid for `ttl_secs`.
    pub fn issue(&self, subject: &str, tenant_id: &str, ttl_secs: u64) -> RelayResult<String> {
        if tenant_id.trim().is_empty() {
            return Err(RelayError::Validation("tenant id must not be empty".into()));
        }
        let ttl = i64::try_from(ttl_secs).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: subject.to_string(),
            tenant_id: tenant_id.to_string(),
            exp: Utc::now().timestamp().saturating_add(ttl),
        };
        let json = serde_json::to_vec(&claims).map_err(anyhow::Error::from)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.signature(&payload)?;
        Ok(format!("{payload}.{signature}"))
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> RelayResult<Caller> {
        let (payload, signature) = token
            .split_once('.')
            .ok_or_else(|| RelayError::Auth("malformed token".into()))?;

        let expected = self.signature(payload)?;
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(RelayError::Auth("invalid token signature".into()));
        }

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or_else(|| RelayError::Auth("malformed token".into()))?;

        if claims.exp <= now.timestamp() {
            return Err(RelayError::Auth("token expired".into()));
        }
        if claims.tenant_id.trim().is_empty() {
            return Err(RelayError::Auth("token has no tenant".into()));
        }

        Ok(Caller {
            subject: claims.sub,
            tenant_id: claims.tenant_id,
        })
    }
}

impl TokenVerifier for TokenSigner {
    fn verify(&self, token: &str) -> RelayResult<Caller> {
        self.verify_at(token, Utc::now())
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
/// The scheme is case-insensitive.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests;
