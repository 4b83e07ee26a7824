//! Capability tokens: `kid.payload.sig`, base64url without padding, signed
//! with HMAC-SHA256 over the raw payload bytes.

use crate::errors::{MetaError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as b64, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl Claims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

fn sign(secret: &str, payload: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| MetaError::Unauthorized(format!("bad key: {e}")))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn mint(kid: &str, secret: &str, claims: &Claims) -> Result<String> {
    let payload =
        serde_json::to_vec(claims).map_err(|e| MetaError::Unauthorized(e.to_string()))?;
    let sig = sign(secret, &payload)?;
    Ok(format!("{}.{}.{}", kid, b64.encode(&payload), b64.encode(sig)))
}

/// Splits a token and returns its key id.
pub fn key_id(token: &str) -> Result<&str> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(kid), Some(_), Some(_), None) => Ok(kid),
        _ => Err(MetaError::Unauthorized("bad token".into())),
    }
}

/// Verifies the signature with `secret` and checks expiry against `now`
/// (unix seconds).
pub fn decode_verified(token: &str, secret: &str, now: i64) -> Result<Claims> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(MetaError::Unauthorized("bad token".into()));
    }
    let payload = b64
        .decode(parts[1])
        .map_err(|_| MetaError::Unauthorized("bad b64".into()))?;
    let sig = b64
        .decode(parts[2])
        .map_err(|_| MetaError::Unauthorized("bad b64".into()))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| MetaError::Unauthorized(format!("bad key: {e}")))?;
    mac.update(&payload);
    mac.verify_slice(&sig)
        .map_err(|_| MetaError::Unauthorized("bad sig".into()))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|_| MetaError::Unauthorized("bad claims".into()))?;
    if matches!(claims.exp, Some(exp) if exp < now) {
        return Err(MetaError::Unauthorized("expired".into()));
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            sub: Some("alice".into()),
            scopes: vec!["write".into()],
            exp: Some(2_000),
        }
    }

    #[test]
    fn minted_token_verifies() {
        let tok = mint("active", "s3cret", &claims()).unwrap();
        assert_eq!(key_id(&tok).unwrap(), "active");
        let got = decode_verified(&tok, "s3cret", 1_000).unwrap();
        assert_eq!(got, claims());
        assert!(got.has_scope("write"));
        assert!(!got.has_scope("delete"));
    }

    #[test]
    fn wrong_secret_and_expiry_rejected() {
        let tok = mint("active", "s3cret", &claims()).unwrap();
        assert_eq!(
            decode_verified(&tok, "other", 1_000),
            Err(MetaError::Unauthorized("bad sig".into()))
        );
        assert_eq!(
            decode_verified(&tok, "s3cret", 3_000),
            Err(MetaError::Unauthorized("expired".into()))
        );
    }

    #[test]
    fn malformed_tokens_rejected() {
        assert!(key_id("onlyonepart").is_err());
        assert!(key_id("a.b.c.d").is_err());
        assert!(decode_verified("a.!!.c", "k", 0).is_err());
    }
}
