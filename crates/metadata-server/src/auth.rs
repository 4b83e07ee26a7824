use axum::http::{header::AUTHORIZATION, HeaderMap};
use metadata_core::token::{self, Claims};
use metadata_core::{MetaError, Result};

pub const SCOPE_WRITE: &str = "write";
pub const SCOPE_DELETE: &str = "delete";

const ANONYMOUS: &str = "anonymous";

/// Signing keys as `(kid, secret)`; `next` allows rotation without downtime.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    pub active: Option<(String, String)>,
    pub next: Option<(String, String)>,
}

impl KeyRing {
    pub fn is_empty(&self) -> bool {
        self.active.is_none() && self.next.is_none()
    }

    fn secret_for(&self, kid: &str) -> Option<&str> {
        [&self.active, &self.next]
            .into_iter()
            .flatten()
            .find(|(id, _)| id == kid)
            .map(|(_, secret)| secret.as_str())
    }
}

/// What a verified caller may do.
#[derive(Debug, Clone)]
pub struct Grant {
    pub user: Option<String>,
    pub scopes: Vec<String>,
    unrestricted: bool,
}

impl Grant {
    pub fn require(&self, scope: &str) -> Result<()> {
        if self.unrestricted || self.scopes.iter().any(|s| s == scope) {
            Ok(())
        } else {
            Err(MetaError::Forbidden(format!("{scope} scope required")))
        }
    }
}

impl From<Claims> for Grant {
    fn from(c: Claims) -> Self {
        Self {
            user: c.sub.filter(|s| !s.is_empty()),
            scopes: c.scopes,
            unrestricted: false,
        }
    }
}

/// Bearer capability-token verifier. With no keys configured every caller
/// is the anonymous user with all scopes.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    keys: KeyRing,
}

impl Verifier {
    pub fn new(keys: KeyRing) -> Self {
        Self { keys }
    }

    pub fn is_disabled(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn verify(&self, headers: &HeaderMap) -> Result<Grant> {
        if self.is_disabled() {
            return Ok(Grant {
                user: Some(ANONYMOUS.to_string()),
                scopes: Vec::new(),
                unrestricted: true,
            });
        }
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .ok_or_else(|| MetaError::Unauthorized("missing token".into()))?;
        let kid = token::key_id(bearer)?;
        let secret = self
            .keys
            .secret_for(kid)
            .ok_or_else(|| MetaError::Unauthorized("unknown kid".into()))?;
        let claims = token::decode_verified(bearer, secret, chrono::Utc::now().timestamp())?;
        Ok(claims.into())
    }
}
