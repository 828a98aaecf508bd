use super::{AuthFailure, AuthStrategy, Principal};
use crate::request::RawRequest;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type Verifier = Arc<dyn Fn(&str) -> Result<Value, AuthFailure> + Send + Sync>;

/// Bearer-token strategy.
///
/// Reads `Authorization: Bearer <token>` (scheme matched case-insensitively), or a
/// cookie when configured, and passes the token to a verification function that
/// returns the principal's claims.
#[derive(Clone)]
pub struct BearerAuth {
    verify: Verifier,
    cookie_name: Option<String>,
}

impl BearerAuth {
    pub fn new<F>(verify: F) -> Self
    where
        F: Fn(&str) -> Result<Value, AuthFailure> + Send + Sync + 'static,
    {
        Self {
            verify: Arc::new(verify),
            cookie_name: None,
        }
    }

    /// Allow-list of tokens mapped to metadata. Claims are `{"token", "metadata"}`.
    pub fn with_tokens(tokens: HashMap<String, Value>) -> Self {
        Self::new(move |token| match tokens.get(token) {
            Some(metadata) => Ok(json!({ "token": token, "metadata": metadata })),
            None => Err(AuthFailure::Unauthorized("Invalid bearer token".to_string())),
        })
    }

    /// Comma-separated tokens from `BEARER_TOKEN`, if set.
    pub fn from_env() -> Option<Self> {
        super::credentials_from_env("BEARER_TOKEN").map(Self::with_tokens)
    }

    /// `header.payload.signature` tokens whose signature part equals `signature`.
    ///
    /// The payload is base64 JSON and becomes the claims. This is a pre-shared-secret
    /// check for internal services, not full JWT verification.
    pub fn signed_jwt(signature: impl Into<String>) -> Self {
        let signature = signature.into();
        Self::new(move |token| decode_signed(token, &signature))
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    fn extract<'r>(&self, req: &'r RawRequest) -> Result<&'r str, AuthFailure> {
        if let Some(header) = req.header("authorization") {
            let (scheme, token) = header
                .trim()
                .split_once(' ')
                .ok_or_else(|| AuthFailure::Unauthorized("Malformed Authorization header".to_string()))?;
            if !scheme.eq_ignore_ascii_case("bearer") {
                return Err(AuthFailure::Unauthorized(
                    "Authorization scheme must be Bearer".to_string(),
                ));
            }
            let token = token.trim();
            if token.is_empty() {
                return Err(AuthFailure::Unauthorized("Malformed Authorization header".to_string()));
            }
            return Ok(token);
        }
        if let Some(token) = self.cookie_name.as_deref().and_then(|c| req.cookie(c)) {
            return Ok(token);
        }
        Err(AuthFailure::Unauthorized("Bearer token required".to_string()))
    }
}

impl fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuth")
            .field("cookie_name", &self.cookie_name)
            .finish_non_exhaustive()
    }
}

impl AuthStrategy for BearerAuth {
    fn authenticate(&self, req: &RawRequest) -> Result<Principal, AuthFailure> {
        let token = self.extract(req)?;
        let claims = (self.verify)(token)?;
        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or(token)
            .to_string();
        Ok(Principal::new("bearer", subject, claims))
    }
}

fn decode_signed(token: &str, signature: &str) -> Result<Value, AuthFailure> {
    let invalid = || AuthFailure::Unauthorized("Invalid bearer token".to_string());
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        debug!("bearer token rejected: not header.payload.signature");
        return Err(invalid());
    };
    if sig != signature {
        debug!("bearer token rejected: signature mismatch");
        return Err(invalid());
    }
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| general_purpose::STANDARD.decode(payload))
        .map_err(|e| {
            debug!(error = %e, "bearer token rejected: payload is not base64");
            invalid()
        })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        debug!(error = %e, "bearer token rejected: payload is not JSON");
        invalid()
    })
}
