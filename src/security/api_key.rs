use super::{AuthFailure, AuthStrategy, Principal};
use crate::request::RawRequest;
use crate::spec::SecurityScheme;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::debug;

pub const DEFAULT_HEADER: &str = "X-API-Key";

/// API-key strategy: the presented key must be in the configured allow-list.
///
/// The key is read from each configured location in turn (header, query parameter,
/// cookie); an empty value counts as absent. [`ApiKeyAuth::new`] reads the
/// `X-API-Key` header; [`ApiKeyAuth::from_scheme`] reads only the declared location.
/// The principal's claims are `{"api_key": <key>, "metadata": <per-key metadata>}`.
#[derive(Debug, Clone)]
pub struct ApiKeyAuth {
    header: Option<String>,
    query_param: Option<String>,
    cookie: Option<String>,
    keys: HashMap<String, Value>,
}

impl ApiKeyAuth {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_metadata(keys.into_iter().map(|k| (k.into(), Value::Null)).collect())
    }

    /// Keys mapped to metadata exposed on the principal.
    pub fn with_metadata(keys: HashMap<String, Value>) -> Self {
        Self::unlocated(keys).header_name(DEFAULT_HEADER)
    }

    fn unlocated(keys: HashMap<String, Value>) -> Self {
        Self {
            header: None,
            query_param: None,
            cookie: None,
            keys,
        }
    }

    /// Comma-separated keys from `API_KEY`, if set.
    pub fn from_env() -> Option<Self> {
        super::credentials_from_env("API_KEY").map(Self::with_metadata)
    }

    /// Build from a declared `apiKey` security scheme; `None` for any other scheme type.
    pub fn from_scheme(scheme: &SecurityScheme, keys: HashMap<String, Value>) -> Option<Self> {
        let SecurityScheme::ApiKey { name, location, .. } = scheme else {
            return None;
        };
        let auth = Self::unlocated(keys);
        Some(match location.as_str() {
            "query" => auth.query_param(name.clone()),
            "cookie" => auth.cookie(name.clone()),
            _ => auth.header_name(name.clone()),
        })
    }

    pub fn header_name(mut self, name: impl Into<String>) -> Self {
        self.header = Some(name.into());
        self
    }

    pub fn query_param(mut self, name: impl Into<String>) -> Self {
        self.query_param = Some(name.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>) -> Self {
        self.cookie = Some(name.into());
        self
    }

    fn presented<'r>(&self, req: &'r RawRequest) -> Option<&'r str> {
        let header = self.header.as_deref().and_then(|h| non_empty(req.header(h)));
        header
            .or_else(|| self.query_param.as_deref().and_then(|q| non_empty(req.query_param(q))))
            .or_else(|| self.cookie.as_deref().and_then(|c| non_empty(req.cookie(c))))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

impl AuthStrategy for ApiKeyAuth {
    fn authenticate(&self, req: &RawRequest) -> Result<Principal, AuthFailure> {
        let Some(key) = self.presented(req) else {
            debug!(header = ?self.header, query = ?self.query_param, cookie = ?self.cookie, "API key missing");
            return Err(AuthFailure::Unauthorized("API key required".to_string()));
        };
        match self.keys.get(key) {
            Some(metadata) => Ok(Principal::new(
                "apiKey",
                key,
                json!({ "api_key": key, "metadata": metadata }),
            )),
            None => {
                debug!("API key rejected");
                Err(AuthFailure::Unauthorized("Invalid API key".to_string()))
            }
        }
    }
}
