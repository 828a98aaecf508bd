//! Transport-neutral request abstraction handed to the processor.
//!
//! Hosts fill a [`RawRequest`] from whatever wire format they speak; tests build one
//! directly with the `with_*` helpers.

use http::Method;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Parameters kept inline before spilling to the heap; most routes carry fewer.
pub const MAX_INLINE_PARAMS: usize = 8;
pub const MAX_INLINE_HEADERS: usize = 16;

/// Name/value pairs in arrival order. Names are `Arc<str>` so route-owned names clone cheaply.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// ULID-backed request identifier, echoed in logs and handed to implementations.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct RequestId(ulid::Ulid);

impl RequestId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Reuse a caller-supplied id when it parses, otherwise mint a new one.
    pub fn from_header_or_new(header_value: Option<&str>) -> Self {
        header_value
            .and_then(|s| s.parse::<RequestId>().ok())
            .unwrap_or_default()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ulid::Ulid::from_string(s).map(RequestId)
    }
}

impl Serialize for RequestId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RequestId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| serde::de::Error::custom("invalid request id"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    pub method: Method,
    /// Path without query string.
    pub path: String,
    /// Filled by the host's route matcher, URL-decoded.
    pub path_params: ParamVec,
    /// Repeated keys are kept, in order.
    pub query: ParamVec,
    /// Lower-cased header names.
    pub headers: HeaderVec,
    pub cookies: HeaderVec,
    pub body: Option<Value>,
    /// Set when a body was sent but could not be decoded as JSON.
    pub body_error: Option<String>,
    pub request_id: RequestId,
}

impl RawRequest {
    /// `target` may include a query string, which is parsed into [`RawRequest::query`].
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, parse_query_params(q)),
            None => (target, ParamVec::new()),
        };
        Self {
            method,
            path: path.to_string(),
            query,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.into()));
        self
    }

    pub fn with_cookie(mut self, name: &str, value: impl Into<String>) -> Self {
        self.cookies.push((Arc::from(name), value.into()));
        self
    }

    pub fn with_query(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.push((Arc::from(name), value.into()));
        self
    }

    pub fn with_path_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.path_params.push((Arc::from(name), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self.body_error = None;
        self
    }

    /// Decode `text` as JSON; an empty string means no body.
    pub fn with_raw_body(mut self, text: &str) -> Self {
        if text.trim().is_empty() {
            self.body = None;
            return self;
        }
        match serde_json::from_str(text) {
            Ok(v) => {
                self.body = Some(v);
                self.body_error = None;
            }
            Err(e) => {
                self.body = None;
                self.body_error = Some(e.to_string());
            }
        }
        self
    }

    /// Case-insensitive header lookup; last occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rfind(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Last value of a query key.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of a repeated query key, in order.
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// `name[prop]=value` pairs folded into an object.
    pub fn deep_object(&self, name: &str) -> Option<Map<String, Value>> {
        let mut out = Map::new();
        for (k, v) in &self.query {
            let Some(rest) = k.strip_prefix(name) else {
                continue;
            };
            if let Some(prop) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
                out.insert(prop.to_string(), Value::String(v.clone()));
            }
        }
        (!out.is_empty()).then_some(out)
    }

    /// Path parameter by name; later segments win on duplicate names.
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a query string (without the leading `?`), URL-decoding names and values.
pub fn parse_query_params(query: &str) -> ParamVec {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
        .collect()
}

/// Parse a `Cookie:` header value.
pub fn parse_cookies(header: &str) -> HeaderVec {
    header
        .split(';')
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            if name.is_empty() {
                return None;
            }
            let value = parts.next().unwrap_or("").trim();
            Some((Arc::from(name), value.to_string()))
        })
        .collect()
}
