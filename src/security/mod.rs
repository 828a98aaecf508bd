//! # Auth Strategies
//!
//! An [`AuthStrategy`] turns a [`RawRequest`] into a [`Principal`] or an [`AuthFailure`].
//! Strategies are stateless per call and never cache across requests.
//!
//! Two built-in strategies cover the common schemes:
//!
//! - [`ApiKeyAuth`] checks a presented key against a configured allow-list.
//! - [`BearerAuth`] extracts `Authorization: Bearer <token>` and hands the token to a
//!   verification function.
//!
//! Any `Fn(&RawRequest) -> Result<Principal, AuthFailure>` closure is a strategy too.
//!
//! The route generator compiles each operation's `security` requirements into a
//! [`RouteGuard`]: alternatives are OR-ed, the schemes inside one alternative are AND-ed.
//! The guard runs before parameter extraction, and a rejection means the implementation
//! is never invoked.

pub mod api_key;
pub mod bearer;

pub use api_key::ApiKeyAuth;
pub use bearer::BearerAuth;

use crate::errors::{ErrorKind, Failure};
use crate::request::RawRequest;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Authenticated caller, handed to the implementation with every invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Principal {
    /// Scheme name the principal was authenticated under (`apiKey`, `bearer`, ..).
    pub scheme: String,
    pub subject: String,
    /// Strategy-specific details: key metadata, token claims.
    pub claims: Value,
}

impl Principal {
    pub fn new(scheme: impl Into<String>, subject: impl Into<String>, claims: Value) -> Self {
        Self {
            scheme: scheme.into(),
            subject: subject.into(),
            claims,
        }
    }

    /// Scopes from a `scope` string or `scopes` list, at the top level or under `metadata`.
    pub fn scopes(&self) -> Vec<String> {
        fn from(v: &Value) -> Option<Vec<String>> {
            if let Some(s) = v.get("scope").and_then(Value::as_str) {
                return Some(s.split_whitespace().map(str::to_string).collect());
            }
            v.get("scopes").and_then(Value::as_array).map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
        }
        from(&self.claims)
            .or_else(|| self.claims.get("metadata").and_then(from))
            .unwrap_or_default()
    }
}

/// Comma-separated credentials from the environment variable `var`, each mapped to
/// empty metadata. `None` when unset or empty.
pub(crate) fn credentials_from_env(var: &str) -> Option<HashMap<String, Value>> {
    let raw = std::env::var(var).ok()?;
    let map: HashMap<String, Value> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| (s.to_string(), Value::Null))
        .collect();
    (!map.is_empty()).then_some(map)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// Credentials missing or invalid (401).
    Unauthorized(String),
    /// Credentials valid but access denied (403).
    Forbidden(String),
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::Unauthorized(m) => write!(f, "unauthorized: {m}"),
            AuthFailure::Forbidden(m) => write!(f, "forbidden: {m}"),
        }
    }
}

impl std::error::Error for AuthFailure {}

impl From<AuthFailure> for Failure {
    fn from(f: AuthFailure) -> Self {
        match f {
            AuthFailure::Unauthorized(m) => Failure::new(ErrorKind::Unauthorized, m),
            AuthFailure::Forbidden(m) => Failure::new(ErrorKind::Forbidden, m),
        }
    }
}

pub trait AuthStrategy: Send + Sync {
    fn authenticate(&self, req: &RawRequest) -> Result<Principal, AuthFailure>;

    /// Authenticate, then require every scope in `scopes`.
    fn authenticate_scoped(
        &self,
        req: &RawRequest,
        scopes: &[String],
    ) -> Result<Principal, AuthFailure> {
        let principal = self.authenticate(req)?;
        if scopes.is_empty() {
            return Ok(principal);
        }
        let granted = principal.scopes();
        let missing: Vec<&str> = scopes
            .iter()
            .filter(|s| !granted.contains(s))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(principal)
        } else {
            Err(AuthFailure::Forbidden(format!(
                "missing required scopes: {}",
                missing.join(" ")
            )))
        }
    }
}

impl<F> AuthStrategy for F
where
    F: Fn(&RawRequest) -> Result<Principal, AuthFailure> + Send + Sync,
{
    fn authenticate(&self, req: &RawRequest) -> Result<Principal, AuthFailure> {
        self(req)
    }
}

/// Shared strategy handle, attachable to any number of routes.
pub type AuthGate = Arc<dyn AuthStrategy>;

/// One scheme inside a security requirement.
#[derive(Clone)]
pub struct ScopedGate {
    pub scheme: String,
    pub gate: AuthGate,
    pub scopes: Vec<String>,
}

impl fmt::Debug for ScopedGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedGate")
            .field("scheme", &self.scheme)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Compiled auth check for one route.
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    alternatives: Vec<Vec<ScopedGate>>,
}

impl RouteGuard {
    /// A guard that admits everyone.
    pub fn open() -> Self {
        Self::default()
    }

    /// Single gate with no scope requirement.
    pub fn uniform(gate: AuthGate) -> Self {
        Self {
            alternatives: vec![vec![ScopedGate {
                scheme: "default".to_string(),
                gate,
                scopes: Vec::new(),
            }]],
        }
    }

    pub fn from_alternatives(alternatives: Vec<Vec<ScopedGate>>) -> Self {
        // An empty requirement object is an explicit anonymous alternative.
        if alternatives.iter().any(Vec::is_empty) {
            return Self::open();
        }
        Self { alternatives }
    }

    pub fn is_open(&self) -> bool {
        self.alternatives.is_empty()
    }

    /// Scheme names this guard may consult, for diagnostics.
    pub fn schemes(&self) -> Vec<&str> {
        self.alternatives
            .iter()
            .flatten()
            .map(|g| g.scheme.as_str())
            .collect()
    }

    /// First satisfied alternative wins. When none is satisfied a `Forbidden` outranks
    /// `Unauthorized`, since it means some credential was valid.
    pub fn check(&self, req: &RawRequest) -> Result<Option<Principal>, AuthFailure> {
        if self.is_open() {
            return Ok(None);
        }
        let mut rejection: Option<AuthFailure> = None;
        'alternatives: for alternative in &self.alternatives {
            let mut principal = None;
            for scoped in alternative {
                match scoped.gate.authenticate_scoped(req, &scoped.scopes) {
                    Ok(p) => {
                        principal.get_or_insert(p);
                    }
                    Err(failure) => {
                        debug!(scheme = %scoped.scheme, %failure, "security requirement not met");
                        rejection = match (rejection, failure) {
                            (Some(AuthFailure::Forbidden(m)), _) => Some(AuthFailure::Forbidden(m)),
                            (_, f @ AuthFailure::Forbidden(_)) => Some(f),
                            (None, f) => Some(f),
                            (kept, _) => kept,
                        };
                        continue 'alternatives;
                    }
                }
            }
            return Ok(principal);
        }
        Err(rejection
            .unwrap_or_else(|| AuthFailure::Unauthorized("authentication required".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use serde_json::json;

    fn accept(scheme: &'static str, claims: Value) -> AuthGate {
        Arc::new(move |_: &RawRequest| Ok(Principal::new(scheme, "u", claims.clone())))
    }

    fn reject() -> AuthGate {
        Arc::new(|_: &RawRequest| Err(AuthFailure::Unauthorized("nope".to_string())))
    }

    #[test]
    fn env_credentials_are_trimmed_and_skip_blanks() {
        std::env::set_var("AUTOROUTE_TEST_CREDENTIALS", " a , ,b ");
        let creds = credentials_from_env("AUTOROUTE_TEST_CREDENTIALS").unwrap();
        assert_eq!(creds.len(), 2);
        assert!(creds.contains_key("a") && creds.contains_key("b"));

        std::env::set_var("AUTOROUTE_TEST_CREDENTIALS", " , ");
        assert!(credentials_from_env("AUTOROUTE_TEST_CREDENTIALS").is_none());
        assert!(credentials_from_env("AUTOROUTE_TEST_CREDENTIALS_UNSET").is_none());
    }

    fn scoped(scheme: &str, gate: AuthGate, scopes: &[&str]) -> ScopedGate {
        ScopedGate {
            scheme: scheme.to_string(),
            gate,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn open_guard_yields_no_principal() {
        let req = RawRequest::new(Method::GET, "/");
        assert_eq!(RouteGuard::open().check(&req), Ok(None));
    }

    #[test]
    fn alternatives_are_or_ed() {
        let guard = RouteGuard::from_alternatives(vec![
            vec![scoped("a", reject(), &[])],
            vec![scoped("b", accept("b", json!({})), &[])],
        ]);
        let req = RawRequest::new(Method::GET, "/");
        assert_eq!(guard.check(&req).unwrap().unwrap().scheme, "b");
    }

    #[test]
    fn missing_scope_is_forbidden() {
        let guard = RouteGuard::from_alternatives(vec![vec![scoped(
            "bearer",
            accept("bearer", json!({ "scope": "read" })),
            &["write"],
        )]]);
        let req = RawRequest::new(Method::GET, "/");
        assert!(matches!(guard.check(&req), Err(AuthFailure::Forbidden(_))));
    }

    #[test]
    fn empty_requirement_means_anonymous() {
        let guard = RouteGuard::from_alternatives(vec![vec![scoped("a", reject(), &[])], vec![]]);
        assert!(guard.is_open());
    }

    #[test]
    fn scopes_read_from_metadata() {
        let p = Principal::new("apiKey", "k", json!({ "metadata": { "scopes": ["a", "b"] } }));
        assert_eq!(p.scopes(), vec!["a".to_string(), "b".to_string()]);
    }
}
