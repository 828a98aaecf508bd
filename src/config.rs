//! Application configuration.
//!
//! ```yaml
//! service: inventory
//! mounts:
//!   - prefix: /api
//!     spec: specs/items.yaml
//! security:
//!   api_keys:
//!     header_name: X-API-Key
//!     keys:
//!       test123: { owner: ops, scopes: [read, write] }
//!   bearer:
//!     tokens:
//!       token-1: { sub: alice }
//!     signature: mock_signature
//! ```
//!
//! Key and token lists fall back to the `API_KEY` and `BEARER_TOKEN` environment
//! variables (comma-separated) when absent. Configuration is handed to
//! [`AppConfig::build_app`] explicitly; nothing is read from global state afterwards.

use crate::app::{App, DEFAULT_SERVICE_NAME};
use crate::implementation::Implementation;
use crate::request::RawRequest;
use crate::routes::RouteGenerator;
use crate::security::{
    credentials_from_env, ApiKeyAuth, AuthFailure, AuthGate, AuthStrategy, BearerAuth, Principal,
};
use crate::spec::{SecurityScheme, SpecModel};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub enum ConfigError {
    Parse(serde_yaml::Error),
    /// Two mounts share one prefix.
    DuplicatePrefix(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse(e) => write!(f, "invalid configuration: {e}"),
            ConfigError::DuplicatePrefix(p) => write!(f, "prefix '{p}' is mounted twice"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Parse(e) => Some(e),
            ConfigError::DuplicatePrefix(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default)]
    pub mounts: Vec<MountConfig>,
    #[serde(default)]
    pub security: SecurityConfig,
}

fn default_service() -> String {
    DEFAULT_SERVICE_NAME.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            mounts: Vec::new(),
            security: SecurityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MountConfig {
    #[serde(default)]
    pub prefix: String,
    /// Path of the OpenAPI document, relative to the configuration file.
    pub spec: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfig {
    #[serde(default)]
    pub api_keys: Option<ApiKeysConfig>,
    #[serde(default)]
    pub bearer: Option<BearerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiKeysConfig {
    #[serde(default = "default_api_key_header")]
    pub header_name: String,
    /// Key → metadata exposed on the principal.
    #[serde(default)]
    pub keys: HashMap<String, Value>,
}

fn default_api_key_header() -> String {
    crate::security::api_key::DEFAULT_HEADER.to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BearerConfig {
    #[serde(default)]
    pub tokens: HashMap<String, Value>,
    /// Shared signature for `header.payload.signature` tokens.
    #[serde(default)]
    pub signature: Option<String>,
}

impl AppConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(text).map_err(ConfigError::Parse)?;
        let mut seen = std::collections::HashSet::new();
        for mount in &config.mounts {
            let prefix = mount.prefix.trim_end_matches('/');
            if !seen.insert(prefix.to_string()) {
                return Err(ConfigError::DuplicatePrefix(prefix.to_string()));
            }
        }
        Ok(config)
    }

    /// Read and parse a configuration file. Relative mount paths are resolved
    /// against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let mut config = Self::from_yaml_str(&text)
            .with_context(|| format!("parsing configuration {}", path.display()))?;
        if let Some(dir) = path.parent() {
            for mount in &mut config.mounts {
                if mount.spec.is_relative() {
                    mount.spec = dir.join(&mount.spec);
                }
            }
        }
        Ok(config)
    }

    /// Mount every configured document, bound to the implementation registered
    /// under its prefix.
    ///
    /// Errors here are host-level (unreadable file, missing implementation). A
    /// document that fails to load or bind is reported through
    /// [`App::mount_errors`] instead.
    pub fn build_app(
        &self,
        implementations: &HashMap<String, Arc<dyn Implementation>>,
    ) -> anyhow::Result<App> {
        let mut builder = App::builder().service_name(self.service.clone());
        for mount in &self.mounts {
            let implementation = implementations
                .get(&mount.prefix)
                .cloned()
                .with_context(|| format!("no implementation registered for '{}'", mount.prefix))?;
            let document = read_document(&mount.spec)?;
            let mut generator = RouteGenerator::new(implementation);
            if let Some(gate) = self.security.default_gate() {
                generator = generator.default_gate(gate);
            }
            // A document that fails to load gets no scheme gates; the builder
            // records the load error itself.
            if let Ok(model) = crate::spec::load(&document) {
                for (scheme, gate) in self.security.scheme_gates(&model) {
                    generator = generator.scheme_gate(scheme, gate);
                }
            }
            builder = builder.mount_with(&mount.prefix, &document, generator);
        }
        Ok(builder.build())
    }
}

/// Decode a JSON or YAML document from disk.
pub fn read_document(path: &Path) -> anyhow::Result<Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading specification {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("decoding specification {}", path.display()))
}

impl SecurityConfig {
    fn api_keys(&self) -> Option<(String, HashMap<String, Value>)> {
        let header = self
            .api_keys
            .as_ref()
            .map(|c| c.header_name.clone())
            .unwrap_or_else(default_api_key_header);
        match self.api_keys.as_ref().map(|c| &c.keys) {
            Some(keys) if !keys.is_empty() => Some((header, keys.clone())),
            _ => credentials_from_env("API_KEY").map(|keys| (header, keys)),
        }
    }

    pub fn api_key_auth(&self) -> Option<ApiKeyAuth> {
        self.api_keys()
            .map(|(header, keys)| ApiKeyAuth::with_metadata(keys).header_name(header))
    }

    pub fn bearer_auth(&self) -> Option<BearerAuth> {
        let configured = self.bearer.as_ref();
        if let Some(tokens) = configured.map(|b| &b.tokens).filter(|t| !t.is_empty()) {
            return Some(BearerAuth::with_tokens(tokens.clone()));
        }
        if let Some(signature) = configured.and_then(|b| b.signature.clone()) {
            return Some(BearerAuth::signed_jwt(signature));
        }
        BearerAuth::from_env()
    }

    /// Gate used for operations without declared security: API key, bearer, or
    /// either one when both are configured.
    pub fn default_gate(&self) -> Option<AuthGate> {
        match (self.api_key_auth(), self.bearer_auth()) {
            (Some(key), Some(bearer)) => Some(Arc::new(EitherAuth(key, bearer))),
            (Some(key), None) => Some(Arc::new(key)),
            (None, Some(bearer)) => Some(Arc::new(bearer)),
            (None, None) => None,
        }
    }

    /// One strategy per declared security scheme that this configuration can serve.
    pub fn scheme_gates(&self, model: &SpecModel) -> HashMap<String, AuthGate> {
        let mut gates: HashMap<String, AuthGate> = HashMap::new();
        for (name, scheme) in &model.security_schemes {
            let gate: Option<AuthGate> = match scheme {
                SecurityScheme::ApiKey { .. } => self
                    .api_keys()
                    .and_then(|(_, keys)| ApiKeyAuth::from_scheme(scheme, keys))
                    .map(|auth| Arc::new(auth) as AuthGate),
                SecurityScheme::Http { scheme: kind, .. } if kind.eq_ignore_ascii_case("bearer") => {
                    self.bearer_auth().map(|auth| Arc::new(auth) as AuthGate)
                }
                SecurityScheme::OAuth2 { .. } => {
                    self.bearer_auth().map(|auth| Arc::new(auth) as AuthGate)
                }
                _ => None,
            };
            match gate {
                Some(gate) => {
                    debug!(scheme = %name, "auth strategy registered");
                    gates.insert(name.clone(), gate);
                }
                None => debug!(scheme = %name, "no configured strategy for security scheme"),
            }
        }
        gates
    }
}

/// Tries the API key first; a request without one may authenticate by bearer token.
struct EitherAuth(ApiKeyAuth, BearerAuth);

impl AuthStrategy for EitherAuth {
    fn authenticate(&self, req: &RawRequest) -> Result<Principal, AuthFailure> {
        match self.0.authenticate(req) {
            Ok(principal) => Ok(principal),
            Err(_) if req.header("authorization").is_some() => self.1.authenticate(req),
            Err(key_failure) => Err(key_failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    const CONFIG: &str = r#"
service: inventory
mounts:
  - prefix: /api
    spec: items.yaml
security:
  api_keys:
    keys:
      k1: { scopes: [read] }
  bearer:
    tokens:
      t1: { sub: alice }
"#;

    #[test]
    fn parses_with_defaults() {
        let config = AppConfig::from_yaml_str(CONFIG).unwrap();
        assert_eq!(config.service, "inventory");
        assert_eq!(config.mounts[0].prefix, "/api");
        assert_eq!(config.security.api_keys.as_ref().unwrap().header_name, "X-API-Key");

        let empty = AppConfig::from_yaml_str("{}").unwrap();
        assert_eq!(empty, AppConfig::default());
    }

    #[test]
    fn duplicate_prefixes_are_rejected() {
        let text = "mounts:\n  - { prefix: /a, spec: x.yaml }\n  - { prefix: /a/, spec: y.yaml }\n";
        assert!(matches!(
            AppConfig::from_yaml_str(text),
            Err(ConfigError::DuplicatePrefix(p)) if p == "/a"
        ));
    }

    #[test]
    fn default_gate_accepts_either_credential() {
        let config = AppConfig::from_yaml_str(CONFIG).unwrap();
        let gate = config.security.default_gate().unwrap();
        let by_key = RawRequest::new(Method::GET, "/").with_header("X-API-Key", "k1");
        assert_eq!(gate.authenticate(&by_key).unwrap().scheme, "apiKey");
        let by_token = RawRequest::new(Method::GET, "/").with_header("Authorization", "Bearer t1");
        assert_eq!(gate.authenticate(&by_token).unwrap().subject, "t1");
        let neither = RawRequest::new(Method::GET, "/");
        assert!(gate.authenticate(&neither).is_err());
    }

    #[test]
    fn scheme_gates_follow_declared_schemes() {
        let model = crate::spec::load_str(
            r#"
openapi: 3.0.3
info: { title: t, version: "1" }
components:
  securitySchemes:
    key: { type: apiKey, in: query, name: api_key }
    token: { type: http, scheme: bearer }
    basic: { type: http, scheme: basic }
paths:
  /x:
    get:
      responses: { "200": { description: ok } }
"#,
        )
        .unwrap();
        let config = AppConfig::from_yaml_str(CONFIG).unwrap();
        let gates = config.security.scheme_gates(&model);
        assert!(gates.contains_key("key"));
        assert!(gates.contains_key("token"));
        assert!(!gates.contains_key("basic"));
        let req = RawRequest::new(Method::GET, "/x?api_key=k1");
        assert!(gates["key"].authenticate(&req).is_ok());
    }
}
