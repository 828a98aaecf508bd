//! # Mounted Applications
//!
//! An [`App`] serves any number of OpenAPI documents side by side, each under its own
//! path prefix. Every mount is loaded and generated independently: a document that
//! fails to load or bind is recorded in [`App::mount_errors`] and serves nothing,
//! while the other mounts carry on.
//!
//! Each mount's route table sits behind an [`ArcSwap`]. Requests take a snapshot of
//! the table for their whole lifetime, and [`App::reload_mount`] swaps in a freshly
//! generated table wholesale, so in-flight requests finish against the table they
//! started with.
//!
//! ```
//! use autoroute::app::{App, Dispatch};
//! use autoroute::implementation::InMemoryResource;
//! use autoroute::request::RawRequest;
//! use http::Method;
//! use std::sync::Arc;
//!
//! let document: serde_json::Value = serde_yaml::from_str(r#"
//! openapi: 3.0.3
//! info: { title: items, version: "1" }
//! paths:
//!   /items:
//!     get:
//!       responses: { "200": { description: ok } }
//! "#).unwrap();
//!
//! let app = App::builder()
//!     .service_name("inventory")
//!     .mount("/api", &document, Arc::new(InMemoryResource::new("Item")), None)
//!     .build();
//! assert!(app.mount_errors().is_empty());
//!
//! match app.handle(RawRequest::new(Method::GET, "/api/items")) {
//!     Dispatch::Handled(outcome) => assert_eq!(outcome.status(), 200),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```

use crate::errors::{FinalResponse, GenerationError, LoadError, Outcome};
use crate::implementation::Implementation;
use crate::request::RawRequest;
use crate::router::{normalize_path, RouteMatch, Router};
use crate::routes::{RouteGenerator, RouteTable};
use crate::security::AuthGate;
use arc_swap::ArcSwap;
use http::Method;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const HEALTH_PATH: &str = "/health";
pub const DEFAULT_SERVICE_NAME: &str = "autoroute";

/// Why a mount serves nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum MountError {
    Load { prefix: String, error: LoadError },
    Generate { prefix: String, error: GenerationError },
    /// A path template could not be compiled into a matcher.
    Router { prefix: String, message: String },
    /// `reload_mount` named a prefix that was never mounted.
    UnknownMount { prefix: String },
}

impl MountError {
    pub fn prefix(&self) -> &str {
        match self {
            MountError::Load { prefix, .. }
            | MountError::Generate { prefix, .. }
            | MountError::Router { prefix, .. }
            | MountError::UnknownMount { prefix } => prefix,
        }
    }
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountError::Load { prefix, error } => write!(f, "mount '{prefix}': {error}"),
            MountError::Generate { prefix, error } => write!(f, "mount '{prefix}': {error}"),
            MountError::Router { prefix, message } => {
                write!(f, "mount '{prefix}': invalid path template: {message}")
            }
            MountError::UnknownMount { prefix } => write!(f, "no mount at prefix '{prefix}'"),
        }
    }
}

impl std::error::Error for MountError {}

/// Result of offering one request to the app.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Handled(Outcome),
    /// Some mount knows the path, but not for this method (405).
    MethodNotAllowed(Vec<Method>),
    /// No mount knows the path (404).
    NotFound,
}

/// A generated table and its matcher; empty when the mount failed.
#[derive(Debug, Default)]
struct MountState {
    table: RouteTable,
    router: Router,
    error: Option<MountError>,
}

struct Mount {
    prefix: String,
    generator: RouteGenerator,
    state: ArcSwap<MountState>,
}

impl Mount {
    fn build_state(prefix: &str, generator: &RouteGenerator, document: &Value) -> Result<MountState, MountError> {
        let model = crate::spec::load(document).map_err(|error| MountError::Load {
            prefix: prefix.to_string(),
            error,
        })?;
        let table = generator.generate(&model).map_err(|error| MountError::Generate {
            prefix: prefix.to_string(),
            error,
        })?;
        let router = Router::new(
            table
                .iter()
                .map(|r| (r.method.clone(), r.path_template.clone())),
        )
        .map_err(|e| MountError::Router {
            prefix: prefix.to_string(),
            message: e.to_string(),
        })?;
        Ok(MountState {
            table,
            router,
            error: None,
        })
    }
}

#[derive(Default)]
pub struct AppBuilder {
    service_name: Option<String>,
    mounts: Vec<Mount>,
}

impl AppBuilder {
    /// Name reported by the health endpoint.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Mount `document` under `prefix`, bound to `implementation`, with `gate` as the
    /// default auth gate for every route of the document.
    pub fn mount(
        self,
        prefix: &str,
        document: &Value,
        implementation: Arc<dyn Implementation>,
        gate: Option<AuthGate>,
    ) -> Self {
        let mut generator = RouteGenerator::new(implementation);
        if let Some(gate) = gate {
            generator = generator.default_gate(gate);
        }
        self.mount_with(prefix, document, generator)
    }

    /// Mount with a fully configured generator (per-scheme gates). The generator's
    /// prefix is replaced by `prefix`.
    pub fn mount_with(mut self, prefix: &str, document: &Value, generator: RouteGenerator) -> Self {
        let prefix = prefix.trim_end_matches('/').to_string();
        let generator = generator.prefix(prefix.clone());
        let state = match Mount::build_state(&prefix, &generator, document) {
            Ok(state) => {
                info!(prefix = %prefix, routes = state.table.len(), "specification mounted");
                state
            }
            Err(err) => {
                error!(prefix = %prefix, error = %err, "specification refused; mount serves nothing");
                MountState {
                    error: Some(err),
                    ..MountState::default()
                }
            }
        };
        self.mounts.push(Mount {
            prefix,
            generator,
            state: ArcSwap::from_pointee(state),
        });
        self
    }

    pub fn build(self) -> App {
        App {
            service_name: self
                .service_name
                .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            mounts: self.mounts,
        }
    }
}

/// Several mounted specifications plus the health endpoint.
pub struct App {
    service_name: String,
    mounts: Vec<Mount>,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::default()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Errors of mounts that currently serve nothing.
    pub fn mount_errors(&self) -> Vec<MountError> {
        self.mounts
            .iter()
            .filter_map(|m| m.state.load().error.clone())
            .collect()
    }

    /// Every served `(method, template)`, grouped by mount.
    pub fn routes(&self) -> Vec<(Method, String)> {
        self.mounts
            .iter()
            .flat_map(|m| {
                m.state
                    .load()
                    .table
                    .iter()
                    .map(|r| (r.method.clone(), r.path_template.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Rebuild the mount at `prefix` from `document` and swap it in. On failure the
    /// previous table keeps serving. Returns the new route count.
    pub fn reload_mount(&self, prefix: &str, document: &Value) -> Result<usize, MountError> {
        let prefix = prefix.trim_end_matches('/');
        let mount = self
            .mounts
            .iter()
            .find(|m| m.prefix == prefix)
            .ok_or_else(|| MountError::UnknownMount {
                prefix: prefix.to_string(),
            })?;
        match Mount::build_state(&mount.prefix, &mount.generator, document) {
            Ok(state) => {
                let routes = state.table.len();
                mount.state.store(Arc::new(state));
                info!(prefix = %prefix, routes, "specification reloaded");
                Ok(routes)
            }
            Err(err) => {
                warn!(prefix = %prefix, error = %err, "reload refused; previous routes stay active");
                Err(err)
            }
        }
    }

    /// `{"status": "healthy", "timestamp": <RFC 3339 UTC>, "service": <name>}`
    pub fn health(&self) -> Value {
        json!({
            "status": "healthy",
            "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "service": self.service_name,
        })
    }

    /// Select a route for `raw` and process it. `GET /health` is always answered.
    pub fn handle(&self, mut raw: RawRequest) -> Dispatch {
        let path = normalize_path(&raw.path).to_string();
        if path == HEALTH_PATH && raw.method == Method::GET {
            return Dispatch::Handled(Outcome::Success(FinalResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: Some(self.health()),
            }));
        }

        let mut allowed: Vec<Method> = Vec::new();
        for mount in &self.mounts {
            let state = mount.state.load_full();
            match state.router.route(&raw.method, &path) {
                RouteMatch::Matched { index, path_params } => {
                    let Some(route) = state.table.get(index) else {
                        continue;
                    };
                    raw.path_params = path_params;
                    return Dispatch::Handled(route.invoke(&raw));
                }
                RouteMatch::MethodNotAllowed { allowed: methods } => {
                    for m in methods {
                        if !allowed.contains(&m) {
                            allowed.push(m);
                        }
                    }
                }
                RouteMatch::NotFound => {}
            }
        }
        if allowed.is_empty() {
            Dispatch::NotFound
        } else {
            Dispatch::MethodNotAllowed(allowed)
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mounts: HashMap<&str, usize> = self
            .mounts
            .iter()
            .map(|m| (m.prefix.as_str(), m.state.load().table.len()))
            .collect();
        f.debug_struct("App")
            .field("service_name", &self.service_name)
            .field("mounts", &mounts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementation::InMemoryResource;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    const ITEMS: &str = r#"
openapi: 3.0.3
info: { title: items, version: "1" }
paths:
  /items:
    get:
      responses: { "200": { description: ok } }
"#;

    const ITEMS_V2: &str = r#"
openapi: 3.0.3
info: { title: items, version: "2" }
paths:
  /items:
    get:
      responses: { "200": { description: ok } }
    post:
      responses: { "201": { description: created } }
"#;

    fn resource() -> Arc<dyn Implementation> {
        Arc::new(InMemoryResource::new("Item"))
    }

    #[test]
    fn failing_mount_does_not_affect_others() {
        let app = App::builder()
            .mount("/good", &doc(ITEMS), resource(), None)
            .mount("/bad", &doc("openapi: 3.0.3\ninfo: {title: x, version: '1'}\n"), resource(), None)
            .build();
        let errors = app.mount_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].prefix(), "/bad");
        assert!(matches!(
            app.handle(RawRequest::new(Method::GET, "/good/items")),
            Dispatch::Handled(_)
        ));
        assert_eq!(app.handle(RawRequest::new(Method::GET, "/bad/items")), Dispatch::NotFound);
    }

    #[test]
    fn method_not_allowed_and_health() {
        let app = App::builder().service_name("svc").mount("", &doc(ITEMS), resource(), None).build();
        assert_eq!(
            app.handle(RawRequest::new(Method::DELETE, "/items")),
            Dispatch::MethodNotAllowed(vec![Method::GET])
        );
        match app.handle(RawRequest::new(Method::GET, "/health/")) {
            Dispatch::Handled(outcome) => {
                let body = outcome.body().unwrap();
                assert_eq!(body["status"], "healthy");
                assert_eq!(body["service"], "svc");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reload_swaps_the_table() {
        let app = App::builder().mount("/api/", &doc(ITEMS), resource(), None).build();
        assert_eq!(app.routes().len(), 1);
        assert_eq!(app.reload_mount("/api", &doc(ITEMS_V2)), Ok(2));
        assert_eq!(app.routes().len(), 2);

        let err = app.reload_mount("/api", &doc("openapi: 3.0.3\n")).unwrap_err();
        assert!(matches!(err, MountError::Load { .. }));
        assert_eq!(app.routes().len(), 2);
        assert!(matches!(
            app.reload_mount("/nope", &doc(ITEMS)),
            Err(MountError::UnknownMount { .. })
        ));
    }
}
