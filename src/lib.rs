//! # autoroute
//!
//! **autoroute** turns an [OpenAPI 3.x](https://spec.openapis.org/oas/v3.0.3) document plus a
//! set of business-logic implementations into a validated request-handling surface, at
//! runtime. No code is generated: the document is loaded into a [`SpecModel`], every
//! operation is bound to a method on an [`Implementation`], and each request flows through
//! the same pipeline.
//!
//! ## Request pipeline
//!
//! 1. **Authenticate**: the route's [`RouteGuard`](security::RouteGuard) runs before anything
//!    is parsed. Unauthenticated requests never reach validation or business logic.
//! 2. **Extract & coerce**: path, query, header and cookie values are coerced from text to
//!    their declared types and validated; the JSON body is validated without coercion.
//!    Every issue is collected, so a single 422 reports all of them.
//! 3. **Invoke**: the bound [`Implementation`] method receives typed arguments.
//! 4. **Finalize**: the result is validated against the declared response schema, undeclared
//!    properties are stripped and a status is chosen (`POST` → 201, `DELETE` → 204, else 200).
//!
//! Failures at any stage surface as a [`Failure`] with an [`ErrorKind`] and render as
//! RFC 9457 problem details.
//!
//! ## Modules
//!
//! - **[`spec`]** - document loading, `$ref` resolution and the in-memory model
//! - **[`validator`]** - schema validation with text-to-type coercion
//! - **[`routes`]** - binding operations to implementation methods
//! - **[`processor`]** - the per-request pipeline
//! - **[`response`]** - response validation, shaping and status inference
//! - **[`security`]** - API key and bearer strategies, per-route guards
//! - **[`router`]** - path template matching
//! - **[`app`]** - mounting documents under prefixes, health, reload
//! - **[`server`]** - reference host on `may_minihttp`
//! - **[`config`]**, **[`logging`]**, **[`runtime_config`]** - ambient setup
//!
//! ## Example
//!
//! ```
//! use autoroute::{App, HandlerSet, Reply};
//! use autoroute::request::RawRequest;
//! use autoroute::app::Dispatch;
//! use http::Method;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let doc = serde_yaml::from_str(r#"
//! openapi: 3.0.3
//! info: { title: items, version: "1" }
//! paths:
//!   /items:
//!     get:
//!       responses:
//!         "200":
//!           description: ok
//!           content:
//!             application/json:
//!               schema: { type: array, items: { type: string } }
//! "#).unwrap();
//!
//! let handlers = HandlerSet::new().list(|_| Ok(Reply::Value(json!(["a", "b"]))));
//! let app = App::builder().mount("/api", &doc, Arc::new(handlers), None).build();
//!
//! match app.handle(RawRequest::new(Method::GET, "/api/items")) {
//!     Dispatch::Handled(outcome) => assert_eq!(outcome.status(), 200),
//!     _ => unreachable!(),
//! }
//! ```

pub mod app;
pub mod config;
pub mod errors;
pub mod implementation;
pub mod logging;
pub mod processor;
pub mod request;
pub mod response;
pub mod router;
pub mod routes;
pub mod runtime_config;
pub mod security;
pub mod server;
pub mod spec;
pub mod validator;

pub use app::{App, AppBuilder, Dispatch, MountError};
pub use errors::{DomainError, ErrorKind, Failure, FinalResponse, GenerationError, LoadError, Outcome};
pub use implementation::{
    Argument, HandlerSet, IdStrategy, Implementation, InMemoryResource, Invocation, MethodName,
    Reply,
};
pub use routes::{generate, BoundRoute, RouteGenerator, RouteTable};
pub use security::{ApiKeyAuth, AuthFailure, AuthGate, AuthStrategy, BearerAuth, Principal};
pub use spec::{load, load_str, SpecModel};
pub use validator::{validate_and_coerce, ValidationIssue};
