//! Reference host on `may_minihttp`.
//!
//! [`AppService`] turns wire requests into [`RawRequest`](crate::request::RawRequest)s,
//! hands them to an [`App`](crate::app::App) and writes the result back as JSON, with
//! failures rendered as problem details.
//!
//! ```no_run
//! use autoroute::app::App;
//! use autoroute::runtime_config::RuntimeConfig;
//! use autoroute::server::Server;
//! use std::sync::Arc;
//!
//! let app = Arc::new(App::builder().service_name("demo").build());
//! let handle = Server::new(app)
//!     .runtime(RuntimeConfig::from_env())
//!     .bind("127.0.0.1:8080")?;
//! handle.wait_ready()?;
//! handle.stop();
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod http_server;
pub mod request;
pub mod response;
pub mod service;

pub use http_server::{Readiness, Server, ServerHandle};
pub use request::parse_request;
pub use service::AppService;
