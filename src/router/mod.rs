//! # Router Module
//!
//! Host-side path matching. The core hands out routes as `(method, template)` pairs;
//! this module selects one for an incoming request and extracts its path parameters.
//!
//! Templates such as `/pets/{id}` are compiled into anchored regex patterns at
//! construction time. Matching is a scan over the compiled patterns, most literal
//! template first, and distinguishes "no such path" (404) from "path exists, wrong
//! method" (405).
//!
//! ```
//! use autoroute::router::{RouteMatch, Router};
//! use http::Method;
//!
//! let router = Router::new([(Method::GET, "/pets/{id}")]).unwrap();
//! match router.route(&Method::GET, "/pets/7") {
//!     RouteMatch::Matched { path_params, .. } => assert_eq!(path_params[0].1, "7"),
//!     _ => unreachable!(),
//! }
//! ```

mod core;

pub use core::{normalize_path, RouteMatch, Router};
