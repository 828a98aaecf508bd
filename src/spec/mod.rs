//! # Specification Module
//!
//! Turns an already-decoded OpenAPI 3.0/3.1 document tree into a [`SpecModel`]: every
//! `$ref` resolved, path-level and operation-level parameters merged, schema shorthand
//! normalised into [`SchemaNode`] trees.
//!
//! Text decoding is not this module's concern; [`load_str`] is a convenience for tests
//! and hosts that hold the document as YAML or JSON text.
//!
//! ```
//! use autoroute::spec::load_str;
//!
//! let model = load_str(r#"
//! openapi: 3.1.0
//! info: { title: Items, version: "1.0" }
//! paths:
//!   /items/{id}:
//!     get:
//!       parameters:
//!         - { name: id, in: path, required: true, schema: { type: integer } }
//!       responses:
//!         "200": { description: ok }
//! "#).unwrap();
//! assert_eq!(model.operations.len(), 1);
//! assert!(model.operations[0].is_item_path());
//! ```

pub use oas3::spec::{SecurityRequirement, SecurityScheme};

mod load;
mod resolve;
mod schema;
mod types;

pub use load::{load, load_str};
pub use types::*;
