//! # Route Generation
//!
//! [`generate`] binds every operation of a [`SpecModel`](crate::spec::SpecModel) to an
//! implementation method, compiles its parameter extractors once, and attaches the
//! auth guard. The resulting [`RouteTable`] is immutable; a changed document means
//! generating a new table.
//!
//! Each [`BoundRoute`] is the transport boundary: a method, a path template and
//! [`BoundRoute::invoke`], which runs the full request pipeline and returns an
//! [`Outcome`].

mod generate;

pub use generate::{conventional_method, generate, RouteGenerator};

use crate::errors::Outcome;
use crate::implementation::{Implementation, MethodName};
use crate::request::RawRequest;
use crate::security::RouteGuard;
use crate::spec::{Operation, ParameterLocation, ParameterStyle, SchemaRef};
use http::Method;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// How to pull one declared parameter out of a [`RawRequest`].
#[derive(Debug, Clone)]
pub struct ParameterExtractor {
    pub name: String,
    pub location: ParameterLocation,
    pub schema: SchemaRef,
    pub required: bool,
    pub style: ParameterStyle,
    pub explode: bool,
}

/// Request body handling. `schema` is `None` when no content type carries a schema,
/// in which case the body is passed through unchecked.
#[derive(Debug, Clone)]
pub struct BodyExtractor {
    pub schema: Option<SchemaRef>,
    pub required: bool,
}

/// A generated, ready-to-invoke handler for one operation.
#[derive(Clone)]
pub struct BoundRoute {
    pub method: Method,
    /// Mount prefix followed by the document's template.
    pub path_template: String,
    pub operation: Arc<Operation>,
    pub binding: MethodName,
    /// In the operation's declared parameter order.
    pub extractors: Vec<ParameterExtractor>,
    pub body: Option<BodyExtractor>,
    pub guard: RouteGuard,
    pub implementation: Arc<dyn Implementation>,
}

impl BoundRoute {
    /// Run the request through auth, extraction, validation, invocation and
    /// response finalisation.
    pub fn invoke(&self, raw: &RawRequest) -> Outcome {
        crate::processor::process(self, raw)
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path_template)
    }
}

impl fmt::Debug for BoundRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundRoute")
            .field("method", &self.method)
            .field("path_template", &self.path_template)
            .field("binding", &self.binding)
            .field("extractors", &self.extractors.len())
            .field("body", &self.body.is_some())
            .field("guard", &self.guard)
            .finish()
    }
}

/// Ordered, read-only set of bound routes for one mounted document.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Arc<BoundRoute>>,
}

impl RouteTable {
    pub fn new(routes: Vec<BoundRoute>) -> Self {
        Self {
            routes: routes.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BoundRoute>> {
        self.routes.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<BoundRoute>> {
        self.routes.get(index)
    }

    pub fn find(&self, method: &Method, path_template: &str) -> Option<&Arc<BoundRoute>> {
        self.routes
            .iter()
            .find(|r| r.method == *method && r.path_template == path_template)
    }

    /// `(METHOD, template)` pairs, for comparing tables.
    pub fn signatures(&self) -> BTreeSet<(String, String)> {
        self.routes
            .iter()
            .map(|r| (r.method.to_string(), r.path_template.clone()))
            .collect()
    }
}

impl<'a> IntoIterator for &'a RouteTable {
    type Item = &'a Arc<BoundRoute>;
    type IntoIter = std::slice::Iter<'a, Arc<BoundRoute>>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.iter()
    }
}
