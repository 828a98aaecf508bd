use super::{BodyExtractor, BoundRoute, ParameterExtractor, RouteTable};
use crate::errors::GenerationError;
use crate::implementation::{Implementation, MethodName};
use crate::security::{AuthGate, RouteGuard, ScopedGate};
use crate::spec::{Operation, ParameterStyle, SpecModel};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bind `model` to `implementation` under `prefix`, with `gate` as the default auth gate.
///
/// Fails on the first operation, in document order, that cannot be bound.
pub fn generate(
    model: &SpecModel,
    implementation: Arc<dyn Implementation>,
    prefix: &str,
    gate: Option<AuthGate>,
) -> Result<RouteTable, GenerationError> {
    let mut generator = RouteGenerator::new(implementation).prefix(prefix);
    if let Some(gate) = gate {
        generator = generator.default_gate(gate);
    }
    generator.generate(model)
}

/// CRUD method implied by the HTTP method and the path shape, if any.
///
/// | request | collection path | item path (`.../{id}`) |
/// |---|---|---|
/// | GET | `list` | `get` |
/// | POST | `create` | - |
/// | PUT, PATCH | - | `update` |
/// | DELETE | - | `delete` |
pub fn conventional_method(op: &Operation) -> Option<MethodName> {
    match (op.method.as_str(), op.is_item_path()) {
        ("GET", false) => Some(MethodName::List),
        ("GET", true) => Some(MethodName::Get),
        ("POST", false) => Some(MethodName::Create),
        ("PUT" | "PATCH", true) => Some(MethodName::Update),
        ("DELETE", true) => Some(MethodName::Delete),
        _ => None,
    }
}

/// Builder form of [`generate`], with per-scheme auth strategies.
#[derive(Clone)]
pub struct RouteGenerator {
    implementation: Arc<dyn Implementation>,
    prefix: String,
    default_gate: Option<AuthGate>,
    scheme_gates: HashMap<String, AuthGate>,
}

impl RouteGenerator {
    pub fn new(implementation: Arc<dyn Implementation>) -> Self {
        Self {
            implementation,
            prefix: String::new(),
            default_gate: None,
            scheme_gates: HashMap::new(),
        }
    }

    /// Prepended verbatim to every path template.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Gate for operations without their own `security`, and the fallback for
    /// declared schemes that have no strategy of their own.
    pub fn default_gate(mut self, gate: AuthGate) -> Self {
        self.default_gate = Some(gate);
        self
    }

    /// Strategy for the security scheme named `scheme` in `components.securitySchemes`.
    pub fn scheme_gate(mut self, scheme: impl Into<String>, gate: AuthGate) -> Self {
        self.scheme_gates.insert(scheme.into(), gate);
        self
    }

    pub fn generate(&self, model: &SpecModel) -> Result<RouteTable, GenerationError> {
        let mut routes = Vec::with_capacity(model.operations.len());
        for op in &model.operations {
            routes.push(self.bind_route(op)?);
        }
        info!(
            title = %model.title,
            prefix = %self.prefix,
            routes = routes.len(),
            "route table generated"
        );
        Ok(RouteTable::new(routes))
    }

    fn bind_route(&self, op: &Operation) -> Result<BoundRoute, GenerationError> {
        let binding = self.bind(op)?;
        let guard = self.guard_for(op)?;

        let extractors = op
            .parameters
            .iter()
            .map(|p| {
                let style = p.effective_style();
                ParameterExtractor {
                    name: p.name.clone(),
                    location: p.location,
                    schema: Arc::clone(&p.schema),
                    required: p.required,
                    style,
                    explode: p.explode.unwrap_or(style == ParameterStyle::Form),
                }
            })
            .collect();

        let body = op.request_body.as_ref().map(|b| BodyExtractor {
            schema: b.json_schema().cloned(),
            required: b.required,
        });

        let path_template = format!("{}{}", self.prefix, op.path_template);
        debug!(
            method = %op.method,
            path = %path_template,
            binding = %binding,
            gated = !guard.is_open(),
            "operation bound"
        );

        Ok(BoundRoute {
            method: op.method.clone(),
            path_template,
            operation: Arc::new(op.clone()),
            binding,
            extractors,
            body,
            guard,
            implementation: Arc::clone(&self.implementation),
        })
    }

    /// An explicit `operationId` must be exposed verbatim; otherwise the CRUD
    /// convention applies. Never guesses beyond that.
    fn bind(&self, op: &Operation) -> Result<MethodName, GenerationError> {
        let wanted = match &op.operation_id {
            Some(id) => Some(MethodName::from_operation_id(id)),
            None => conventional_method(op),
        };
        match wanted {
            Some(method) if self.implementation.exposes(&method) => Ok(method),
            Some(method) => Err(GenerationError::UnboundOperation {
                operation: op.label(),
                method: Some(method.to_string()),
            }),
            None => Err(GenerationError::UnboundOperation {
                operation: op.label(),
                method: None,
            }),
        }
    }

    fn guard_for(&self, op: &Operation) -> Result<RouteGuard, GenerationError> {
        let requirements = match &op.security {
            None => {
                return Ok(self
                    .default_gate
                    .clone()
                    .map(RouteGuard::uniform)
                    .unwrap_or_default())
            }
            Some(reqs) if reqs.is_empty() => return Ok(RouteGuard::open()),
            Some(reqs) => reqs,
        };

        if self.default_gate.is_none() && self.scheme_gates.is_empty() {
            warn!(
                operation = %op.label(),
                "operation declares security but no auth strategy is configured; serving it ungated"
            );
            return Ok(RouteGuard::open());
        }

        let mut alternatives = Vec::with_capacity(requirements.len());
        for requirement in requirements {
            let mut all_of = Vec::with_capacity(requirement.0.len());
            for (scheme, scopes) in &requirement.0 {
                let gate = self
                    .scheme_gates
                    .get(scheme)
                    .or(self.default_gate.as_ref())
                    .cloned()
                    .ok_or_else(|| GenerationError::UnknownSecurityScheme {
                        operation: op.label(),
                        scheme: scheme.clone(),
                    })?;
                all_of.push(ScopedGate {
                    scheme: scheme.clone(),
                    gate,
                    scopes: scopes.clone(),
                });
            }
            alternatives.push(all_of);
        }
        Ok(RouteGuard::from_alternatives(alternatives))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementation::{HandlerSet, Reply};
    use crate::request::RawRequest;
    use crate::security::{AuthFailure, Principal};
    use serde_json::json;

    const SPEC: &str = r#"
openapi: 3.0.3
info: { title: t, version: "1" }
components:
  securitySchemes:
    key: { type: apiKey, in: header, name: X-API-Key }
paths:
  /items:
    get:
      parameters:
        - { name: limit, in: query, schema: { type: integer } }
      responses: { "200": { description: ok } }
    post:
      security: [ { key: [] } ]
      requestBody:
        content:
          application/json:
            schema: { type: object }
      responses: { "201": { description: created } }
  /items/{id}:
    get:
      security: []
      parameters:
        - { name: id, in: path, required: true, schema: { type: integer } }
      responses: { "200": { description: ok } }
"#;

    fn handlers() -> Arc<dyn Implementation> {
        Arc::new(
            HandlerSet::new()
                .list(|_| Ok(Reply::Value(json!([]))))
                .get(|_| Ok(Reply::Value(json!({}))))
                .create(|_| Ok(Reply::Value(json!({})))),
        )
    }

    fn deny() -> AuthGate {
        Arc::new(|_: &RawRequest| -> Result<Principal, AuthFailure> {
            Err(AuthFailure::Unauthorized("no".into()))
        })
    }

    #[test]
    fn conventions_and_prefix() {
        let model = crate::spec::load_str(SPEC).unwrap();
        let table = generate(&model, handlers(), "/v1", None).unwrap();
        assert_eq!(table.len(), 3);
        let create = table.find(&http::Method::POST, "/v1/items").unwrap();
        assert_eq!(create.binding, MethodName::Create);
        assert!(create.body.is_some());
        let list = table.find(&http::Method::GET, "/v1/items").unwrap();
        assert_eq!(list.extractors[0].name, "limit");
        assert!(list.extractors[0].explode);
    }

    #[test]
    fn declared_security_uses_named_then_default_gate() {
        let model = crate::spec::load_str(SPEC).unwrap();
        let table = RouteGenerator::new(handlers())
            .default_gate(deny())
            .generate(&model)
            .unwrap();
        assert!(!table.find(&http::Method::GET, "/items").unwrap().guard.is_open());
        assert!(!table.find(&http::Method::POST, "/items").unwrap().guard.is_open());
        assert!(table.find(&http::Method::GET, "/items/{id}").unwrap().guard.is_open());
    }

    #[test]
    fn unknown_scheme_fails_when_only_named_gates_exist() {
        let model = crate::spec::load_str(SPEC).unwrap();
        let err = RouteGenerator::new(handlers())
            .scheme_gate("other", deny())
            .generate(&model)
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::UnknownSecurityScheme {
                operation: "POST /items".into(),
                scheme: "key".into()
            }
        );
    }

    #[test]
    fn no_strategies_serves_ungated() {
        let model = crate::spec::load_str(SPEC).unwrap();
        let table = generate(&model, handlers(), "", None).unwrap();
        assert!(table.iter().all(|r| r.guard.is_open()));
    }

    #[test]
    fn missing_method_is_unbound() {
        let model = crate::spec::load_str(SPEC).unwrap();
        let imp: Arc<dyn Implementation> = Arc::new(HandlerSet::new().list(|_| Ok(json!([]).into())));
        let err = generate(&model, imp, "", None).unwrap_err();
        assert_eq!(
            err,
            GenerationError::UnboundOperation {
                operation: "POST /items".into(),
                method: Some("create".into())
            }
        );
    }
}
