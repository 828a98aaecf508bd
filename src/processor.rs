//! # Request Processor
//!
//! One request moves through a fixed sequence of stages:
//!
//! ```text
//! AuthCheck -> ParameterExtraction -> Validation -> Invocation
//!           -> ResponseValidation -> ResponseTransformation
//! ```
//!
//! Every stage either hands its result to the next one or ends the request with a
//! [`Failure`]. Exactly one [`Outcome`] is produced and the implementation is invoked
//! at most once; nothing is retried.

use crate::errors::{DomainError, Failure, Outcome};
use crate::implementation::{Argument, Invocation};
use crate::request::RawRequest;
use crate::routes::{BodyExtractor, BoundRoute, ParameterExtractor};
use crate::spec::{ParameterLocation, ParameterStyle, SchemaKind};
use crate::validator::{coerce, SourceKind, ValidationIssue, Validator};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use tracing::{debug, error, info};

/// Process `raw` against `route` and produce its single [`Outcome`].
pub fn process(route: &BoundRoute, raw: &RawRequest) -> Outcome {
    let request_id = raw.request_id;

    // AuthCheck
    let principal = match route.guard.check(raw) {
        Ok(principal) => principal,
        Err(rejection) => {
            debug!(
                request_id = %request_id,
                operation = %route.label(),
                %rejection,
                "request rejected by auth guard"
            );
            return Outcome::Failure(rejection.into());
        }
    };

    // ParameterExtraction + Validation
    let mut issues = Vec::new();
    let args = extract_arguments(&route.extractors, raw, &mut issues);
    let body = route
        .body
        .as_ref()
        .and_then(|extractor| extract_body(extractor, raw, &mut issues));
    if !issues.is_empty() {
        debug!(
            request_id = %request_id,
            operation = %route.label(),
            issues = issues.len(),
            "request failed validation"
        );
        return Outcome::Failure(Failure::validation(issues));
    }

    // Invocation
    let call = Invocation {
        method: route.binding.clone(),
        args,
        body,
        principal,
        request_id,
    };
    let reply = match panic::catch_unwind(AssertUnwindSafe(|| route.implementation.invoke(call))) {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => return Outcome::Failure(domain_failure(route, raw, err)),
        Err(payload) => {
            error!(
                request_id = %request_id,
                operation = %route.label(),
                panic = %panic_message(payload.as_ref()),
                "implementation panicked"
            );
            return Outcome::Failure(Failure::internal("implementation panicked"));
        }
    };

    // ResponseValidation + ResponseTransformation
    match crate::response::finalize(&route.operation, reply) {
        Ok(response) => {
            info!(
                request_id = %request_id,
                operation = %route.label(),
                status = response.status,
                "request handled"
            );
            Outcome::Success(response)
        }
        Err(failure) => Outcome::Failure(failure),
    }
}

fn domain_failure(route: &BoundRoute, raw: &RawRequest, err: DomainError) -> Failure {
    if err.kind().is_internal() {
        error!(
            request_id = %raw.request_id,
            operation = %route.label(),
            kind = %err.kind(),
            detail = %err.detail(),
            "implementation failed"
        );
    } else {
        debug!(
            request_id = %raw.request_id,
            operation = %route.label(),
            kind = %err.kind(),
            detail = %err.detail(),
            "implementation raised a domain error"
        );
    }
    err.into()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Coerce every declared parameter, in declared order. Issues accumulate across
/// parameters; an argument with issues still occupies its slot as `None`.
pub fn extract_arguments(
    extractors: &[ParameterExtractor],
    raw: &RawRequest,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<Argument> {
    extractors
        .iter()
        .map(|ex| {
            let source = SourceKind::from(ex.location);
            let path = format!("{}.{}", source.as_str(), ex.name);
            let value = match raw_parameter(ex, raw) {
                Some(raw_value) => match Validator::inbound(source).run(&ex.schema, &raw_value, &path) {
                    Ok(coerced) => Some(coerced),
                    Err(found) => {
                        issues.extend(found);
                        None
                    }
                },
                None if ex.required => {
                    issues.push(ValidationIssue::new(path, "required parameter is missing"));
                    None
                }
                None => ex.schema.default.clone(),
            };
            Argument {
                name: ex.name.clone(),
                location: ex.location,
                value,
            }
        })
        .collect()
}

fn extract_body(
    extractor: &BodyExtractor,
    raw: &RawRequest,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Value> {
    if let Some(err) = &raw.body_error {
        issues.push(ValidationIssue::new("body", format!("invalid JSON: {err}")));
        return None;
    }
    let Some(body) = &raw.body else {
        if extractor.required {
            issues.push(ValidationIssue::new("body", "request body is required"));
        }
        return None;
    };
    match &extractor.schema {
        Some(schema) => match Validator::inbound(SourceKind::Body).run(schema, body, "body") {
            Ok(coerced) => Some(coerced),
            Err(found) => {
                issues.extend(found);
                None
            }
        },
        None => Some(body.clone()),
    }
}

/// Raw wire value for one parameter, shaped for the validator: arrays arrive as a
/// JSON array of strings, `deepObject` parameters as an object of strings.
fn raw_parameter(ex: &ParameterExtractor, raw: &RawRequest) -> Option<Value> {
    let values: Vec<&str> = match ex.location {
        ParameterLocation::Path => raw.path_param(&ex.name).into_iter().collect(),
        ParameterLocation::Query if ex.style == ParameterStyle::DeepObject => {
            return raw.deep_object(&ex.name).map(Value::Object);
        }
        ParameterLocation::Query => raw.query_values(&ex.name),
        ParameterLocation::Header => raw.header(&ex.name).into_iter().collect(),
        ParameterLocation::Cookie => raw.cookie(&ex.name).into_iter().collect(),
    };
    let last = *values.last()?;

    if matches!(ex.schema.kind, SchemaKind::Array { .. }) {
        if values.len() > 1 {
            return Some(values.iter().map(|v| Value::String(v.to_string())).collect());
        }
        return Some(coerce::to_array(
            strip_style_prefix(ex, last),
            ex.style.array_delimiter(),
        ));
    }

    Some(Value::String(strip_style_prefix(ex, last).to_string()))
}

/// `label` values start with `.`, `matrix` values with `;name=`.
fn strip_style_prefix<'a>(ex: &ParameterExtractor, value: &'a str) -> &'a str {
    match ex.style {
        ParameterStyle::Label => value.strip_prefix('.').unwrap_or(value),
        ParameterStyle::Matrix => value
            .strip_prefix(';')
            .and_then(|v| v.strip_prefix(ex.name.as_str()))
            .and_then(|v| v.strip_prefix('='))
            .unwrap_or(value),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::implementation::{HandlerSet, Implementation, Reply};
    use crate::routes::generate;
    use http::Method;
    use serde_json::json;
    use std::sync::Arc;

    const SPEC: &str = r#"
openapi: 3.0.3
info: { title: t, version: "1" }
paths:
  /items:
    get:
      parameters:
        - { name: limit, in: query, schema: { type: integer, default: 10 } }
        - { name: tags, in: query, schema: { type: array, items: { type: string } } }
        - { name: ids, in: query, style: pipeDelimited, schema: { type: array, items: { type: integer } } }
        - { name: filter, in: query, style: deepObject, schema: { type: object, properties: { age: { type: integer } } } }
      responses: { "200": { description: ok } }
  /items/{id}:
    get:
      parameters:
        - { name: id, in: path, required: true, schema: { type: integer } }
        - { name: X-Trace, in: header, required: true, schema: { type: string } }
      responses: { "200": { description: ok } }
"#;

    fn route(imp: Arc<dyn Implementation>, method: Method, path: &str) -> Arc<BoundRoute> {
        let model = crate::spec::load_str(SPEC).unwrap();
        let table = generate(&model, imp, "", None).unwrap();
        Arc::clone(table.find(&method, path).unwrap())
    }

    fn echo() -> Arc<dyn Implementation> {
        Arc::new(
            HandlerSet::new()
                .list(|call| {
                    let args: serde_json::Map<String, Value> = call
                        .args
                        .iter()
                        .map(|a| (a.name.clone(), a.value.clone().unwrap_or(Value::Null)))
                        .collect();
                    Ok(Reply::Value(Value::Object(args)))
                })
                .get(|_| panic!("boom")),
        )
    }

    #[test]
    fn query_shapes_are_coerced() {
        let r = route(echo(), Method::GET, "/items");
        let raw = RawRequest::new(
            Method::GET,
            "/items?tags=a&tags=b&ids=1|2&filter[age]=3",
        );
        let body = r.invoke(&raw).body().cloned().unwrap();
        assert_eq!(
            body,
            json!({ "limit": 10, "tags": ["a", "b"], "ids": [1, 2], "filter": { "age": 3 } })
        );
    }

    #[test]
    fn issues_accumulate_across_parameters() {
        let r = route(echo(), Method::GET, "/items/{id}");
        let raw = RawRequest::new(Method::GET, "/items/abc").with_path_param("id", "abc");
        let failure = r.invoke(&raw).failure().cloned().unwrap();
        assert_eq!(failure.kind, ErrorKind::Validation);
        let paths: Vec<&str> = failure.issues.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["path.id", "header.X-Trace"]);
    }

    #[test]
    fn panics_become_internal_failures() {
        let r = route(echo(), Method::GET, "/items/{id}");
        let raw = RawRequest::new(Method::GET, "/items/1")
            .with_path_param("id", "1")
            .with_header("x-trace", "t");
        let outcome = r.invoke(&raw);
        assert_eq!(outcome.status(), 500);
        assert_eq!(outcome.failure().unwrap().kind, ErrorKind::Internal);
    }

    #[test]
    fn label_and_matrix_prefixes() {
        let ex = ParameterExtractor {
            name: "id".into(),
            location: ParameterLocation::Path,
            schema: Arc::new(crate::spec::SchemaNode::any()),
            required: true,
            style: ParameterStyle::Matrix,
            explode: false,
        };
        assert_eq!(strip_style_prefix(&ex, ";id=5"), "5");
        let label = ParameterExtractor {
            style: ParameterStyle::Label,
            ..ex
        };
        assert_eq!(strip_style_prefix(&label, ".5"), "5");
    }
}
