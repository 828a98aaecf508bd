//! Response contract checking and reshaping.
//!
//! The implementation's result is looked up against the operation's responses (exact
//! code, then `NXX` range, then `default`), validated outbound and reshaped: undeclared
//! keys are stripped and defaults of omitted required keys are filled. A result that
//! still violates the schema is a [`ErrorKind::ResponseSchemaViolation`], never a
//! client error.
//!
//! Error statuses (400 and up) skip the schema and are shaped into RFC 9457 problem
//! details instead: a bare string becomes the `title`, an object keeps its members and
//! gains whichever of `type`, `title` and `status` it lacks.
//!
//! [`ErrorKind::ResponseSchemaViolation`]: crate::errors::ErrorKind::ResponseSchemaViolation

use crate::errors::{Failure, FinalResponse};
use crate::implementation::Reply;
use crate::spec::{Operation, ResponseDef};
use crate::validator::validate_outbound;
use http::Method;
use serde_json::Value;
use tracing::{debug, error};

const JSON: &str = "application/json";
const PROBLEM_JSON: &str = "application/problem+json";

/// Status used when an implementation returns a bare value.
pub fn default_status(method: &Method) -> u16 {
    match method.as_str() {
        "POST" => 201,
        "DELETE" => 204,
        _ => 200,
    }
}

/// Resolve the status for `reply`, pick the matching response entry and finalise.
pub fn finalize(operation: &Operation, reply: Reply) -> Result<FinalResponse, Failure> {
    let status = reply
        .explicit_status()
        .unwrap_or_else(|| default_status(&operation.method));
    let value = reply.into_value();
    finalize_with(operation.response_for(status), status, value).map_err(|issues| {
        error!(
            operation = %operation.label(),
            status,
            issues = ?issues,
            "implementation result violates its response schema"
        );
        Failure::response_violation(&operation.label(), status, issues)
    })
}

/// Check `value` against `def`. With no entry, or an entry without a schema, the
/// value passes through unchanged.
pub fn finalize_with(
    def: Option<&ResponseDef>,
    status: u16,
    value: Value,
) -> Result<FinalResponse, Vec<crate::validator::ValidationIssue>> {
    if is_bodiless(status) {
        if !value.is_null() {
            debug!(status, "dropping body of bodiless response");
        }
        return Ok(FinalResponse {
            status,
            content_type: None,
            body: None,
        });
    }

    if is_error_status(status) {
        return Ok(FinalResponse {
            status,
            content_type: Some(PROBLEM_JSON.to_string()),
            body: Some(to_problem(value, status)),
        });
    }

    let content_type = def
        .and_then(ResponseDef::content_type)
        .unwrap_or(JSON)
        .to_string();

    let body = match def.and_then(ResponseDef::json_schema) {
        Some(schema) => validate_outbound(schema, &value)?,
        None => value,
    };

    Ok(FinalResponse {
        status,
        content_type: Some(content_type),
        body: Some(body),
    })
}

fn is_bodiless(status: u16) -> bool {
    status == 204 || status == 304 || (100..200).contains(&status)
}

pub fn is_error_status(status: u16) -> bool {
    status >= 400
}

/// Shape an implementation's error body as problem details.
fn to_problem(value: Value, status: u16) -> Value {
    let mut problem = match value {
        Value::Object(map) => map,
        Value::String(title) => return bare_problem(title, status),
        Value::Null => {
            let title = http::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or(FALLBACK_TITLE);
            return bare_problem(title.to_string(), status);
        }
        other => return bare_problem(other.to_string(), status),
    };

    if !problem.contains_key("type") {
        problem.insert("type".to_string(), Value::from("about:blank"));
    }
    if !problem.contains_key("title") {
        let title = ["message", "error", "detail"]
            .iter()
            .filter_map(|key| problem.get(*key).and_then(Value::as_str))
            .find(|s| !s.is_empty())
            .unwrap_or(FALLBACK_TITLE)
            .to_string();
        problem.insert("title".to_string(), Value::from(title));
    }
    if !problem.contains_key("status") {
        problem.insert("status".to_string(), Value::from(status));
    }
    Value::Object(problem)
}

const FALLBACK_TITLE: &str = "An error occurred";

fn bare_problem(title: String, status: u16) -> Value {
    serde_json::json!({ "type": "about:blank", "title": title, "status": status })
}
