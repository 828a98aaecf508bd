use crate::errors::{ErrorKind, Failure, FinalResponse, Outcome};
use http::Method;
use may_minihttp::Response;
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Mutex;

const JSON: &str = "Content-Type: application/json";
const PROBLEM_JSON: &str = "Content-Type: application/problem+json";

/// `may_minihttp` takes `&'static str` header lines. Dynamic lines are leaked once and
/// reused, so the set stays bounded by the distinct values actually sent.
static HEADER_LINES: Lazy<Mutex<HashSet<&'static str>>> = Lazy::new(|| Mutex::new(HashSet::new()));

fn header_line(line: String) -> Option<&'static str> {
    let mut lines = HEADER_LINES.lock().ok()?;
    if let Some(existing) = lines.get(line.as_str()) {
        return Some(existing);
    }
    let leaked: &'static str = Box::leak(line.into_boxed_str());
    lines.insert(leaked);
    Some(leaked)
}

pub(crate) fn status_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

pub fn write_outcome(res: &mut Response, outcome: &Outcome) {
    match outcome {
        Outcome::Success(response) => write_final(res, response),
        Outcome::Failure(failure) => write_failure(res, failure),
    }
}

pub fn write_final(res: &mut Response, response: &FinalResponse) {
    res.status_code(response.status as usize, status_reason(response.status));
    let Some(body) = &response.body else {
        return;
    };
    let content_type = response.content_type.as_deref().unwrap_or("application/json");
    match body {
        Value::String(text) if !crate::spec::is_json_media_type(content_type) => {
            if let Some(line) = header_line(format!("Content-Type: {content_type}")) {
                res.header(line);
            }
            res.body_vec(text.clone().into_bytes());
        }
        other => {
            let line = match content_type {
                "application/json" => Some(JSON),
                "application/problem+json" => Some(PROBLEM_JSON),
                _ if crate::spec::is_json_media_type(content_type) => {
                    header_line(format!("Content-Type: {content_type}"))
                }
                _ => Some(JSON),
            };
            if let Some(line) = line {
                res.header(line);
            }
            res.body_vec(other.to_string().into_bytes());
        }
    }
}

pub fn write_failure(res: &mut Response, failure: &Failure) {
    write_problem(res, failure.status(), failure.to_problem());
}

pub fn write_not_found(res: &mut Response, method: &Method, path: &str) {
    let failure = Failure::new(ErrorKind::NotFound, format!("no route for {method} {path}"));
    write_failure(res, &failure);
}

pub fn write_method_not_allowed(res: &mut Response, method: &Method, path: &str, allowed: &[Method]) {
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if let Some(line) = header_line(format!("Allow: {allow}")) {
        res.header(line);
    }
    write_problem(
        res,
        405,
        json!({
            "type": "/errors/method_not_allowed",
            "title": "Method Not Allowed",
            "status": 405,
            "detail": format!("{method} is not allowed on {path}"),
        }),
    );
}

fn write_problem(res: &mut Response, status: u16, body: Value) {
    res.status_code(status as usize, status_reason(status));
    res.header(PROBLEM_JSON);
    res.body_vec(body.to_string().into_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_follow_the_status_registry() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(204), "No Content");
        assert_eq!(status_reason(422), "Unprocessable Entity");
        assert_eq!(status_reason(599), "Unknown");
    }

    #[test]
    fn header_lines_are_interned() {
        let a = header_line("Allow: GET".to_string()).unwrap();
        let b = header_line("Allow: GET".to_string()).unwrap();
        assert!(std::ptr::eq(a, b));
    }
}
