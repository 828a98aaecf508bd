//! # Error Taxonomy
//!
//! Every failure the pipeline can produce is classified once, where it originates, into a
//! closed [`ErrorKind`]. The kind fixes the HTTP status and the problem-details slug;
//! nothing downstream re-classifies it.
//!
//! | Kind | Status |
//! |---|---|
//! | `Validation` | 422 |
//! | `NotFound` | 404 |
//! | `Conflict` | 409 |
//! | `Unauthorized` | 401 |
//! | `Forbidden` | 403 |
//! | `Business` | 400 |
//! | `RateLimited` | 429 |
//! | `NotImplemented` | 501 |
//! | `ServiceUnavailable` | 503 |
//! | `ResponseSchemaViolation` | 500 |
//! | `Internal` | 500 |
//!
//! Failures are rendered as RFC 9457 problem details by [`Failure::to_problem`].
//! Internal failures and response-contract violations keep their diagnostic detail for
//! logging but render a generic message to the caller.

use crate::validator::ValidationIssue;
use serde_json::{json, Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Unauthorized,
    Forbidden,
    Business,
    RateLimited,
    NotImplemented,
    ServiceUnavailable,
    ResponseSchemaViolation,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            ErrorKind::Validation => 422,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Forbidden => 403,
            ErrorKind::Business => 400,
            ErrorKind::RateLimited => 429,
            ErrorKind::NotImplemented => 501,
            ErrorKind::ServiceUnavailable => 503,
            ErrorKind::ResponseSchemaViolation | ErrorKind::Internal => 500,
        }
    }

    /// Last segment of the problem `type` URI.
    #[must_use]
    pub fn slug(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Business => "business_error",
            ErrorKind::RateLimited => "rate_limit",
            ErrorKind::NotImplemented => "not_implemented",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::ResponseSchemaViolation | ErrorKind::Internal => "internal_server_error",
        }
    }

    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "Validation",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Conflict => "Conflict",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::Business => "Business",
            ErrorKind::RateLimited => "RateLimit",
            ErrorKind::NotImplemented => "Not Implemented",
            ErrorKind::ServiceUnavailable => "ServiceUnavailable",
            ErrorKind::ResponseSchemaViolation | ErrorKind::Internal => "Internal Server Error",
        }
    }

    /// Server-side faults whose detail must not be shown to the caller.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            ErrorKind::ResponseSchemaViolation | ErrorKind::Internal
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Error raised by implementation code.
///
/// Build one with the kind-specific constructors and return it from an implementation
/// method; the processor converts it into the matching [`Failure`].
///
/// ```
/// use autoroute::errors::{DomainError, ErrorKind};
/// use serde_json::json;
///
/// let err = DomainError::not_found("Item 999 not found").with_extra("item_id", json!("999"));
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.kind().status(), 404);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DomainError {
    kind: ErrorKind,
    detail: String,
    extra: Map<String, Value>,
}

impl DomainError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        // Only the pipeline itself may claim a response contract violation.
        let kind = match kind {
            ErrorKind::ResponseSchemaViolation => ErrorKind::Internal,
            k => k,
        };
        Self {
            kind,
            detail: detail.into(),
            extra: Map::new(),
        }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, detail)
    }

    /// Generic caller-supplied domain rule violation (400).
    pub fn business(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Business, detail)
    }

    pub fn rate_limited(detail: impl Into<String>, retry_after: Option<u64>) -> Self {
        let err = Self::new(ErrorKind::RateLimited, detail);
        match retry_after {
            Some(secs) => err.with_extra("retry_after", Value::from(secs)),
            None => err,
        }
    }

    pub fn not_implemented(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotImplemented, detail)
    }

    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServiceUnavailable, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    /// Attach an extra member to the problem-details body.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    #[must_use]
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}

impl fmt::Display for DomainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.title(), self.detail)
    }
}

impl std::error::Error for DomainError {}

/// A classified per-request failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub detail: String,
    /// Every violated field, for `Validation` and `ResponseSchemaViolation`.
    pub issues: Vec<ValidationIssue>,
    pub extra: Map<String, Value>,
}

impl Failure {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
            issues: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        let detail = match issues.len() {
            1 => "1 validation error".to_string(),
            n => format!("{n} validation errors"),
        };
        Self {
            kind: ErrorKind::Validation,
            detail,
            issues,
            extra: Map::new(),
        }
    }

    pub fn response_violation(operation: &str, status: u16, issues: Vec<ValidationIssue>) -> Self {
        Self {
            kind: ErrorKind::ResponseSchemaViolation,
            detail: format!(
                "{operation} returned a {status} body that violates its declared schema"
            ),
            issues,
            extra: Map::new(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, detail)
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.kind.status()
    }

    /// RFC 9457 problem-details body.
    #[must_use]
    pub fn to_problem(&self) -> Value {
        let mut body = Map::new();
        body.insert(
            "type".to_string(),
            Value::String(format!("/errors/{}", self.kind.slug())),
        );
        body.insert("title".to_string(), Value::String(self.kind.title().to_string()));
        body.insert("status".to_string(), Value::from(self.status()));

        let detail = match self.kind {
            ErrorKind::ResponseSchemaViolation => {
                "The server produced an invalid response".to_string()
            }
            ErrorKind::Internal => "An unexpected error occurred".to_string(),
            _ => self.detail.clone(),
        };
        body.insert("detail".to_string(), Value::String(detail));

        if self.kind == ErrorKind::Validation {
            let errors: Vec<Value> = self
                .issues
                .iter()
                .map(|i| json!({ "path": i.path, "message": i.message }))
                .collect();
            body.insert("errors".to_string(), Value::Array(errors));
        }

        if !self.kind.is_internal() {
            for (k, v) in &self.extra {
                body.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }
        Value::Object(body)
    }
}

impl From<DomainError> for Failure {
    fn from(err: DomainError) -> Self {
        Self {
            kind: err.kind,
            detail: err.detail,
            issues: Vec::new(),
            extra: err.extra,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind.title(), self.status(), self.detail)?;
        for issue in &self.issues {
            write!(f, "; {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Failure {}

/// Response that passed contract checking and reshaping.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResponse {
    pub status: u16,
    pub content_type: Option<String>,
    /// `None` for bodiless responses such as 204.
    pub body: Option<Value>,
}

/// Result of processing exactly one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(FinalResponse),
    Failure(Failure),
}

impl Outcome {
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Outcome::Success(r) => r.status,
            Outcome::Failure(f) => f.status(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Failure(f) => Some(f),
            Outcome::Success(_) => None,
        }
    }

    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        match self {
            Outcome::Success(r) => r.body.as_ref(),
            Outcome::Failure(_) => None,
        }
    }
}

/// Fatal error while turning a document into a [`crate::spec::SpecModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// A required section (`paths`, or at least one operation) is absent.
    MissingField { field: String },
    /// A `$ref` that does not resolve, or that is part of a cycle.
    BadReference { reference: String, reason: String },
    /// Structurally malformed input at `location`.
    InvalidDocument { location: String, message: String },
    /// A `{placeholder}` without a required path parameter, or the reverse.
    PathParameterMismatch { operation: String, parameter: String },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::MissingField { field } => {
                write!(f, "specification is missing required field '{field}'")
            }
            LoadError::BadReference { reference, reason } => {
                write!(f, "bad reference '{reference}': {reason}")
            }
            LoadError::InvalidDocument { location, message } => {
                write!(f, "invalid document at {location}: {message}")
            }
            LoadError::PathParameterMismatch {
                operation,
                parameter,
            } => write!(
                f,
                "{operation}: path placeholder '{parameter}' needs a required path parameter"
            ),
        }
    }
}

impl std::error::Error for LoadError {}

/// Fatal error while binding a model to an implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// No implementation method answers the operation.
    UnboundOperation {
        operation: String,
        /// Method the binding looked for; `None` when no convention applies.
        method: Option<String>,
    },
    /// The operation requires a security scheme with no registered strategy.
    UnknownSecurityScheme { operation: String, scheme: String },
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::UnboundOperation {
                operation,
                method: Some(method),
            } => write!(
                f,
                "{operation} is unbound: implementation exposes no '{method}' method"
            ),
            GenerationError::UnboundOperation {
                operation,
                method: None,
            } => write!(
                f,
                "{operation} is unbound: no operationId and no CRUD convention applies"
            ),
            GenerationError::UnknownSecurityScheme { operation, scheme } => write!(
                f,
                "{operation} requires security scheme '{scheme}' but no strategy is registered"
            ),
        }
    }
}

impl std::error::Error for GenerationError {}
