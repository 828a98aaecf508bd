//! # Schema Validator / Coercer
//!
//! One engine serves both directions:
//!
//! - [`Direction::Inbound`] checks request values. Values from text sources (path, query,
//!   header, cookie) are coerced to the declared scalar type first; undeclared object keys
//!   are rejected unless the schema allows them.
//! - [`Direction::Outbound`] checks implementation results. Nothing is coerced from
//!   strings; undeclared keys are stripped and missing required keys are filled from
//!   their declared defaults.
//!
//! Failures are accumulated, never short-circuited, so one call reports every defect.
//!
//! ```
//! use autoroute::spec::{SchemaKind, SchemaNode};
//! use autoroute::validator::{validate_and_coerce, SourceKind};
//! use serde_json::json;
//!
//! let schema = SchemaNode::new(SchemaKind::Integer);
//! let value = validate_and_coerce(&schema, &json!("42"), SourceKind::Query).unwrap();
//! assert_eq!(value, json!(42));
//!
//! let issues = validate_and_coerce(&schema, &json!("abc"), SourceKind::Path).unwrap_err();
//! assert_eq!(issues[0].path, "path");
//! ```

pub(crate) mod coerce;

use crate::spec::{AdditionalProperties, ParameterLocation, SchemaKind, SchemaNode, SchemaRef};
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());
static UUID_RE: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .ok()
});

/// Where a raw value came from; decides which representations are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Path,
    Query,
    Header,
    Cookie,
    Body,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Path => "path",
            SourceKind::Query => "query",
            SourceKind::Header => "header",
            SourceKind::Cookie => "cookie",
            SourceKind::Body => "body",
        }
    }

    /// Text sources deliver strings that must be coerced.
    pub fn is_text(&self) -> bool {
        !matches!(self, SourceKind::Body)
    }
}

impl From<ParameterLocation> for SourceKind {
    fn from(loc: ParameterLocation) -> Self {
        match loc {
            ParameterLocation::Path => SourceKind::Path,
            ParameterLocation::Query => SourceKind::Query,
            ParameterLocation::Header => SourceKind::Header,
            ParameterLocation::Cookie => SourceKind::Cookie,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// One violated constraint: `path` names the field (`body.tags[2]`, `query.limit`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Validate an inbound value and return its coerced form.
///
/// Failure paths are rooted at the source name (`query`, `body`, ..); use
/// [`Validator::run`] to root them at a parameter (`query.limit`).
pub fn validate_and_coerce(
    schema: &SchemaNode,
    raw: &Value,
    source: SourceKind,
) -> Result<Value, Vec<ValidationIssue>> {
    Validator::inbound(source).run(schema, raw, source.as_str())
}

/// Check and reshape an implementation result against its response schema.
pub fn validate_outbound(schema: &SchemaNode, raw: &Value) -> Result<Value, Vec<ValidationIssue>> {
    Validator::outbound().run(schema, raw, "body")
}

#[derive(Debug, Clone, Copy)]
pub struct Validator {
    source: SourceKind,
    direction: Direction,
}

impl Validator {
    pub fn inbound(source: SourceKind) -> Self {
        Self {
            source,
            direction: Direction::Inbound,
        }
    }

    pub fn outbound() -> Self {
        Self {
            source: SourceKind::Body,
            direction: Direction::Outbound,
        }
    }

    pub fn run(
        &self,
        schema: &SchemaNode,
        raw: &Value,
        root: &str,
    ) -> Result<Value, Vec<ValidationIssue>> {
        let mut walk = Walk {
            v: *self,
            issues: Vec::new(),
        };
        let value = walk.check(schema, raw, root, None);
        if walk.issues.is_empty() {
            Ok(value)
        } else {
            Err(walk.issues)
        }
    }

    fn coerces(&self) -> bool {
        self.direction == Direction::Inbound && self.source.is_text()
    }
}

struct Walk {
    v: Validator,
    issues: Vec<ValidationIssue>,
}

impl Walk {
    fn fail(&mut self, path: &str, message: impl Into<String>) {
        self.issues.push(ValidationIssue::new(path, message));
    }

    fn mismatch(&mut self, path: &str, expected: &str, raw: &Value) {
        self.fail(path, format!("expected {expected}, got {}", describe(raw)));
    }

    /// Returns the coerced value; on failure records issues and returns the raw value.
    ///
    /// `tolerated` names object keys that belong to sibling `allOf` branches: they are
    /// accepted and dropped from this branch's output.
    fn check(
        &mut self,
        schema: &SchemaNode,
        raw: &Value,
        path: &str,
        tolerated: Option<&BTreeSet<String>>,
    ) -> Value {
        if raw.is_null() {
            return match schema.kind {
                SchemaKind::Null | SchemaKind::Any => Value::Null,
                _ if schema.nullable => Value::Null,
                _ => {
                    self.mismatch(path, schema.type_name(), raw);
                    Value::Null
                }
            };
        }

        let before = self.issues.len();
        let value = match &schema.kind {
            SchemaKind::Any => raw.clone(),
            SchemaKind::Null => self.null(raw, path),
            SchemaKind::Boolean => self.boolean(raw, path),
            SchemaKind::Integer => self.integer(schema, raw, path),
            SchemaKind::Number => self.number(raw, path),
            SchemaKind::String => self.string(schema, raw, path),
            SchemaKind::Array { items } => self.array(schema, items.as_ref(), raw, path),
            SchemaKind::Object {
                properties,
                required,
                additional,
            } => self.object(properties, required, additional, raw, path, tolerated),
            SchemaKind::OneOf(branches) | SchemaKind::AnyOf(branches) => {
                self.any_branch(branches, raw, path, tolerated)
            }
            SchemaKind::AllOf(branches) => self.all_branches(branches, raw, path, tolerated),
        };
        if self.issues.len() == before {
            self.common(schema, &value, path);
        }
        value
    }

    fn null(&mut self, raw: &Value, path: &str) -> Value {
        if self.v.coerces() && raw.as_str() == Some("null") {
            return Value::Null;
        }
        self.mismatch(path, "null", raw);
        raw.clone()
    }

    fn boolean(&mut self, raw: &Value, path: &str) -> Value {
        match raw {
            Value::Bool(_) => raw.clone(),
            Value::String(s) if self.v.coerces() => coerce::to_boolean(s).unwrap_or_else(|| {
                self.mismatch(path, "boolean", raw);
                raw.clone()
            }),
            _ => {
                self.mismatch(path, "boolean", raw);
                raw.clone()
            }
        }
    }

    fn integer(&mut self, schema: &SchemaNode, raw: &Value, path: &str) -> Value {
        let coerced = match raw {
            Value::Number(_) => coerce::integral(raw),
            Value::String(s) if self.v.coerces() => coerce::to_integer(s),
            _ => None,
        };
        let Some(value) = coerced else {
            self.mismatch(path, "integer", raw);
            return raw.clone();
        };
        if schema.format.as_deref() == Some("int32") {
            let fits = value
                .as_i64()
                .map(|i| i32::try_from(i).is_ok())
                .unwrap_or(false);
            if !fits {
                self.fail(path, "value is out of range for int32");
            }
        }
        value
    }

    fn number(&mut self, raw: &Value, path: &str) -> Value {
        match raw {
            Value::Number(_) => raw.clone(),
            Value::String(s) if self.v.coerces() => coerce::to_number(s).unwrap_or_else(|| {
                self.mismatch(path, "number", raw);
                raw.clone()
            }),
            _ => {
                self.mismatch(path, "number", raw);
                raw.clone()
            }
        }
    }

    fn string(&mut self, schema: &SchemaNode, raw: &Value, path: &str) -> Value {
        let Value::String(s) = raw else {
            self.mismatch(path, "string", raw);
            return raw.clone();
        };
        let c = &schema.constraints;
        let len = s.chars().count();
        if let Some(min) = c.min_length {
            if len < min {
                self.fail(path, format!("must be at least {min} characters long"));
            }
        }
        if let Some(max) = c.max_length {
            if len > max {
                self.fail(path, format!("must be at most {max} characters long"));
            }
        }
        if let Some(re) = &c.pattern {
            if !re.is_match(s) {
                self.fail(path, format!("does not match pattern '{}'", re.as_str()));
            }
        }
        if let Some(format) = schema.format.as_deref() {
            if !format_matches(format, s) {
                self.fail(path, format!("is not a valid {format}"));
            }
        }
        raw.clone()
    }

    fn array(
        &mut self,
        schema: &SchemaNode,
        items: Option<&SchemaRef>,
        raw: &Value,
        path: &str,
    ) -> Value {
        let split;
        let elements = match raw {
            Value::Array(a) => a,
            Value::String(s) if self.v.coerces() => {
                split = coerce::to_array(s, ',');
                match &split {
                    Value::Array(a) => a,
                    _ => return raw.clone(),
                }
            }
            _ => {
                self.mismatch(path, "array", raw);
                return raw.clone();
            }
        };

        let out: Vec<Value> = elements
            .iter()
            .enumerate()
            .map(|(i, el)| match items {
                Some(item_schema) => self.check(item_schema, el, &format!("{path}[{i}]"), None),
                None => el.clone(),
            })
            .collect();

        let c = &schema.constraints;
        if let Some(min) = c.min_items {
            if out.len() < min {
                self.fail(path, format!("must contain at least {min} items"));
            }
        }
        if let Some(max) = c.max_items {
            if out.len() > max {
                self.fail(path, format!("must contain at most {max} items"));
            }
        }
        if c.unique_items {
            let duplicate = out
                .iter()
                .enumerate()
                .any(|(i, a)| out[..i].iter().any(|b| values_equal(a, b)));
            if duplicate {
                self.fail(path, "items must be unique");
            }
        }
        Value::Array(out)
    }

    fn object(
        &mut self,
        properties: &[(String, SchemaRef)],
        required: &BTreeSet<String>,
        additional: &AdditionalProperties,
        raw: &Value,
        path: &str,
        tolerated: Option<&BTreeSet<String>>,
    ) -> Value {
        let parsed;
        let map = match raw {
            Value::Object(m) => m,
            Value::String(s) if self.v.coerces() => match coerce::to_object(s) {
                Some(v) => {
                    parsed = v;
                    match &parsed {
                        Value::Object(m) => m,
                        _ => return raw.clone(),
                    }
                }
                None => {
                    self.mismatch(path, "object", raw);
                    return raw.clone();
                }
            },
            _ => {
                self.mismatch(path, "object", raw);
                return raw.clone();
            }
        };

        let inbound = self.v.direction == Direction::Inbound;
        let mut out = Map::new();
        for (name, prop) in properties {
            let child_path = format!("{path}.{name}");
            match map.get(name) {
                Some(value) => {
                    let checked = self.check(prop, value, &child_path, None);
                    out.insert(name.clone(), checked);
                }
                None if required.contains(name) => match (&prop.default, inbound) {
                    (Some(default), false) => {
                        let filled = self.check(prop, default, &child_path, None);
                        out.insert(name.clone(), filled);
                    }
                    _ => self.fail(&child_path, "required property is missing"),
                },
                None => {
                    if let Some(default) = &prop.default {
                        out.insert(name.clone(), default.clone());
                    }
                }
            }
        }

        for name in required {
            if properties.iter().all(|(k, _)| k != name) && !map.contains_key(name) {
                self.fail(&format!("{path}.{name}"), "required property is missing");
            }
        }

        for (name, value) in map {
            if properties.iter().any(|(k, _)| k == name) {
                continue;
            }
            if tolerated.map(|t| t.contains(name)).unwrap_or(false) {
                continue;
            }
            let child_path = format!("{path}.{name}");
            match additional {
                AdditionalProperties::Allow => {
                    out.insert(name.clone(), value.clone());
                }
                AdditionalProperties::Schema(extra) => {
                    let checked = self.check(extra, value, &child_path, None);
                    out.insert(name.clone(), checked);
                }
                AdditionalProperties::Deny if inbound => {
                    self.fail(&child_path, "property is not allowed");
                }
                AdditionalProperties::Deny => {}
            }
        }
        Value::Object(out)
    }

    fn any_branch(
        &mut self,
        branches: &[SchemaRef],
        raw: &Value,
        path: &str,
        tolerated: Option<&BTreeSet<String>>,
    ) -> Value {
        for branch in branches {
            let mut trial = Walk {
                v: self.v,
                issues: Vec::new(),
            };
            let value = trial.check(branch, raw, path, tolerated);
            if trial.issues.is_empty() {
                return value;
            }
        }
        self.fail(
            path,
            format!("does not match any of the {} allowed schemas", branches.len()),
        );
        raw.clone()
    }

    fn all_branches(
        &mut self,
        branches: &[SchemaRef],
        raw: &Value,
        path: &str,
        tolerated: Option<&BTreeSet<String>>,
    ) -> Value {
        let mut siblings = BTreeSet::new();
        for branch in branches {
            declared_keys(branch, &mut siblings);
        }
        if let Some(t) = tolerated {
            siblings.extend(t.iter().cloned());
        }

        let before = self.issues.len();
        let mut merged: Option<Value> = None;
        for branch in branches {
            let value = self.check(branch, raw, path, Some(&siblings));
            match merged.as_mut() {
                Some(acc) => deep_merge(acc, value),
                None => merged = Some(value),
            }
        }

        // Branches sharing a constraint report it once.
        let mut seen = HashSet::new();
        let reported = self.issues.split_off(before);
        self.issues.extend(
            reported
                .into_iter()
                .filter(|i| seen.insert((i.path.clone(), i.message.clone()))),
        );
        merged.unwrap_or_else(|| raw.clone())
    }

    fn common(&mut self, schema: &SchemaNode, value: &Value, path: &str) {
        let c = &schema.constraints;
        if let Some(n) = value.as_f64().filter(|_| value.is_number()) {
            if let Some(min) = c.minimum {
                if n < min {
                    self.fail(path, format!("must be >= {min}"));
                }
            }
            if let Some(max) = c.maximum {
                if n > max {
                    self.fail(path, format!("must be <= {max}"));
                }
            }
            if let Some(min) = c.exclusive_minimum {
                if n <= min {
                    self.fail(path, format!("must be > {min}"));
                }
            }
            if let Some(max) = c.exclusive_maximum {
                if n >= max {
                    self.fail(path, format!("must be < {max}"));
                }
            }
            if let Some(m) = c.multiple_of {
                let q = n / m;
                if (q - q.round()).abs() > 1e-9 {
                    self.fail(path, format!("must be a multiple of {m}"));
                }
            }
        }
        if let Some(allowed) = &c.enum_values {
            if !allowed.iter().any(|a| values_equal(a, value)) {
                let listed: Vec<String> = allowed.iter().map(Value::to_string).collect();
                self.fail(path, format!("must be one of [{}]", listed.join(", ")));
            }
        }
        if let Some(expected) = &c.const_value {
            if !values_equal(expected, value) {
                self.fail(path, format!("must equal {expected}"));
            }
        }
    }
}

fn declared_keys(schema: &SchemaNode, out: &mut BTreeSet<String>) {
    match &schema.kind {
        SchemaKind::Object { properties, .. } => {
            out.extend(properties.iter().map(|(k, _)| k.clone()));
        }
        SchemaKind::OneOf(bs) | SchemaKind::AnyOf(bs) | SchemaKind::AllOf(bs) => {
            for b in bs {
                declared_keys(b, out);
            }
        }
        _ => {}
    }
}

/// Objects merge key by key; anything else is replaced by the later value.
fn deep_merge(into: &mut Value, from: Value) {
    match (into, from) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, v) in b {
                match a.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        a.insert(k, v);
                    }
                }
            }
        }
        (slot, other) => *slot = other,
    }
}

/// JSON equality where `1` and `1.0` are the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q))
        }
        _ => a == b,
    }
}

fn format_matches(format: &str, s: &str) -> bool {
    match format {
        "date-time" => DateTime::parse_from_rfc3339(s).is_ok(),
        "date" => NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        "email" => EMAIL_RE.as_ref().map(|re| re.is_match(s)).unwrap_or(true),
        "uuid" => UUID_RE.as_ref().map(|re| re.is_match(s)).unwrap_or(true),
        _ => true,
    }
}

fn describe(raw: &Value) -> String {
    match raw {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("\"{s}\""),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}
