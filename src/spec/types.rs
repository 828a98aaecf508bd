use super::{SecurityRequirement, SecurityScheme};
use http::Method;
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Shared handle to a resolved schema node.
///
/// Every `$ref` pointing at the same target resolves to the same `Arc`, so node
/// identity survives loading.
pub type SchemaRef = Arc<SchemaNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "path" => Some(ParameterLocation::Path),
            "query" => Some(ParameterLocation::Query),
            "header" => Some(ParameterLocation::Header),
            "cookie" => Some(ParameterLocation::Cookie),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Path => "path",
            ParameterLocation::Query => "query",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }
}

impl std::fmt::Display for ParameterLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    Matrix,
    Label,
    Form,
    Simple,
    SpaceDelimited,
    PipeDelimited,
    DeepObject,
}

impl ParameterStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matrix" => Some(ParameterStyle::Matrix),
            "label" => Some(ParameterStyle::Label),
            "form" => Some(ParameterStyle::Form),
            "simple" => Some(ParameterStyle::Simple),
            "spaceDelimited" => Some(ParameterStyle::SpaceDelimited),
            "pipeDelimited" => Some(ParameterStyle::PipeDelimited),
            "deepObject" => Some(ParameterStyle::DeepObject),
            _ => None,
        }
    }

    /// Delimiter used when an array value arrives as a single string.
    pub fn array_delimiter(&self) -> char {
        match self {
            ParameterStyle::SpaceDelimited => ' ',
            ParameterStyle::PipeDelimited => '|',
            ParameterStyle::Label => '.',
            ParameterStyle::Matrix => ';',
            _ => ',',
        }
    }
}

impl std::fmt::Display for ParameterStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParameterStyle::Matrix => "matrix",
            ParameterStyle::Label => "label",
            ParameterStyle::Form => "form",
            ParameterStyle::Simple => "simple",
            ParameterStyle::SpaceDelimited => "spaceDelimited",
            ParameterStyle::PipeDelimited => "pipeDelimited",
            ParameterStyle::DeepObject => "deepObject",
        };
        f.write_str(s)
    }
}

/// Policy for object keys that are not listed under `properties`.
#[derive(Debug, Clone)]
pub enum AdditionalProperties {
    /// Undeclared keys are rejected inbound and stripped outbound.
    Deny,
    /// Any undeclared key is accepted as-is.
    Allow,
    /// Undeclared keys must match this schema.
    Schema(SchemaRef),
}

#[derive(Debug, Clone)]
pub enum SchemaKind {
    /// No `type` and no structural hint: every value is accepted.
    Any,
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array {
        items: Option<SchemaRef>,
    },
    Object {
        /// Declared properties in document order.
        properties: Vec<(String, SchemaRef)>,
        required: BTreeSet<String>,
        additional: AdditionalProperties,
    },
    OneOf(Vec<SchemaRef>),
    AnyOf(Vec<SchemaRef>),
    AllOf(Vec<SchemaRef>),
}

/// Validation keywords that apply on top of the schema kind.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub multiple_of: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Regex>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    pub unique_items: bool,
    pub enum_values: Option<Vec<Value>>,
    pub const_value: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub kind: SchemaKind,
    pub nullable: bool,
    pub format: Option<String>,
    pub default: Option<Value>,
    pub constraints: Constraints,
    /// Component name when the node was reached through `#/components/schemas/<name>`.
    pub ref_name: Option<String>,
}

impl SchemaNode {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            nullable: false,
            format: None,
            default: None,
            constraints: Constraints::default(),
            ref_name: None,
        }
    }

    pub fn any() -> Self {
        Self::new(SchemaKind::Any)
    }

    /// Declared property schema, if this node is an object that lists `name`.
    pub fn property(&self, name: &str) -> Option<&SchemaRef> {
        match &self.kind {
            SchemaKind::Object { properties, .. } => {
                properties.iter().find(|(k, _)| k == name).map(|(_, s)| s)
            }
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            SchemaKind::Any => "any",
            SchemaKind::Null => "null",
            SchemaKind::Boolean => "boolean",
            SchemaKind::Integer => "integer",
            SchemaKind::Number => "number",
            SchemaKind::String => "string",
            SchemaKind::Array { .. } => "array",
            SchemaKind::Object { .. } => "object",
            SchemaKind::OneOf(_) => "oneOf",
            SchemaKind::AnyOf(_) => "anyOf",
            SchemaKind::AllOf(_) => "allOf",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterDef {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: SchemaRef,
    pub style: Option<ParameterStyle>,
    pub explode: Option<bool>,
}

impl ParameterDef {
    /// Style after applying the OpenAPI per-location default.
    pub fn effective_style(&self) -> ParameterStyle {
        self.style.unwrap_or(match self.location {
            ParameterLocation::Query | ParameterLocation::Cookie => ParameterStyle::Form,
            ParameterLocation::Path | ParameterLocation::Header => ParameterStyle::Simple,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RequestBodyDef {
    pub required: bool,
    /// Schemas keyed by content type, in document order.
    pub content: Vec<(String, SchemaRef)>,
}

impl RequestBodyDef {
    /// Schema for `application/json`, else the first declared content type.
    pub fn json_schema(&self) -> Option<&SchemaRef> {
        self.content
            .iter()
            .find(|(ct, _)| is_json_media_type(ct))
            .or_else(|| self.content.first())
            .map(|(_, s)| s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKey {
    Code(u16),
    /// `1XX`..`5XX`, holding the leading digit.
    Range(u16),
    Default,
}

impl ResponseKey {
    pub fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("default") {
            return Some(ResponseKey::Default);
        }
        if s.len() == 3 && s[1..].eq_ignore_ascii_case("xx") {
            return s[..1]
                .parse::<u16>()
                .ok()
                .filter(|d| (1..=5).contains(d))
                .map(ResponseKey::Range);
        }
        s.parse::<u16>()
            .ok()
            .filter(|c| (100..=599).contains(c))
            .map(ResponseKey::Code)
    }
}

impl std::fmt::Display for ResponseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseKey::Code(c) => write!(f, "{c}"),
            ResponseKey::Range(d) => write!(f, "{d}XX"),
            ResponseKey::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResponseDef {
    pub key: ResponseKey,
    pub description: Option<String>,
    pub content: Vec<(String, SchemaRef)>,
}

impl ResponseDef {
    pub fn json_schema(&self) -> Option<&SchemaRef> {
        self.content
            .iter()
            .find(|(ct, _)| is_json_media_type(ct))
            .or_else(|| self.content.first())
            .map(|(_, s)| s)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|(ct, _)| is_json_media_type(ct))
            .or_else(|| self.content.first())
            .map(|(ct, _)| ct.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub method: Method,
    pub path_template: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub deprecated: bool,
    /// Path-level and operation-level parameters, merged, in declared order.
    pub parameters: Vec<ParameterDef>,
    pub request_body: Option<RequestBodyDef>,
    pub responses: Vec<ResponseDef>,
    /// `None`: nothing declared. `Some(empty)`: explicitly public.
    pub security: Option<Vec<SecurityRequirement>>,
}

impl Operation {
    /// `"GET /items/{id}"`, used in logs and error messages.
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path_template)
    }

    /// True when the template's last segment is a `{placeholder}`.
    pub fn is_item_path(&self) -> bool {
        self.path_template
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .map(|seg| seg.starts_with('{') && seg.ends_with('}'))
            .unwrap_or(false)
    }

    /// Response entry for `status`: exact code, then `NXX` range, then `default`.
    pub fn response_for(&self, status: u16) -> Option<&ResponseDef> {
        self.responses
            .iter()
            .find(|r| r.key == ResponseKey::Code(status))
            .or_else(|| {
                self.responses
                    .iter()
                    .find(|r| r.key == ResponseKey::Range(status / 100))
            })
            .or_else(|| self.responses.iter().find(|r| r.key == ResponseKey::Default))
    }
}

/// Fully resolved, read-only form of one OpenAPI document.
#[derive(Debug, Clone)]
pub struct SpecModel {
    pub title: String,
    pub version: String,
    /// Path component of `servers[0].url`, without trailing slash.
    pub base_path: String,
    pub operations: Vec<Operation>,
    pub security_schemes: HashMap<String, SecurityScheme>,
}

impl SpecModel {
    pub fn operation(&self, method: &Method, path_template: &str) -> Option<&Operation> {
        self.operations
            .iter()
            .find(|op| op.method == *method && op.path_template == path_template)
    }
}

/// `application/json`, with parameters, or any `+json` suffix type.
pub fn is_json_media_type(ct: &str) -> bool {
    let ct = ct.split(';').next().unwrap_or("").trim();
    ct.eq_ignore_ascii_case("application/json") || ct.ends_with("+json")
}

/// Placeholder names of a path template, in order: `/a/{x}/b/{y}` → `["x", "y"]`.
pub fn path_placeholders(template: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                out.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_key_parsing() {
        assert_eq!(ResponseKey::parse("200"), Some(ResponseKey::Code(200)));
        assert_eq!(ResponseKey::parse("2XX"), Some(ResponseKey::Range(2)));
        assert_eq!(ResponseKey::parse("4xx"), Some(ResponseKey::Range(4)));
        assert_eq!(ResponseKey::parse("default"), Some(ResponseKey::Default));
        assert_eq!(ResponseKey::parse("abc"), None);
        assert_eq!(ResponseKey::parse("9XX"), None);
    }

    #[test]
    fn placeholders_in_order() {
        assert_eq!(path_placeholders("/org/{org}/users/{id}"), vec!["org", "id"]);
        assert!(path_placeholders("/items").is_empty());
    }

    #[test]
    fn json_media_types() {
        assert!(is_json_media_type("application/json"));
        assert!(is_json_media_type("application/json; charset=utf-8"));
        assert!(is_json_media_type("application/problem+json"));
        assert!(!is_json_media_type("text/plain"));
    }
}
