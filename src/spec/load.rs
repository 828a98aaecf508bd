use super::resolve::Resolver;
use super::schema::SchemaBuilder;
use super::types::{
    path_placeholders, Operation, ParameterDef, ParameterLocation, ParameterStyle,
    RequestBodyDef, ResponseDef, ResponseKey, SchemaNode, SchemaRef, SpecModel,
};
use super::{SecurityRequirement, SecurityScheme};
use crate::errors::LoadError;
use http::Method;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const METHODS: [&str; 8] = ["get", "put", "post", "delete", "options", "head", "patch", "trace"];

/// Decode YAML or JSON text and [`load`] it.
pub fn load_str(text: &str) -> Result<SpecModel, LoadError> {
    let document: Value = serde_yaml::from_str(text).map_err(|e| LoadError::InvalidDocument {
        location: "$".to_string(),
        message: e.to_string(),
    })?;
    load(&document)
}

/// Build a [`SpecModel`] from an already-decoded OpenAPI 3.x document.
///
/// Pure: touches neither the filesystem nor any global state.
pub fn load(document: &Value) -> Result<SpecModel, LoadError> {
    let root = document.as_object().ok_or_else(|| LoadError::InvalidDocument {
        location: "$".to_string(),
        message: "document root must be an object".to_string(),
    })?;

    match root.get("openapi").and_then(Value::as_str) {
        Some(v) if v.starts_with("3.") => {}
        Some(v) => {
            return Err(LoadError::InvalidDocument {
                location: "openapi".to_string(),
                message: format!("unsupported OpenAPI version '{v}'"),
            })
        }
        None => {
            return Err(LoadError::MissingField {
                field: "openapi".to_string(),
            })
        }
    }

    let info = root.get("info");
    let title = info
        .and_then(|i| i.get("title"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let version = info
        .and_then(|i| i.get("version"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut loader = Loader::new(document);
    let security_schemes = loader.security_schemes(root)?;
    let default_security = match root.get("security") {
        Some(raw) => Some(parse_security(raw, "security")?),
        None => None,
    };

    let paths = root
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| LoadError::MissingField {
            field: "paths".to_string(),
        })?;

    let mut operations = Vec::new();
    for (template, raw_item) in paths {
        if !template.starts_with('/') {
            return Err(LoadError::InvalidDocument {
                location: format!("paths.{template}"),
                message: "path templates must start with '/'".to_string(),
            });
        }
        let (item, _) = loader.resolver.follow(raw_item)?;
        let item = item.as_object().ok_or_else(|| LoadError::InvalidDocument {
            location: format!("paths.{template}"),
            message: "path item must be an object".to_string(),
        })?;

        let shared = loader.parameters(item.get("parameters"), &format!("paths.{template}"))?;

        for method_name in METHODS {
            let Some(raw_op) = item.get(method_name) else {
                continue;
            };
            let location = format!("paths.{template}.{method_name}");
            let op = raw_op.as_object().ok_or_else(|| LoadError::InvalidDocument {
                location: location.clone(),
                message: "operation must be an object".to_string(),
            })?;
            let operation = loader.operation(
                method_name,
                template,
                op,
                &shared,
                default_security.as_ref(),
                &location,
            )?;
            debug!(
                operation = %operation.label(),
                operation_id = operation.operation_id.as_deref().unwrap_or("-"),
                parameters = operation.parameters.len(),
                "loaded operation"
            );
            operations.push(operation);
        }
    }

    if operations.is_empty() {
        return Err(LoadError::MissingField {
            field: "paths.<operation>".to_string(),
        });
    }
    check_unique_operation_ids(&operations)?;

    let base_path = base_path(root);
    info!(
        title = %title,
        version = %version,
        base_path = %base_path,
        operations = operations.len(),
        "specification loaded"
    );

    Ok(SpecModel {
        title,
        version,
        base_path,
        operations,
        security_schemes,
    })
}

struct Loader<'a> {
    resolver: Resolver<'a>,
    schemas: SchemaBuilder<'a>,
}

impl<'a> Loader<'a> {
    fn new(document: &'a Value) -> Self {
        let resolver = Resolver::new(document);
        Self {
            resolver,
            schemas: SchemaBuilder::new(resolver),
        }
    }

    fn security_schemes(
        &mut self,
        root: &'a Map<String, Value>,
    ) -> Result<HashMap<String, SecurityScheme>, LoadError> {
        let mut out = HashMap::new();
        let Some(schemes) = root
            .get("components")
            .and_then(|c| c.get("securitySchemes"))
            .and_then(Value::as_object)
        else {
            return Ok(out);
        };
        for (name, raw) in schemes {
            let (raw, _) = self.resolver.follow(raw)?;
            let scheme: SecurityScheme =
                serde_json::from_value(raw.clone()).map_err(|e| LoadError::InvalidDocument {
                    location: format!("components.securitySchemes.{name}"),
                    message: e.to_string(),
                })?;
            out.insert(name.clone(), scheme);
        }
        Ok(out)
    }

    fn operation(
        &mut self,
        method_name: &str,
        template: &str,
        op: &'a Map<String, Value>,
        shared: &[ParameterDef],
        default_security: Option<&Vec<SecurityRequirement>>,
        location: &str,
    ) -> Result<Operation, LoadError> {
        let method = Method::from_bytes(method_name.to_ascii_uppercase().as_bytes()).map_err(|e| {
            LoadError::InvalidDocument {
                location: location.to_string(),
                message: e.to_string(),
            }
        })?;

        let own = self.parameters(op.get("parameters"), location)?;
        let parameters = merge_parameters(shared, own);
        check_path_parameters(&method, template, &parameters)?;

        let request_body = match op.get("requestBody") {
            Some(raw) => Some(self.request_body(raw, &format!("{location}.requestBody"))?),
            None => None,
        };

        let mut responses = Vec::new();
        if let Some(raw) = op.get("responses") {
            let map = raw.as_object().ok_or_else(|| LoadError::InvalidDocument {
                location: format!("{location}.responses"),
                message: "responses must be an object".to_string(),
            })?;
            for (key, raw_response) in map {
                let key_location = format!("{location}.responses.{key}");
                let key = ResponseKey::parse(key).ok_or_else(|| LoadError::InvalidDocument {
                    location: key_location.clone(),
                    message: format!("'{key}' is not a status code, range or 'default'"),
                })?;
                responses.push(self.response(key, raw_response, &key_location)?);
            }
        }

        let security = match op.get("security") {
            Some(raw) => Some(parse_security(raw, &format!("{location}.security"))?),
            None => default_security.cloned(),
        };

        Ok(Operation {
            method,
            path_template: template.to_string(),
            operation_id: op
                .get("operationId")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            summary: op.get("summary").and_then(Value::as_str).map(str::to_string),
            tags: op
                .get("tags")
                .and_then(Value::as_array)
                .map(|t| t.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            deprecated: op.get("deprecated").and_then(Value::as_bool).unwrap_or(false),
            parameters,
            request_body,
            responses,
            security,
        })
    }

    fn parameters(
        &mut self,
        raw: Option<&'a Value>,
        location: &str,
    ) -> Result<Vec<ParameterDef>, LoadError> {
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let list = raw.as_array().ok_or_else(|| LoadError::InvalidDocument {
            location: format!("{location}.parameters"),
            message: "parameters must be a list".to_string(),
        })?;
        list.iter()
            .enumerate()
            .map(|(i, p)| self.parameter(p, &format!("{location}.parameters[{i}]")))
            .collect()
    }

    fn parameter(&mut self, raw: &'a Value, location: &str) -> Result<ParameterDef, LoadError> {
        let (raw, _) = self.resolver.follow(raw)?;
        let invalid = |message: &str| LoadError::InvalidDocument {
            location: location.to_string(),
            message: message.to_string(),
        };

        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("parameter needs a 'name'"))?;
        let location_name = raw
            .get("in")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("parameter needs an 'in'"))?;
        let param_location = ParameterLocation::parse(location_name)
            .ok_or_else(|| invalid(&format!("unknown parameter location '{location_name}'")))?;

        let style = match raw.get("style").and_then(Value::as_str) {
            Some(s) => {
                Some(ParameterStyle::parse(s).ok_or_else(|| invalid(&format!("unknown style '{s}'")))?)
            }
            None => None,
        };

        // `content` is the alternative to `schema` for complex parameters.
        let schema = match raw.get("schema") {
            Some(schema) => self.schemas.build(schema, &format!("{location}.schema"))?,
            None => match raw
                .get("content")
                .and_then(Value::as_object)
                .and_then(|c| c.values().next())
                .and_then(|media| media.get("schema"))
            {
                Some(schema) => self.schemas.build(schema, &format!("{location}.content"))?,
                None => Arc::new(SchemaNode::any()),
            },
        };

        Ok(ParameterDef {
            name: name.to_string(),
            location: param_location,
            required: raw.get("required").and_then(Value::as_bool).unwrap_or(false),
            schema,
            style,
            explode: raw.get("explode").and_then(Value::as_bool),
        })
    }

    fn request_body(&mut self, raw: &'a Value, location: &str) -> Result<RequestBodyDef, LoadError> {
        let (raw, _) = self.resolver.follow(raw)?;
        Ok(RequestBodyDef {
            required: raw.get("required").and_then(Value::as_bool).unwrap_or(false),
            content: self.content(raw.get("content"), location)?,
        })
    }

    fn response(
        &mut self,
        key: ResponseKey,
        raw: &'a Value,
        location: &str,
    ) -> Result<ResponseDef, LoadError> {
        let (raw, _) = self.resolver.follow(raw)?;
        Ok(ResponseDef {
            key,
            description: raw.get("description").and_then(Value::as_str).map(str::to_string),
            content: self.content(raw.get("content"), location)?,
        })
    }

    fn content(
        &mut self,
        raw: Option<&'a Value>,
        location: &str,
    ) -> Result<Vec<(String, SchemaRef)>, LoadError> {
        let Some(map) = raw.and_then(Value::as_object) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(map.len());
        for (content_type, media) in map {
            let schema = match media.get("schema") {
                Some(schema) => self
                    .schemas
                    .build(schema, &format!("{location}.content.{content_type}"))?,
                None => Arc::new(SchemaNode::any()),
            };
            out.push((content_type.clone(), schema));
        }
        Ok(out)
    }
}

/// Operation-level parameters replace path-level ones with the same name and location.
fn merge_parameters(shared: &[ParameterDef], own: Vec<ParameterDef>) -> Vec<ParameterDef> {
    let mut merged: Vec<ParameterDef> = shared.to_vec();
    for param in own {
        match merged
            .iter_mut()
            .find(|p| p.name == param.name && p.location == param.location)
        {
            Some(slot) => *slot = param,
            None => merged.push(param),
        }
    }
    merged
}

fn check_path_parameters(
    method: &Method,
    template: &str,
    parameters: &[ParameterDef],
) -> Result<(), LoadError> {
    let placeholders = path_placeholders(template);
    let mismatch = |parameter: &str| LoadError::PathParameterMismatch {
        operation: format!("{method} {template}"),
        parameter: parameter.to_string(),
    };

    for name in &placeholders {
        let declared = parameters
            .iter()
            .find(|p| p.location == ParameterLocation::Path && p.name == *name);
        match declared {
            Some(p) if p.required => {}
            _ => return Err(mismatch(name)),
        }
    }
    if let Some(orphan) = parameters
        .iter()
        .find(|p| p.location == ParameterLocation::Path && !placeholders.contains(&p.name.as_str()))
    {
        return Err(mismatch(&orphan.name));
    }
    Ok(())
}

fn check_unique_operation_ids(operations: &[Operation]) -> Result<(), LoadError> {
    let mut seen: HashMap<&str, String> = HashMap::new();
    for op in operations {
        if let Some(id) = op.operation_id.as_deref() {
            if let Some(first) = seen.insert(id, op.label()) {
                return Err(LoadError::InvalidDocument {
                    location: op.label(),
                    message: format!("operationId '{id}' is also used by {first}"),
                });
            }
        }
    }
    Ok(())
}

fn parse_security(raw: &Value, location: &str) -> Result<Vec<SecurityRequirement>, LoadError> {
    serde_json::from_value(raw.clone()).map_err(|e| LoadError::InvalidDocument {
        location: location.to_string(),
        message: e.to_string(),
    })
}

/// Path component of the first server URL, with `{variables}` replaced by their defaults.
fn base_path(root: &Map<String, Value>) -> String {
    let Some(server) = root
        .get("servers")
        .and_then(Value::as_array)
        .and_then(|s| s.first())
    else {
        return String::new();
    };
    let mut url = server
        .get("url")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if let Some(vars) = server.get("variables").and_then(Value::as_object) {
        for (name, var) in vars {
            if let Some(default) = var.get("default").and_then(Value::as_str) {
                url = url.replace(&format!("{{{name}}}"), default);
            }
        }
    }

    let path = match url::Url::parse(&url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url,
    };
    path.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc_with_paths(paths: Value) -> Value {
        json!({
            "openapi": "3.1.0",
            "info": { "title": "T", "version": "1" },
            "paths": paths
        })
    }

    #[test]
    fn missing_paths_is_missing_field() {
        let err = load(&json!({ "openapi": "3.0.3", "info": {} })).unwrap_err();
        assert_eq!(err, LoadError::MissingField { field: "paths".to_string() });
    }

    #[test]
    fn no_operations_is_missing_field() {
        let err = load(&doc_with_paths(json!({ "/x": {} }))).unwrap_err();
        assert!(matches!(err, LoadError::MissingField { .. }));
    }

    #[test]
    fn path_level_parameters_are_merged_and_overridden() {
        let doc = doc_with_paths(json!({
            "/items/{id}": {
                "parameters": [
                    { "name": "id", "in": "path", "required": true, "schema": { "type": "string" } },
                    { "name": "trace", "in": "header", "schema": { "type": "string" } }
                ],
                "get": {
                    "parameters": [
                        { "name": "id", "in": "path", "required": true, "schema": { "type": "integer" } }
                    ],
                    "responses": { "200": { "description": "ok" } }
                }
            }
        }));
        let model = load(&doc).unwrap();
        let op = &model.operations[0];
        assert_eq!(op.parameters.len(), 2);
        assert_eq!(op.parameters[0].name, "id");
        assert_eq!(op.parameters[0].schema.type_name(), "integer");
        assert_eq!(op.parameters[1].name, "trace");
    }

    #[test]
    fn placeholder_without_required_parameter_fails() {
        let doc = doc_with_paths(json!({
            "/items/{id}": { "get": { "responses": {} } }
        }));
        assert!(matches!(
            load(&doc),
            Err(LoadError::PathParameterMismatch { parameter, .. }) if parameter == "id"
        ));

        let optional = doc_with_paths(json!({
            "/items/{id}": { "get": {
                "parameters": [ { "name": "id", "in": "path", "schema": { "type": "string" } } ]
            } }
        }));
        assert!(matches!(load(&optional), Err(LoadError::PathParameterMismatch { .. })));
    }

    #[test]
    fn security_defaults_and_public_override() {
        let doc = json!({
            "openapi": "3.0.3",
            "info": { "title": "T", "version": "1" },
            "security": [ { "ApiKey": [] } ],
            "components": { "securitySchemes": {
                "ApiKey": { "type": "apiKey", "in": "header", "name": "X-API-Key" }
            } },
            "paths": {
                "/a": { "get": { "responses": {} } },
                "/b": { "get": { "security": [], "responses": {} } }
            }
        });
        let model = load(&doc).unwrap();
        assert_eq!(model.operations[0].security.as_ref().map(Vec::len), Some(1));
        assert_eq!(model.operations[1].security.as_ref().map(Vec::len), Some(0));
        assert!(model.security_schemes.contains_key("ApiKey"));
    }

    #[test]
    fn responses_and_base_path() {
        let doc = json!({
            "openapi": "3.0.3",
            "info": { "title": "T", "version": "1" },
            "servers": [ { "url": "https://api.example.com/{v}/", "variables": { "v": { "default": "v2" } } } ],
            "paths": { "/a": { "get": { "responses": {
                "200": { "description": "ok" },
                "4XX": { "description": "client" },
                "default": { "description": "other" }
            } } } }
        });
        let model = load(&doc).unwrap();
        assert_eq!(model.base_path, "/v2");
        let op = &model.operations[0];
        assert_eq!(op.response_for(200).map(|r| r.key), Some(ResponseKey::Code(200)));
        assert_eq!(op.response_for(404).map(|r| r.key), Some(ResponseKey::Range(4)));
        assert_eq!(op.response_for(500).map(|r| r.key), Some(ResponseKey::Default));
    }

    #[test]
    fn unresolved_reference_is_bad_reference() {
        let doc = doc_with_paths(json!({
            "/a": { "post": {
                "requestBody": { "content": { "application/json": {
                    "schema": { "$ref": "#/components/schemas/Missing" }
                } } },
                "responses": {}
            } }
        }));
        assert!(matches!(load(&doc), Err(LoadError::BadReference { .. })));
    }

    #[test]
    fn duplicate_operation_ids_are_rejected() {
        let doc = doc_with_paths(json!({
            "/a": { "get": { "operationId": "same", "responses": {} } },
            "/b": { "get": { "operationId": "same", "responses": {} } }
        }));
        assert!(matches!(load(&doc), Err(LoadError::InvalidDocument { .. })));
    }

    #[test]
    fn unknown_verbs_are_ignored() {
        let doc = doc_with_paths(json!({
            "/a": { "get": { "responses": {} }, "x-internal": true, "summary": "s" }
        }));
        assert_eq!(load(&doc).unwrap().operations.len(), 1);
    }
}
