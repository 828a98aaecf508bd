use super::resolve::{component_name, cycle_error, ref_of, Resolver};
use super::types::{AdditionalProperties, Constraints, SchemaKind, SchemaNode, SchemaRef};
use crate::errors::LoadError;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Normalises raw JSON schemas into [`SchemaNode`] trees.
///
/// Resolved references are memoised per builder, so every `$ref` to the same target in
/// one document yields the same `Arc`. A reference reached again while it is still being
/// built is a cycle and fails the load.
pub(crate) struct SchemaBuilder<'a> {
    resolver: Resolver<'a>,
    resolved: HashMap<String, SchemaRef>,
    in_progress: Vec<String>,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(resolver: Resolver<'a>) -> Self {
        Self {
            resolver,
            resolved: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    pub fn build(&mut self, raw: &'a Value, location: &str) -> Result<SchemaRef, LoadError> {
        match ref_of(raw) {
            Some(reference) => self.build_ref(reference),
            None => Ok(Arc::new(self.build_node(raw, location)?)),
        }
    }

    fn build_ref(&mut self, reference: &str) -> Result<SchemaRef, LoadError> {
        if let Some(hit) = self.resolved.get(reference) {
            return Ok(Arc::clone(hit));
        }
        if self.in_progress.iter().any(|r| r == reference) {
            let chain: Vec<&str> = self.in_progress.iter().map(String::as_str).collect();
            return Err(cycle_error(reference, &chain));
        }

        let target = self.resolver.lookup(reference)?;
        self.in_progress.push(reference.to_string());
        let built = match ref_of(target) {
            Some(next) => self.build_ref(next),
            None => self.build_node(target, reference).map(|mut node| {
                if node.ref_name.is_none() {
                    node.ref_name = component_name(reference);
                }
                Arc::new(node)
            }),
        };
        self.in_progress.pop();

        let node = built?;
        self.resolved.insert(reference.to_string(), Arc::clone(&node));
        Ok(node)
    }

    fn build_node(&mut self, raw: &'a Value, location: &str) -> Result<SchemaNode, LoadError> {
        let obj = match raw {
            Value::Object(obj) => obj,
            Value::Bool(true) => return Ok(SchemaNode::any()),
            _ => {
                return Err(LoadError::InvalidDocument {
                    location: location.to_string(),
                    message: "schema must be an object".to_string(),
                })
            }
        };

        let mut nullable = obj.get("nullable").and_then(Value::as_bool).unwrap_or(false);

        let kind = if let Some(branches) = obj.get("oneOf") {
            SchemaKind::OneOf(self.build_branches(branches, &format!("{location}.oneOf"))?)
        } else if let Some(branches) = obj.get("anyOf") {
            SchemaKind::AnyOf(self.build_branches(branches, &format!("{location}.anyOf"))?)
        } else if let Some(branches) = obj.get("allOf") {
            SchemaKind::AllOf(self.build_branches(branches, &format!("{location}.allOf"))?)
        } else {
            match obj.get("type") {
                Some(Value::String(t)) => self.kind_for(t, obj, location)?,
                Some(Value::Array(types)) => {
                    let mut names: Vec<&str> = Vec::new();
                    for t in types {
                        match t.as_str() {
                            Some("null") => nullable = true,
                            Some(name) => names.push(name),
                            None => {
                                return Err(LoadError::InvalidDocument {
                                    location: format!("{location}.type"),
                                    message: "type list entries must be strings".to_string(),
                                })
                            }
                        }
                    }
                    match names.as_slice() {
                        [] => SchemaKind::Null,
                        [single] => self.kind_for(single, obj, location)?,
                        many => {
                            let mut branches = Vec::with_capacity(many.len());
                            for name in many {
                                let mut branch = SchemaNode::new(self.kind_for(name, obj, location)?);
                                branch.format = obj.get("format").and_then(Value::as_str).map(str::to_string);
                                branch.constraints = constraints(obj, location)?;
                                branches.push(Arc::new(branch));
                            }
                            SchemaKind::AnyOf(branches)
                        }
                    }
                }
                Some(_) => {
                    return Err(LoadError::InvalidDocument {
                        location: format!("{location}.type"),
                        message: "type must be a string or a list of strings".to_string(),
                    })
                }
                None if obj.contains_key("properties")
                    || obj.contains_key("additionalProperties")
                    || obj.contains_key("required") =>
                {
                    self.object_kind(obj, location)?
                }
                None if obj.contains_key("items") => self.array_kind(obj, location)?,
                None => SchemaKind::Any,
            }
        };

        Ok(SchemaNode {
            kind,
            nullable,
            format: obj.get("format").and_then(Value::as_str).map(str::to_string),
            default: obj.get("default").cloned(),
            constraints: constraints(obj, location)?,
            ref_name: None,
        })
    }

    fn kind_for(
        &mut self,
        type_name: &str,
        obj: &'a Map<String, Value>,
        location: &str,
    ) -> Result<SchemaKind, LoadError> {
        match type_name {
            "object" => self.object_kind(obj, location),
            "array" => self.array_kind(obj, location),
            other => scalar_kind(other).ok_or_else(|| unknown_type(other, location)),
        }
    }

    fn object_kind(
        &mut self,
        obj: &'a Map<String, Value>,
        location: &str,
    ) -> Result<SchemaKind, LoadError> {
        let mut properties = Vec::new();
        if let Some(props) = obj.get("properties") {
            let props = props.as_object().ok_or_else(|| LoadError::InvalidDocument {
                location: format!("{location}.properties"),
                message: "properties must be an object".to_string(),
            })?;
            for (name, schema) in props {
                let child = self.build(schema, &format!("{location}.properties.{name}"))?;
                properties.push((name.clone(), child));
            }
        }

        // An object schema that declares nothing is free-form.
        let additional = match obj.get("additionalProperties") {
            None if properties.is_empty() => AdditionalProperties::Allow,
            None | Some(Value::Bool(false)) => AdditionalProperties::Deny,
            Some(Value::Bool(true)) => AdditionalProperties::Allow,
            Some(Value::Object(m)) if m.is_empty() => AdditionalProperties::Allow,
            Some(schema) => AdditionalProperties::Schema(
                self.build(schema, &format!("{location}.additionalProperties"))?,
            ),
        };

        Ok(SchemaKind::Object {
            properties,
            required: required_set(obj),
            additional,
        })
    }

    fn array_kind(
        &mut self,
        obj: &'a Map<String, Value>,
        location: &str,
    ) -> Result<SchemaKind, LoadError> {
        let items = match obj.get("items") {
            Some(items) => Some(self.build(items, &format!("{location}.items"))?),
            None => None,
        };
        Ok(SchemaKind::Array { items })
    }

    fn build_branches(&mut self, raw: &'a Value, location: &str) -> Result<Vec<SchemaRef>, LoadError> {
        let list = raw.as_array().ok_or_else(|| LoadError::InvalidDocument {
            location: location.to_string(),
            message: "composition keyword must hold a list of schemas".to_string(),
        })?;
        if list.is_empty() {
            return Err(LoadError::InvalidDocument {
                location: location.to_string(),
                message: "composition keyword must not be empty".to_string(),
            });
        }
        list.iter()
            .enumerate()
            .map(|(i, branch)| self.build(branch, &format!("{location}[{i}]")))
            .collect()
    }
}

fn scalar_kind(type_name: &str) -> Option<SchemaKind> {
    match type_name {
        "string" => Some(SchemaKind::String),
        "integer" => Some(SchemaKind::Integer),
        "number" => Some(SchemaKind::Number),
        "boolean" => Some(SchemaKind::Boolean),
        "null" => Some(SchemaKind::Null),
        _ => None,
    }
}

fn unknown_type(type_name: &str, location: &str) -> LoadError {
    LoadError::InvalidDocument {
        location: format!("{location}.type"),
        message: format!("unknown schema type '{type_name}'"),
    }
}

fn required_set(obj: &Map<String, Value>) -> BTreeSet<String> {
    obj.get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn constraints(obj: &Map<String, Value>, location: &str) -> Result<Constraints, LoadError> {
    let num = |key: &str| obj.get(key).and_then(Value::as_f64);
    let count = |key: &str| {
        obj.get(key)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
    };

    let mut c = Constraints {
        minimum: num("minimum"),
        maximum: num("maximum"),
        multiple_of: num("multipleOf").filter(|m| *m > 0.0),
        min_length: count("minLength"),
        max_length: count("maxLength"),
        min_items: count("minItems"),
        max_items: count("maxItems"),
        unique_items: obj.get("uniqueItems").and_then(Value::as_bool).unwrap_or(false),
        enum_values: obj.get("enum").and_then(Value::as_array).cloned(),
        const_value: obj.get("const").cloned(),
        ..Constraints::default()
    };

    // 3.0 uses boolean flags next to minimum/maximum, 3.1 uses the bound itself.
    match obj.get("exclusiveMinimum") {
        Some(Value::Bool(true)) => c.exclusive_minimum = c.minimum.take(),
        Some(v) => c.exclusive_minimum = v.as_f64(),
        None => {}
    }
    match obj.get("exclusiveMaximum") {
        Some(Value::Bool(true)) => c.exclusive_maximum = c.maximum.take(),
        Some(v) => c.exclusive_maximum = v.as_f64(),
        None => {}
    }

    if let Some(pattern) = obj.get("pattern").and_then(Value::as_str) {
        let re = Regex::new(pattern).map_err(|e| LoadError::InvalidDocument {
            location: format!("{location}.pattern"),
            message: format!("invalid pattern: {e}"),
        })?;
        c.pattern = Some(re);
    }
    Ok(c)
}
