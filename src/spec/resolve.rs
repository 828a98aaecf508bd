use crate::errors::LoadError;
use serde_json::Value;

/// Looks up `$ref` targets inside a single document.
///
/// Supported forms are local JSON pointers (`#/components/schemas/Item`) and the
/// pointer-less variants `components/schemas/Item` and `components.schemas.Item`.
#[derive(Clone, Copy)]
pub(crate) struct Resolver<'a> {
    root: &'a Value,
}

impl<'a> Resolver<'a> {
    pub fn new(root: &'a Value) -> Self {
        Self { root }
    }

    pub fn lookup(&self, reference: &str) -> Result<&'a Value, LoadError> {
        let segments = split_reference(reference)?;
        let mut current = self.root;
        for seg in &segments {
            let next = match current {
                Value::Object(map) => map.get(seg.as_str()),
                Value::Array(items) => seg.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            current = next.ok_or_else(|| LoadError::BadReference {
                reference: reference.to_string(),
                reason: format!("segment '{seg}' does not exist"),
            })?;
        }
        Ok(current)
    }

    /// Follow a chain of `{"$ref": ...}` objects to the first non-reference value.
    ///
    /// Used for parameters, request bodies and responses, which may be references to
    /// `components`. Returns the final target and the last reference followed.
    pub fn follow(&self, value: &'a Value) -> Result<(&'a Value, Option<String>), LoadError> {
        let mut seen: Vec<&str> = Vec::new();
        let mut current = value;
        let mut last = None;
        while let Some(reference) = ref_of(current) {
            if seen.contains(&reference) {
                return Err(cycle_error(reference, &seen));
            }
            seen.push(reference);
            current = self.lookup(reference)?;
            last = Some(reference.to_string());
        }
        Ok((current, last))
    }
}

pub(crate) fn ref_of(value: &Value) -> Option<&str> {
    value.get("$ref").and_then(Value::as_str)
}

pub(crate) fn cycle_error(reference: &str, chain: &[&str]) -> LoadError {
    let mut path: Vec<&str> = chain.to_vec();
    path.push(reference);
    LoadError::BadReference {
        reference: reference.to_string(),
        reason: format!("cyclic reference: {}", path.join(" -> ")),
    }
}

/// Last segment of `#/components/schemas/<name>`.
pub(crate) fn component_name(reference: &str) -> Option<String> {
    let segments = split_reference(reference).ok()?;
    match segments.as_slice() {
        [components, schemas, name] if components == "components" && schemas == "schemas" => {
            Some(name.clone())
        }
        _ => None,
    }
}

fn split_reference(reference: &str) -> Result<Vec<String>, LoadError> {
    let bad = |reason: &str| LoadError::BadReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    };

    if let Some(pointer) = reference.strip_prefix('#') {
        if pointer.is_empty() {
            return Ok(Vec::new());
        }
        let pointer = pointer
            .strip_prefix('/')
            .ok_or_else(|| bad("JSON pointer must start with '#/'"))?;
        return pointer
            .split('/')
            .map(|seg| {
                let decoded = urlencoding::decode(seg)
                    .map_err(|_| bad("segment is not valid percent-encoded UTF-8"))?;
                Ok(decoded.replace("~1", "/").replace("~0", "~"))
            })
            .collect();
    }

    if reference.contains('#') || reference.contains("://") {
        return Err(bad("only references within the same document are supported"));
    }
    let trimmed = reference.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(bad("empty reference"));
    }
    let sep = if trimmed.contains('/') { '/' } else { '.' };
    Ok(trimmed.split(sep).map(str::to_string).collect())
}
