//! # Implementation Handles
//!
//! Business logic is supplied as an [`Implementation`]: a closed capability set of
//! conventional CRUD methods plus named custom operations. The route generator asks
//! [`Implementation::exposes`] for every operation once, at generation time, so a
//! missing method is reported before any request is served.
//!
//! Two ready-made handles are provided:
//!
//! - [`HandlerSet`] registers plain closures per method.
//! - [`InMemoryResource`] is a scaffold CRUD store for prototypes and tests.
//!
//! Implementations are shared across concurrently processed requests; they must be
//! safe under concurrent invocation or synchronise internally.

use crate::errors::DomainError;
use crate::request::RequestId;
use crate::security::Principal;
use crate::spec::ParameterLocation;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Name of an implementation method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodName {
    List,
    Get,
    Create,
    Update,
    Delete,
    /// An explicit `operationId` that is not one of the conventional names.
    Custom(String),
}

impl MethodName {
    pub fn from_operation_id(id: &str) -> Self {
        match id {
            "list" => MethodName::List,
            "get" => MethodName::Get,
            "create" => MethodName::Create,
            "update" => MethodName::Update,
            "delete" => MethodName::Delete,
            other => MethodName::Custom(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MethodName::List => "list",
            MethodName::Get => "get",
            MethodName::Create => "create",
            MethodName::Update => "update",
            MethodName::Delete => "delete",
            MethodName::Custom(name) => name,
        }
    }
}

impl fmt::Display for MethodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One coerced parameter value. `value` is `None` when an optional parameter was
/// absent and declares no default.
#[derive(Debug, Clone, PartialEq)]
pub struct Argument {
    pub name: String,
    pub location: ParameterLocation,
    pub value: Option<Value>,
}

/// Everything an implementation method receives for one request.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub method: MethodName,
    /// In the operation's declared parameter order.
    pub args: Vec<Argument>,
    pub body: Option<Value>,
    pub principal: Option<Principal>,
    pub request_id: RequestId,
}

impl Invocation {
    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args
            .iter()
            .find(|a| a.name == name)
            .and_then(|a| a.value.as_ref())
    }

    pub fn arg_u64(&self, name: &str) -> Option<u64> {
        self.arg(name).and_then(Value::as_u64)
    }

    /// Argument rendered as a lookup key: strings as-is, everything else as JSON text.
    pub fn arg_key(&self, name: &str) -> Option<String> {
        self.arg(name).map(value_key)
    }

    /// Argument values in declared order.
    pub fn positional(&self) -> Vec<Option<&Value>> {
        self.args.iter().map(|a| a.value.as_ref()).collect()
    }
}

/// What an implementation method returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Status is inferred from the HTTP method.
    Value(Value),
    /// Explicit status code.
    WithStatus(u16, Value),
}

impl Reply {
    pub fn status(code: u16, value: Value) -> Self {
        Reply::WithStatus(code, value)
    }

    pub fn explicit_status(&self) -> Option<u16> {
        match self {
            Reply::Value(_) => None,
            Reply::WithStatus(code, _) => Some(*code),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Reply::Value(v) | Reply::WithStatus(_, v) => v,
        }
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

impl From<(u16, Value)> for Reply {
    fn from((code, value): (u16, Value)) -> Self {
        Reply::WithStatus(code, value)
    }
}

pub trait Implementation: Send + Sync {
    /// Whether a method is available. Checked once per operation at generation time.
    fn exposes(&self, method: &MethodName) -> bool;

    fn invoke(&self, call: Invocation) -> Result<Reply, DomainError>;
}

type Handler = Arc<dyn Fn(Invocation) -> Result<Reply, DomainError> + Send + Sync>;

/// Closure-backed [`Implementation`].
///
/// ```
/// use autoroute::implementation::{HandlerSet, Implementation, MethodName, Reply};
/// use serde_json::json;
///
/// let handlers = HandlerSet::new()
///     .list(|_| Ok(Reply::Value(json!([]))))
///     .operation("ping", |_| Ok(json!("pong").into()));
/// assert!(handlers.exposes(&MethodName::List));
/// assert!(handlers.exposes(&MethodName::Custom("ping".into())));
/// assert!(!handlers.exposes(&MethodName::Delete));
/// ```
#[derive(Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<MethodName, Handler>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, method: MethodName, f: F) -> Self
    where
        F: Fn(Invocation) -> Result<Reply, DomainError> + Send + Sync + 'static,
    {
        self.handlers.insert(method, Arc::new(f));
        self
    }

    pub fn list<F>(self, f: F) -> Self
    where
        F: Fn(Invocation) -> Result<Reply, DomainError> + Send + Sync + 'static,
    {
        self.on(MethodName::List, f)
    }

    pub fn get<F>(self, f: F) -> Self
    where
        F: Fn(Invocation) -> Result<Reply, DomainError> + Send + Sync + 'static,
    {
        self.on(MethodName::Get, f)
    }

    pub fn create<F>(self, f: F) -> Self
    where
        F: Fn(Invocation) -> Result<Reply, DomainError> + Send + Sync + 'static,
    {
        self.on(MethodName::Create, f)
    }

    pub fn update<F>(self, f: F) -> Self
    where
        F: Fn(Invocation) -> Result<Reply, DomainError> + Send + Sync + 'static,
    {
        self.on(MethodName::Update, f)
    }

    pub fn delete<F>(self, f: F) -> Self
    where
        F: Fn(Invocation) -> Result<Reply, DomainError> + Send + Sync + 'static,
    {
        self.on(MethodName::Delete, f)
    }

    /// Register a method for an explicit `operationId`.
    pub fn operation<F>(self, operation_id: &str, f: F) -> Self
    where
        F: Fn(Invocation) -> Result<Reply, DomainError> + Send + Sync + 'static,
    {
        self.on(MethodName::from_operation_id(operation_id), f)
    }
}

impl fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(MethodName::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HandlerSet").field("methods", &names).finish()
    }
}

impl Implementation for HandlerSet {
    fn exposes(&self, method: &MethodName) -> bool {
        self.handlers.contains_key(method)
    }

    fn invoke(&self, call: Invocation) -> Result<Reply, DomainError> {
        match self.handlers.get(&call.method) {
            Some(handler) => handler(call),
            None => Err(DomainError::not_implemented(format!(
                "method '{}' is not implemented",
                call.method
            ))),
        }
    }
}

/// How [`InMemoryResource`] assigns ids to created records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdStrategy {
    /// 1, 2, 3, ... unless the body carries an id.
    Sequential,
    /// Lower-cased slug of a body field, e.g. `"Blue Widget"` → `blue_widget`.
    SlugFrom(String),
}

#[derive(Debug, Default)]
struct Store {
    records: Vec<(String, Value)>,
    next_id: u64,
}

impl Store {
    fn position(&self, key: &str) -> Option<usize> {
        self.records.iter().position(|(k, _)| k == key)
    }
}

/// Scaffold CRUD implementation backed by an in-memory list.
///
/// `list` honours `limit` (default 100) and `offset` arguments; `get`, `update` and
/// `delete` read the item id from the path parameter named by [`Self::with_id_param`].
#[derive(Debug)]
pub struct InMemoryResource {
    resource: String,
    id_param: String,
    id_field: String,
    strategy: IdStrategy,
    store: Mutex<Store>,
}

impl InMemoryResource {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            id_param: "id".to_string(),
            id_field: "id".to_string(),
            strategy: IdStrategy::Sequential,
            store: Mutex::new(Store::default()),
        }
    }

    pub fn with_id_param(mut self, name: impl Into<String>) -> Self {
        self.id_param = name.into();
        self
    }

    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Pre-populate records; each must be an object carrying the id field.
    pub fn seed(self, records: impl IntoIterator<Item = Value>) -> Self {
        if let Ok(mut store) = self.store.lock() {
            for record in records {
                if let Some(id) = record.get(&self.id_field) {
                    let key = value_key(id);
                    if let Some(n) = id.as_u64() {
                        store.next_id = store.next_id.max(n);
                    }
                    store.records.push((key, record));
                }
            }
        }
        self
    }

    pub fn len(&self) -> usize {
        self.store.lock().map(|s| s.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Store>, DomainError> {
        self.store
            .lock()
            .map_err(|_| DomainError::internal(format!("{} store is poisoned", self.resource)))
    }

    fn not_found(&self, key: &str) -> DomainError {
        DomainError::not_found(format!("{} {key} not found", self.resource))
            .with_extra("resource_id", Value::String(key.to_string()))
    }

    fn id_of(&self, call: &Invocation) -> Result<String, DomainError> {
        call.arg_key(&self.id_param).ok_or_else(|| {
            DomainError::validation(format!("missing '{}' parameter", self.id_param))
        })
    }

    fn body_object(call: Invocation) -> Result<Map<String, Value>, DomainError> {
        match call.body {
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(DomainError::validation("request body must be an object")),
            None => Err(DomainError::validation("request body is required")),
        }
    }

    fn list(&self, call: &Invocation) -> Result<Reply, DomainError> {
        let limit = call
            .arg_u64("limit")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(100);
        let offset = call
            .arg_u64("offset")
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0);
        let store = self.lock()?;
        let page: Vec<Value> = store
            .records
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(_, v)| v.clone())
            .collect();
        Ok(Reply::Value(Value::Array(page)))
    }

    fn get(&self, call: &Invocation) -> Result<Reply, DomainError> {
        let key = self.id_of(call)?;
        let store = self.lock()?;
        store
            .position(&key)
            .map(|i| Reply::Value(store.records[i].1.clone()))
            .ok_or_else(|| self.not_found(&key))
    }

    fn create(&self, call: Invocation) -> Result<Reply, DomainError> {
        let mut data = Self::body_object(call)?;
        let mut store = self.lock()?;

        let (key, id) = match (&self.strategy, data.get(&self.id_field)) {
            (_, Some(given)) => (value_key(given), given.clone()),
            (IdStrategy::Sequential, None) => {
                let next = store.next_id + 1;
                (next.to_string(), Value::from(next))
            }
            (IdStrategy::SlugFrom(field), None) => {
                let source = data.get(field).and_then(Value::as_str).ok_or_else(|| {
                    DomainError::validation(format!("'{field}' is required to derive an id"))
                })?;
                let slug = slugify(source);
                (slug.clone(), Value::String(slug))
            }
        };

        if store.position(&key).is_some() {
            return Err(DomainError::conflict(format!(
                "{} with id {key} already exists",
                self.resource
            ))
            .with_extra("resource_id", Value::String(key)));
        }
        if let Some(n) = id.as_u64() {
            store.next_id = store.next_id.max(n);
        }

        let mut record = Map::new();
        record.insert(self.id_field.clone(), id);
        data.remove(&self.id_field);
        record.extend(data);
        record
            .entry("created_at".to_string())
            .or_insert_with(|| Value::String(now_rfc3339()));
        let record = Value::Object(record);
        store.records.push((key, record.clone()));
        Ok(Reply::status(201, record))
    }

    fn update(&self, call: Invocation) -> Result<Reply, DomainError> {
        let key = self.id_of(&call)?;
        let changes = Self::body_object(call)?;
        let mut store = self.lock()?;
        let index = store.position(&key).ok_or_else(|| self.not_found(&key))?;
        let record = &mut store.records[index].1;
        if let Value::Object(existing) = record {
            for (k, v) in changes {
                if k != self.id_field {
                    existing.insert(k, v);
                }
            }
            existing.insert("updated_at".to_string(), Value::String(now_rfc3339()));
        }
        Ok(Reply::Value(record.clone()))
    }

    fn delete(&self, call: &Invocation) -> Result<Reply, DomainError> {
        let key = self.id_of(call)?;
        let mut store = self.lock()?;
        let index = store.position(&key).ok_or_else(|| self.not_found(&key))?;
        store.records.remove(index);
        Ok(Reply::status(204, Value::Null))
    }
}

impl Implementation for InMemoryResource {
    fn exposes(&self, method: &MethodName) -> bool {
        !matches!(method, MethodName::Custom(_))
    }

    fn invoke(&self, call: Invocation) -> Result<Reply, DomainError> {
        match call.method.clone() {
            MethodName::List => self.list(&call),
            MethodName::Get => self.get(&call),
            MethodName::Create => self.create(call),
            MethodName::Update => self.update(call),
            MethodName::Delete => self.delete(&call),
            MethodName::Custom(name) => Err(DomainError::not_implemented(format!(
                "{} has no '{name}' operation",
                self.resource
            ))),
        }
    }
}

fn value_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn slugify(s: &str) -> String {
    s.trim().to_lowercase().replace(|c: char| c == ' ' || c == '-', "_")
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
