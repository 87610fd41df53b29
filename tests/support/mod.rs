//! In-memory collaborators for gatekeeper integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use tollgate::acl::{collection_key, Document, PermissionDescriptor, Query, ID_FIELD};
use tollgate::config::EngineConfig;
use tollgate::error::{FieldError, ERROR_VALIDATION};
use tollgate::identity::ClientIdentity;
use tollgate::schema::SchemaService;
use tollgate::storage::{FindOptions, FindResult, StorageAdapter, StorageError};
use tollgate::Gatekeeper;

pub fn obj(v: Value) -> Map<String, Value> {
    match v {
        Value::Object(m) => m,
        other => panic!("expected object, got {}", other),
    }
}

/// Evaluates equality, `$and`, `$in` and `$ne`; anything else starting with `$` is
/// refused the way a real backend refuses unsupported operators.
fn matches(doc: &Document, query: &Query) -> Result<bool, StorageError> {
    for (k, cond) in query {
        let ok = if k == "$and" {
            let Value::Array(terms) = cond else { return Err(StorageError::InvalidQuery("$and expects an array".into())) };
            let mut all = true;
            for t in terms {
                let Value::Object(sub) = t else { return Err(StorageError::InvalidQuery("$and term must be an object".into())) };
                all &= matches(doc, sub)?;
            }
            all
        } else if k.starts_with('$') {
            return Err(StorageError::InvalidQuery(format!("unsupported operator {}", k)));
        } else {
            let actual = doc.get(k).unwrap_or(&Value::Null);
            match cond {
                Value::Object(ops) if ops.keys().any(|o| o.starts_with('$')) => {
                    let mut all = true;
                    for (op, arg) in ops {
                        all &= match op.as_str() {
                            "$in" => arg.as_array().is_some_and(|a| a.contains(actual)),
                            "$ne" => actual != arg,
                            other => return Err(StorageError::InvalidQuery(format!("unsupported operator {}", other))),
                        };
                    }
                    all
                }
                literal => actual == literal,
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

#[derive(Default)]
pub struct MemoryStorage {
    collections: Mutex<HashMap<String, Vec<Document>>>,
    next_id: AtomicUsize,
    calls: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }

    /// Seed a record directly, bypassing the engine; returns its id.
    pub fn seed(&self, resource: &str, doc: Value) -> String {
        let mut d = obj(doc);
        let id = match d.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = format!("doc{}", self.next_id.fetch_add(1, Ordering::Relaxed));
                d.insert(ID_FIELD.into(), json!(id));
                id
            }
        };
        self.collections.lock().entry(resource.to_string()).or_default().push(d);
        id
    }

    pub fn get(&self, resource: &str, id: &str) -> Option<Document> {
        self.collections
            .lock()
            .get(resource)
            .and_then(|docs| docs.iter().find(|d| d.get(ID_FIELD) == Some(&json!(id))).cloned())
    }

    pub fn len(&self, resource: &str) -> usize {
        self.collections.lock().get(resource).map_or(0, Vec::len)
    }

    /// Number of adapter calls made by the engine.
    pub fn calls(&self) -> usize { self.calls.load(Ordering::Relaxed) }

    fn touch(&self) { self.calls.fetch_add(1, Ordering::Relaxed); }

    fn select(&self, resource: &str, query: &Query) -> Result<Vec<Document>, StorageError> {
        let guard = self.collections.lock();
        let mut out = Vec::new();
        for d in guard.get(resource).map(Vec::as_slice).unwrap_or(&[]) {
            if matches(d, query)? {
                out.push(d.clone());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn find(&self, resource: &str, query: &Query, options: &FindOptions) -> Result<FindResult, StorageError> {
        self.touch();
        let all = self.select(resource, query)?;
        let total_count = all.len() as u64;
        let documents = all
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(FindResult { documents, total_count })
    }

    async fn find_by_id(&self, resource: &str, id: &str, constraint: &Query) -> Result<Option<Document>, StorageError> {
        self.touch();
        let Some(doc) = self.get(resource, id) else { return Ok(None) };
        Ok(if matches(&doc, constraint)? { Some(doc) } else { None })
    }

    async fn count(&self, resource: &str, query: &Query) -> Result<u64, StorageError> {
        self.touch();
        Ok(self.select(resource, query)?.len() as u64)
    }

    async fn insert(&self, resource: &str, documents: Vec<Document>) -> Result<Vec<Document>, StorageError> {
        self.touch();
        let mut stored = Vec::new();
        for d in documents {
            let id = self.seed(resource, Value::Object(d));
            stored.extend(self.get(resource, &id));
        }
        Ok(stored)
    }

    async fn mutate(&self, resource: &str, query: &Query, update: &Document) -> Result<Vec<Document>, StorageError> {
        self.touch();
        let mut guard = self.collections.lock();
        let mut out = Vec::new();
        for d in guard.entry(resource.to_string()).or_default().iter_mut() {
            if matches(d, query)? {
                for (k, v) in update {
                    d.insert(k.clone(), v.clone());
                }
                out.push(d.clone());
            }
        }
        Ok(out)
    }

    async fn remove(&self, resource: &str, query: &Query) -> Result<u64, StorageError> {
        self.touch();
        let mut guard = self.collections.lock();
        let docs = guard.entry(resource.to_string()).or_default();
        let before = docs.len();
        let mut keep = Vec::with_capacity(before);
        for d in docs.drain(..) {
            if !matches(&d, query)? {
                keep.push(d);
            }
        }
        *docs = keep;
        Ok((before - docs.len()) as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Reference,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
    pub required: bool,
    pub target: Option<String>,
}

/// Collections in declaration order; validation reports errors in that order.
#[derive(Default)]
pub struct MemorySchema {
    collections: HashMap<String, Vec<FieldDef>>,
}

impl MemorySchema {
    pub fn new() -> Self { Self::default() }

    pub fn field(mut self, resource: &str, name: &str, ty: FieldType, required: bool) -> Self {
        self.collections.entry(resource.to_string()).or_default().push(FieldDef {
            name: name.to_string(),
            ty,
            required,
            target: None,
        });
        self
    }

    pub fn reference(mut self, resource: &str, name: &str, target: &str) -> Self {
        self.collections.entry(resource.to_string()).or_default().push(FieldDef {
            name: name.to_string(),
            ty: FieldType::Reference,
            required: false,
            target: Some(target.to_string()),
        });
        self
    }

    fn def(&self, resource: &str, field: &str) -> Option<&FieldDef> {
        self.collections.get(resource)?.iter().find(|f| f.name == field)
    }

    fn type_errors(&self, resource: &str, payload: &Document, out: &mut Vec<FieldError>) {
        for f in self.collections.get(resource).map(Vec::as_slice).unwrap_or(&[]) {
            let Some(v) = payload.get(&f.name) else { continue };
            let ok = match f.ty {
                FieldType::String | FieldType::Reference => v.is_string() || (f.ty == FieldType::Reference && v.is_array()),
                FieldType::Number => v.is_number(),
            };
            if !ok {
                out.push(FieldError::new(ERROR_VALIDATION, f.name.clone(), format!("{} has the wrong type", f.name)));
            }
        }
    }
}

#[async_trait]
impl SchemaService for MemorySchema {
    fn reference_target(&self, resource: &str, field: &str) -> Option<String> {
        self.def(resource, field).and_then(|f| f.target.clone())
    }

    fn is_required(&self, resource: &str, field: &str) -> bool {
        self.def(resource, field).is_some_and(|f| f.required)
    }

    async fn validate(&self, resource: &str, payload: &Document) -> Vec<FieldError> {
        let mut out = Vec::new();
        for f in self.collections.get(resource).map(Vec::as_slice).unwrap_or(&[]) {
            if f.required && !payload.contains_key(&f.name) {
                out.push(FieldError::new("ERROR_REQUIRED", f.name.clone(), format!("{} is required", f.name)));
            }
        }
        self.type_errors(resource, payload, &mut out);
        // Report in schema order
        let order: Vec<&str> = self.collections.get(resource).map(|fs| fs.iter().map(|f| f.name.as_str()).collect()).unwrap_or_default();
        out.sort_by_key(|e| order.iter().position(|n| *n == e.field).unwrap_or(usize::MAX));
        out
    }

    async fn validate_update(&self, resource: &str, update: &Document) -> Vec<FieldError> {
        let mut out = Vec::new();
        self.type_errors(resource, update, &mut out);
        out
    }
}

pub fn test_schema_key() -> String { collection_key("testdb", "test-schema") }
pub fn required_schema_key() -> String { collection_key("testdb", "test-required-schema") }
pub fn book_key() -> String { collection_key("library", "book") }
pub fn person_key() -> String { collection_key("library", "person") }

/// Schemas used across the integration tests.
pub fn test_schema() -> MemorySchema {
    MemorySchema::new()
        .field(&test_schema_key(), "field1", FieldType::String, false)
        .field(&test_schema_key(), "title", FieldType::String, false)
        .field(&required_schema_key(), "field1", FieldType::String, true)
        .field(&required_schema_key(), "field2", FieldType::String, false)
        .field(&book_key(), "title", FieldType::String, true)
        .reference(&book_key(), "author", &person_key())
        .field(&person_key(), "name", FieldType::String, true)
        .field(&person_key(), "occupation", FieldType::String, false)
        .reference(&person_key(), "spouse", &person_key())
}

/// Client holding the given ACL entries, each written as it appears in the directory.
pub fn client(client_id: &str, grants: &[(String, Value)]) -> ClientIdentity {
    grants.iter().fold(ClientIdentity::new(client_id), |c, (key, acl)| {
        let descriptor = match PermissionDescriptor::from_json(acl.clone()) {
            Ok(d) => d,
            Err(e) => panic!("bad descriptor for {}: {}", key, e),
        };
        c.with_resource(key.clone(), descriptor)
    })
}

pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub gatekeeper: Gatekeeper,
}

pub fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let gatekeeper = Gatekeeper::new(storage.clone(), Arc::new(test_schema()), config);
    Harness { storage, gatekeeper }
}
