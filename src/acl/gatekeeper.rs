//! Per-request orchestration: resolve access, shape the write, execute against storage,
//! shape the response.
//!
//! A denied action never reaches storage. Every other failure is reported with its own
//! status. Records outside the combined filter are invisible: single-record operations
//! on them report not-found, bulk operations simply match nothing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, info_span, Instrument};

use super::compose::Composer;
use super::filter;
use super::model::{AccessDecision, Action, Document, Query};
use super::projection::{self, FieldProjection};
use super::resolver::resolve;
use crate::config::{EffectiveConfig, EngineConfig};
use crate::error::{AppError, AppResult, FieldError};
use crate::identity::{ClientIdentity, Directory};
use crate::schema::SchemaService;
use crate::storage::{FindOptions, StorageAdapter};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Count,
    Update,
    Delete,
}

impl Operation {
    /// ACL action that governs the operation.
    pub fn action(self) -> Action {
        match self {
            Operation::Create => Action::Create,
            Operation::Read | Operation::Count => Action::Read,
            Operation::Update => Action::Update,
            Operation::Delete => Action::Delete,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OperationRequest {
    /// Caller filter.
    pub query: Option<Query>,
    /// Target a single record.
    pub id: Option<String>,
    /// New record(s) for create, update set for update.
    pub payload: Option<Value>,
    pub compose: bool,
    pub compose_depth: Option<u32>,
    /// Fields the caller asked for; can only narrow the read permission.
    pub fields: Option<FieldProjection>,
    pub options: FindOptions,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub total_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationOutcome {
    pub status: u16,
    pub results: Vec<Document>,
    pub metadata: Metadata,
}

impl OperationOutcome {
    fn ok(results: Vec<Document>, total_count: u64) -> Self {
        Self { status: 200, results, metadata: Metadata { total_count, ..Default::default() } }
    }
}

pub struct Gatekeeper {
    storage: Arc<dyn StorageAdapter>,
    schema: Arc<dyn SchemaService>,
    config: EngineConfig,
}

impl Gatekeeper {
    pub fn new(storage: Arc<dyn StorageAdapter>, schema: Arc<dyn SchemaService>, config: EngineConfig) -> Self {
        Self { storage, schema, config }
    }

    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Load the client's permissions from `directory` for this request, then run the
    /// operation. Grants changed in the directory apply from the next call on.
    pub async fn perform_for_client(
        &self,
        directory: &dyn Directory,
        client_id: &str,
        resource: &str,
        op: Operation,
        req: OperationRequest,
    ) -> AppResult<OperationOutcome> {
        let client = directory.get_permissions(client_id).await?;
        self.perform_operation(&client, resource, op, req).await
    }

    pub async fn perform_operation(
        &self,
        client: &ClientIdentity,
        resource: &str,
        op: Operation,
        req: OperationRequest,
    ) -> AppResult<OperationOutcome> {
        let request_id = req.request_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let span = info_span!(
            target: "tollgate::gatekeeper",
            "operation",
            request_id = %request_id,
            client = %client.client_id,
            resource = %resource,
            op = ?op
        );
        let result = self.run(client, resource, op, req).instrument(span.clone()).await;
        span.in_scope(|| match &result {
            Ok(o) => info!(target: "tollgate::gatekeeper", status = o.status, results = o.results.len(), "operation complete"),
            Err(e) => info!(target: "tollgate::gatekeeper", status = e.http_status(), code = e.code_str(), "operation failed"),
        });
        result
    }

    async fn run(&self, client: &ClientIdentity, resource: &str, op: Operation, req: OperationRequest) -> AppResult<OperationOutcome> {
        let eff = self.config.effective_for(resource);
        let decision = resolve(client, resource, op.action(), &eff.owner_field);
        if !decision.allowed {
            return Err(AppError::forbidden(format!(
                "client {} may not {} {}",
                client.client_id,
                op.action().as_str(),
                resource
            )));
        }
        match op {
            Operation::Read => self.read(client, resource, &eff, &decision, req).await,
            Operation::Count => self.count(resource, &decision, req).await,
            Operation::Create => self.create(client, resource, &eff, &decision, req).await,
            Operation::Update => self.update(client, resource, &eff, &decision, req).await,
            Operation::Delete => self.delete(resource, &decision, req).await,
        }
    }

    /// The projection responses are shaped with: the read permission narrowed by the
    /// caller's `fields`, or identifiers only when the client cannot read at all.
    fn response_projection(&self, client: &ClientIdentity, resource: &str, eff: &EffectiveConfig, requested: Option<&FieldProjection>) -> Option<FieldProjection> {
        let read = resolve(client, resource, Action::Read, &eff.owner_field);
        if !read.allowed {
            return Some(FieldProjection::id_only());
        }
        projection::merge(read.projection.as_ref(), requested)
    }

    async fn shape(
        &self,
        client: &ClientIdentity,
        resource: &str,
        eff: &EffectiveConfig,
        docs: &[Document],
        shape: Option<&FieldProjection>,
        req: &OperationRequest,
    ) -> Vec<Document> {
        let shaped = projection::project_many(docs, shape);
        if !req.compose {
            return shaped;
        }
        let composer = Composer::new(self.storage.as_ref(), self.schema.as_ref(), client, &self.config);
        composer.compose_many(resource, shaped, eff.compose_depth(req.compose_depth)).await
    }

    fn combined_filter(req: &OperationRequest, decision: &AccessDecision) -> Query {
        let id_term = req.id.as_deref().map(filter::id_equals);
        filter::combine_all([req.query.as_ref(), id_term.as_ref(), decision.filter.as_ref()])
    }

    async fn read(&self, client: &ClientIdentity, resource: &str, eff: &EffectiveConfig, decision: &AccessDecision, req: OperationRequest) -> AppResult<OperationOutcome> {
        let query = Self::combined_filter(&req, decision);
        debug!(target: "tollgate::gatekeeper", "read filter={:?}", query);
        let found = self.storage.find(resource, &query, &req.options).await?;
        if req.id.is_some() && found.documents.is_empty() {
            return Err(AppError::not_found(format!("document not found in {}", resource)));
        }
        let shape = projection::merge(decision.projection.as_ref(), req.fields.as_ref());
        let results = self.shape(client, resource, eff, &found.documents, shape.as_ref(), &req).await;
        let mut out = OperationOutcome::ok(results, found.total_count);
        out.metadata.limit = req.options.limit;
        out.metadata.offset = req.options.skip;
        Ok(out)
    }

    async fn count(&self, resource: &str, decision: &AccessDecision, req: OperationRequest) -> AppResult<OperationOutcome> {
        let query = Self::combined_filter(&req, decision);
        let total = self.storage.count(resource, &query).await?;
        Ok(OperationOutcome::ok(Vec::new(), total))
    }

    async fn create(&self, client: &ClientIdentity, resource: &str, eff: &EffectiveConfig, decision: &AccessDecision, req: OperationRequest) -> AppResult<OperationOutcome> {
        let documents = payload_documents(req.payload.as_ref())?;
        let mut errors: Vec<FieldError> = Vec::new();
        let mut prepared = Vec::with_capacity(documents.len());
        for doc in documents {
            let doc = without_internal_fields(doc, eff);
            let (writable, stripped) = projection::strip(&doc, decision.projection.as_ref());
            if !stripped.is_empty() {
                debug!(target: "tollgate::gatekeeper", "create stripped fields {:?}", stripped);
            }
            let found = self.schema.validate(resource, &writable).await;
            errors.extend(self.retag_stripped(resource, found, &stripped));
            prepared.push(writable);
        }
        if let Some(e) = AppError::from_field_errors(errors) {
            return Err(e);
        }

        let now = chrono::Utc::now().timestamp_millis();
        for doc in prepared.iter_mut() {
            doc.insert(eff.owner_field.clone(), Value::from(client.client_id.clone()));
            doc.insert(eff.created_at_field.clone(), Value::from(now));
        }
        let inserted = self.storage.insert(resource, prepared).await?;
        let shape = self.response_projection(client, resource, eff, req.fields.as_ref());
        let results = self.shape(client, resource, eff, &inserted, shape.as_ref(), &req).await;
        let n = results.len() as u64;
        Ok(OperationOutcome::ok(results, n))
    }

    /// Errors on fields the ACL removed from the payload, where the schema requires
    /// the field, are authorization failures rather than validation failures.
    fn retag_stripped(&self, resource: &str, errors: Vec<FieldError>, stripped: &[String]) -> Vec<FieldError> {
        errors
            .into_iter()
            .map(|e| {
                if stripped.iter().any(|s| *s == e.field) && self.schema.is_required(resource, &e.field) {
                    FieldError::unauthorised(e.field)
                } else {
                    e
                }
            })
            .collect()
    }

    async fn update(&self, client: &ClientIdentity, resource: &str, eff: &EffectiveConfig, decision: &AccessDecision, req: OperationRequest) -> AppResult<OperationOutcome> {
        require_target(&req)?;
        let update = match req.payload.as_ref() {
            Some(Value::Object(m)) => without_internal_fields(m.clone(), eff),
            _ => return Err(AppError::validation("update requires an object payload", Vec::new())),
        };
        let (writable, stripped) = projection::strip(&update, decision.projection.as_ref());
        if writable.is_empty() {
            if !stripped.is_empty() {
                let errors = stripped.into_iter().map(FieldError::unauthorised).collect();
                return Err(AppError::from_field_errors(errors).unwrap_or_else(|| AppError::forbidden("no writable fields")));
            }
            return Err(AppError::validation("update payload is empty", Vec::new()));
        }
        if !stripped.is_empty() {
            debug!(target: "tollgate::gatekeeper", "update stripped fields {:?}", stripped);
        }
        if let Some(e) = AppError::from_field_errors(self.schema.validate_update(resource, &writable).await) {
            return Err(e);
        }

        let query = Self::combined_filter(&req, decision);
        let updated = self.storage.mutate(resource, &query, &writable).await?;
        if req.id.is_some() && updated.is_empty() {
            return Err(AppError::not_found(format!("document not found in {}", resource)));
        }
        let shape = self.response_projection(client, resource, eff, req.fields.as_ref());
        let results = self.shape(client, resource, eff, &updated, shape.as_ref(), &req).await;
        let n = results.len() as u64;
        Ok(OperationOutcome::ok(results, n))
    }

    async fn delete(&self, resource: &str, decision: &AccessDecision, req: OperationRequest) -> AppResult<OperationOutcome> {
        require_target(&req)?;
        let query = Self::combined_filter(&req, decision);
        let removed = self.storage.remove(resource, &query).await?;
        if req.id.is_some() && removed == 0 {
            return Err(AppError::not_found(format!("document not found in {}", resource)));
        }
        Ok(OperationOutcome { status: 204, results: Vec::new(), metadata: Metadata { total_count: removed, ..Default::default() } })
    }
}

/// Bulk mutations must say what they target; an empty filter would hit every record
/// the ACL lets through.
fn require_target(req: &OperationRequest) -> AppResult<()> {
    let has_query = req.query.as_ref().is_some_and(|q| !q.is_empty());
    if has_query || req.id.is_some() {
        Ok(())
    } else {
        Err(AppError::validation("a query or an identifier is required", Vec::new()))
    }
}

fn payload_documents(payload: Option<&Value>) -> AppResult<Vec<Document>> {
    match payload {
        Some(Value::Object(m)) => Ok(vec![m.clone()]),
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|v| match v {
                Value::Object(m) => Ok(m.clone()),
                _ => Err(AppError::validation("every created document must be an object", Vec::new())),
            })
            .collect(),
        _ => Err(AppError::validation("create requires an object or a non-empty array of objects", Vec::new())),
    }
}

fn without_internal_fields(mut doc: Document, eff: &EffectiveConfig) -> Document {
    for f in eff.internal_fields() {
        doc.remove(f);
    }
    doc
}
