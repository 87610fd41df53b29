//! Reference composition: replace reference identifiers with the referenced records,
//! shaped by the client's read permissions on the referenced resource.
//!
//! Composition degrades instead of failing. A reference the client cannot read, that
//! lies outside the read filter, that does not exist, or whose fetch errors keeps its
//! raw identifier. Nesting stops at the depth given by the caller.

use futures_util::future::{join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::model::{Action, Document};
use super::projection::project;
use super::resolver::resolve;
use crate::config::EngineConfig;
use crate::identity::ClientIdentity;
use crate::schema::SchemaService;
use crate::storage::StorageAdapter;

pub struct Composer<'a> {
    pub storage: &'a dyn StorageAdapter,
    pub schema: &'a dyn SchemaService,
    pub client: &'a ClientIdentity,
    pub config: &'a EngineConfig,
}

impl<'a> Composer<'a> {
    pub fn new(
        storage: &'a dyn StorageAdapter,
        schema: &'a dyn SchemaService,
        client: &'a ClientIdentity,
        config: &'a EngineConfig,
    ) -> Self {
        Self { storage, schema, client, config }
    }

    pub async fn compose_many(&self, resource: &str, documents: Vec<Document>, depth: u32) -> Vec<Document> {
        join_all(documents.into_iter().map(|d| self.compose(resource, d, depth))).await
    }

    /// Expand the reference fields of `document`, which belongs to `resource`, down to
    /// `depth` levels.
    pub fn compose<'f>(&'f self, resource: &'f str, mut document: Document, depth: u32) -> BoxFuture<'f, Document> {
        async move {
            if depth == 0 {
                return document;
            }
            let composed_field = &self.config.global.composed_field;
            let refs: Vec<(String, String, Value)> = document
                .iter()
                .filter(|(field, _)| *field != composed_field)
                .filter_map(|(field, value)| {
                    self.schema.reference_target(resource, field).map(|target| (field.clone(), target, value.clone()))
                })
                .collect();
            if refs.is_empty() {
                return document;
            }

            let expanded = join_all(refs.into_iter().map(|(field, target, raw)| async move {
                let value = self.compose_value(&target, &raw, depth).await;
                (field, raw, value)
            }))
            .await;

            let mut marker = Map::new();
            for (field, raw, value) in expanded {
                if let Some(v) = value {
                    document.insert(field.clone(), v);
                    marker.insert(field, raw);
                }
            }
            if !marker.is_empty() {
                document.insert(composed_field.clone(), Value::Object(marker));
            }
            document
        }
        .boxed()
    }

    /// `None` when nothing in `raw` could be expanded.
    async fn compose_value(&self, target: &str, raw: &Value, depth: u32) -> Option<Value> {
        match raw {
            Value::String(id) => self.fetch_shaped(target, id, depth).await.map(Value::Object),
            Value::Array(items) => {
                let fetched = join_all(items.iter().map(|item| async move {
                    match item {
                        Value::String(id) => self.fetch_shaped(target, id, depth).await,
                        _ => None,
                    }
                }))
                .await;
                if fetched.iter().all(Option::is_none) {
                    return None;
                }
                let out = items
                    .iter()
                    .zip(fetched)
                    .map(|(raw, doc)| doc.map(Value::Object).unwrap_or_else(|| raw.clone()))
                    .collect();
                Some(Value::Array(out))
            }
            _ => None,
        }
    }

    async fn fetch_shaped(&self, target: &str, id: &str, depth: u32) -> Option<Document> {
        let owner_field = self.config.effective_for(target).owner_field;
        let decision = resolve(self.client, target, Action::Read, &owner_field);
        if !decision.allowed {
            debug!(target: "tollgate::compose", "reference {}/{} left raw: read denied", target, id);
            return None;
        }
        let constraint = decision.filter.clone().unwrap_or_default();
        match self.storage.find_by_id(target, id, &constraint).await {
            Ok(Some(doc)) => {
                let shaped = project(&doc, decision.projection.as_ref());
                Some(self.compose(target, shaped, depth - 1).await)
            }
            Ok(None) => {
                debug!(target: "tollgate::compose", "reference {}/{} left raw: not found under read filter", target, id);
                None
            }
            Err(e) => {
                warn!(target: "tollgate::compose", "reference {}/{} left raw: {}", target, id, e);
                None
            }
        }
    }
}
