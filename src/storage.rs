//! Storage adapter contract.
//!
//! The engine hands the adapter fully combined filters and never re-filters what comes
//! back; whatever the adapter matches is what the client is allowed to touch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::acl::{Document, Query};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The query uses an operator or shape the backend refuses.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FindOptions {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub sort: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindResult {
    pub documents: Vec<Document>,
    /// Matches before `limit`/`skip` were applied.
    pub total_count: u64,
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn find(&self, resource: &str, query: &Query, options: &FindOptions) -> Result<FindResult, StorageError>;

    /// Fetch one record by identifier, only if it also satisfies `constraint`.
    async fn find_by_id(&self, resource: &str, id: &str, constraint: &Query) -> Result<Option<Document>, StorageError>;

    async fn count(&self, resource: &str, query: &Query) -> Result<u64, StorageError>;

    /// Store new records; returns them as stored, identifiers assigned.
    async fn insert(&self, resource: &str, documents: Vec<Document>) -> Result<Vec<Document>, StorageError>;

    /// Apply `update` to every record matching `query`; returns the updated records.
    async fn mutate(&self, resource: &str, query: &Query, update: &Document) -> Result<Vec<Document>, StorageError>;

    /// Delete every record matching `query`; returns how many went.
    async fn remove(&self, resource: &str, query: &Query) -> Result<u64, StorageError>;
}
