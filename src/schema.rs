//! Schema service contract: reference lookup, required flags and payload validation.

use async_trait::async_trait;

use crate::acl::Document;
use crate::error::FieldError;

#[async_trait]
pub trait SchemaService: Send + Sync {
    /// Resource key a reference field points at, or `None` for ordinary fields.
    fn reference_target(&self, resource: &str, field: &str) -> Option<String>;

    fn is_required(&self, resource: &str, field: &str) -> bool;

    /// Validate a complete new record. Errors should be returned in schema field order.
    async fn validate(&self, resource: &str, payload: &Document) -> Vec<FieldError>;

    /// Validate a partial update set; required-field checks do not apply.
    async fn validate_update(&self, _resource: &str, _update: &Document) -> Vec<FieldError> {
        Vec::new()
    }
}
