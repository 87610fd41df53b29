//! Unified application error model and mapping helpers.
//! Every operation outcome that is not a success is reported through `AppError`; the
//! gatekeeper is the only place that decides which variant (and therefore which HTTP
//! status) a failure surfaces as.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::acl::DescriptorError;
use crate::identity::DirectoryError;
use crate::storage::StorageError;

pub const ERROR_UNAUTHORISED: &str = "ERROR_UNAUTHORISED";
pub const ERROR_VALIDATION: &str = "ERROR_VALIDATION";
pub const ERROR_NOT_FOUND: &str = "ERROR_NOT_FOUND";
pub const ERROR_INVALID_QUERY: &str = "ERROR_INVALID_QUERY";

/// One problem with one field of a payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub code: String,
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(code: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), field: field.into(), message: message.into() }
    }

    pub fn unauthorised(field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("The client is not permitted to write to field '{}'", field);
        Self { code: ERROR_UNAUTHORISED.into(), field, message }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ERROR_VALIDATION, field, message)
    }

    pub fn is_unauthorised(&self) -> bool { self.code == ERROR_UNAUTHORISED }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    Forbidden { code: String, message: String, #[serde(default)] errors: Vec<FieldError> },
    Validation { code: String, message: String, #[serde(default)] errors: Vec<FieldError> },
    NotFound { code: String, message: String },
    InvalidQuery { code: String, message: String },
    Descriptor { code: String, message: String },
    Unavailable { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::Forbidden { code, .. }
            | AppError::Validation { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::InvalidQuery { code, .. }
            | AppError::Descriptor { code, .. }
            | AppError::Unavailable { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::Forbidden { message, .. }
            | AppError::Validation { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::InvalidQuery { message, .. }
            | AppError::Descriptor { message, .. }
            | AppError::Unavailable { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    /// Per-field problems carried by the error; empty for errors that concern the
    /// whole request.
    pub fn errors(&self) -> &[FieldError] {
        match self {
            AppError::Forbidden { errors, .. } | AppError::Validation { errors, .. } => errors.as_slice(),
            _ => &[],
        }
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        AppError::Forbidden { code: ERROR_UNAUTHORISED.into(), message: msg.into(), errors: Vec::new() }
    }
    pub fn validation<S: Into<String>>(msg: S, errors: Vec<FieldError>) -> Self {
        AppError::Validation { code: ERROR_VALIDATION.into(), message: msg.into(), errors }
    }
    pub fn not_found<S: Into<String>>(msg: S) -> Self { AppError::NotFound { code: ERROR_NOT_FOUND.into(), message: msg.into() } }
    pub fn invalid_query<S: Into<String>>(msg: S) -> Self { AppError::InvalidQuery { code: ERROR_INVALID_QUERY.into(), message: msg.into() } }
    pub fn descriptor<S: Into<String>>(code: S, msg: S) -> Self { AppError::Descriptor { code: code.into(), message: msg.into() } }
    pub fn unavailable<S: Into<String>>(code: S, msg: S) -> Self { AppError::Unavailable { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Fold the field errors collected for a write into a single error.
    ///
    /// Returns `None` when there is nothing to report. When every entry was caused by
    /// the ACL the request is forbidden (403); any genuine validation failure makes the
    /// whole request a validation error (400) that still lists the ACL entries.
    pub fn from_field_errors(errors: Vec<FieldError>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        if errors.iter().all(FieldError::is_unauthorised) {
            return Some(AppError::Forbidden {
                code: ERROR_UNAUTHORISED.into(),
                message: "The client is not permitted to write the submitted fields".into(),
                errors,
            });
        }
        Some(AppError::validation("The payload failed validation", errors))
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Forbidden { .. } => 403,
            AppError::Validation { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::InvalidQuery { .. } => 400,
            AppError::Descriptor { .. } => 500,
            AppError::Unavailable { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())?;
        for e in self.errors() {
            write!(f, " [{} {}]", e.field, e.code)?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidQuery(msg) => AppError::invalid_query(msg),
            StorageError::UnknownResource(res) => AppError::not_found(format!("unknown resource {}", res)),
            StorageError::Backend(msg) => AppError::unavailable("storage_unavailable".to_string(), msg),
        }
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            // An identity the directory does not know holds no permissions at all.
            DirectoryError::UnknownClient(id) => AppError::forbidden(format!("client {} has no permissions", id)),
            DirectoryError::Unavailable(msg) => AppError::unavailable("directory_unavailable".to_string(), msg),
            DirectoryError::Descriptor(e) => e.into(),
        }
    }
}

impl From<DescriptorError> for AppError {
    fn from(err: DescriptorError) -> Self {
        AppError::descriptor("invalid_permission_descriptor".to_string(), err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}
