use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::projection::FieldProjection;

/// Structured filter object; opaque to the engine apart from AND-merging.
pub type Query = Map<String, Value>;
/// A record as returned by storage, keyed by field name.
pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";

/// Build the resource key used for a collection, e.g. `collection:library_book`.
pub fn collection_key(database: &str, collection: &str) -> String {
    format!("collection:{}_{}", database, collection)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }

    /// Key of the own-scoped counterpart; `create` has none.
    pub fn own_key(self) -> Option<&'static str> {
        match self {
            Action::Create => None,
            Action::Read => Some("readOwn"),
            Action::Update => Some("updateOwn"),
            Action::Delete => Some("deleteOwn"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("permission must be a boolean or an object, got {0}")]
    InvalidShape(String),
    #[error("filter must be a JSON object or a string holding one: {0}")]
    InvalidFilter(String),
    #[error("fields entry '{field}' must be 0, 1, true or false")]
    InvalidFieldValue { field: String },
    #[error("fields map mixes inclusion and exclusion")]
    MixedProjection,
    #[error("'{0}' is not a collection field name")]
    InvalidFieldName(String),
}

/// Rights granted for a single action on a single resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum ActionPermission {
    Deny,
    AllowAll,
    AllowRestricted { filter: Option<Query>, fields: Option<FieldProjection> },
}

impl ActionPermission {
    pub fn restricted(filter: Option<Query>, fields: Option<FieldProjection>) -> Self {
        ActionPermission::AllowRestricted { filter, fields }
    }
}

fn parse_filter(v: &Value) -> Result<Option<Query>, DescriptorError> {
    match v {
        Value::Null => Ok(None),
        Value::Object(m) => Ok(Some(m.clone())),
        // Filters are commonly stored as serialised JSON
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(m)) => Ok(Some(m)),
            Ok(other) => Err(DescriptorError::InvalidFilter(other.to_string())),
            Err(e) => Err(DescriptorError::InvalidFilter(e.to_string())),
        },
        other => Err(DescriptorError::InvalidFilter(other.to_string())),
    }
}

impl TryFrom<Value> for ActionPermission {
    type Error = DescriptorError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Bool(false) => Ok(ActionPermission::Deny),
            Value::Bool(true) => Ok(ActionPermission::AllowAll),
            Value::Object(m) => {
                let filter = match m.get("filter") { Some(f) => parse_filter(f)?, None => None };
                let fields = match m.get("fields") {
                    Some(Value::Object(fm)) => FieldProjection::from_fields_map(fm)?,
                    Some(Value::Null) | None => None,
                    Some(other) => return Err(DescriptorError::InvalidShape(other.to_string())),
                };
                Ok(ActionPermission::AllowRestricted { filter, fields })
            }
            other => Err(DescriptorError::InvalidShape(other.to_string())),
        }
    }
}

impl From<ActionPermission> for Value {
    fn from(p: ActionPermission) -> Self {
        match p {
            ActionPermission::Deny => Value::Bool(false),
            ActionPermission::AllowAll => Value::Bool(true),
            ActionPermission::AllowRestricted { filter, fields } => {
                let mut m = Map::new();
                if let Some(f) = filter { m.insert("filter".into(), Value::Object(f)); }
                if let Some(p) = fields { m.insert("fields".into(), Value::Object(p.to_fields_map())); }
                Value::Object(m)
            }
        }
    }
}

/// One client's rights on one resource. `None` means the key was absent, which is
/// distinct from an explicit `false` (see `resolver`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<ActionPermission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<ActionPermission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<ActionPermission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<ActionPermission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_own: Option<ActionPermission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_own: Option<ActionPermission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_own: Option<ActionPermission>,
}

impl PermissionDescriptor {
    /// Grant every action without restriction.
    pub fn all() -> Self {
        Self {
            create: Some(ActionPermission::AllowAll),
            read: Some(ActionPermission::AllowAll),
            update: Some(ActionPermission::AllowAll),
            delete: Some(ActionPermission::AllowAll),
            ..Default::default()
        }
    }

    pub fn from_json(v: Value) -> Result<Self, DescriptorError> {
        serde_json::from_value(v).map_err(|e| DescriptorError::InvalidShape(e.to_string()))
    }

    pub fn entry(&self, action: Action) -> Option<&ActionPermission> {
        match action {
            Action::Create => self.create.as_ref(),
            Action::Read => self.read.as_ref(),
            Action::Update => self.update.as_ref(),
            Action::Delete => self.delete.as_ref(),
        }
    }

    pub fn own_entry(&self, action: Action) -> Option<&ActionPermission> {
        match action {
            Action::Create => None,
            Action::Read => self.read_own.as_ref(),
            Action::Update => self.update_own.as_ref(),
            Action::Delete => self.delete_own.as_ref(),
        }
    }

    pub fn set(&mut self, action: Action, permission: ActionPermission) {
        let slot = match action {
            Action::Create => &mut self.create,
            Action::Read => &mut self.read,
            Action::Update => &mut self.update,
            Action::Delete => &mut self.delete,
        };
        *slot = Some(permission);
    }
}

/// Outcome of resolving one action on one resource for one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub filter: Option<Query>,
    pub projection: Option<FieldProjection>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AccessDecision {
    pub fn allow_all(reason: impl Into<String>) -> Self {
        Self { allowed: true, filter: None, projection: None, reason: Some(reason.into()) }
    }
    pub fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, filter: None, projection: None, reason: Some(reason.into()) }
    }
}
