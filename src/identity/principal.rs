use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::acl::PermissionDescriptor;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    #[default]
    Client,
    Admin,
}

/// Authenticated API client and its per-resource permissions, as loaded for one
/// request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdentity {
    pub client_id: String,
    #[serde(default)]
    pub access_type: AccessType,
    #[serde(default)]
    pub resources: HashMap<String, PermissionDescriptor>,
}

impl ClientIdentity {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), ..Default::default() }
    }

    pub fn admin(client_id: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), access_type: AccessType::Admin, ..Default::default() }
    }

    pub fn with_resource(mut self, key: impl Into<String>, descriptor: PermissionDescriptor) -> Self {
        self.resources.insert(key.into(), descriptor);
        self
    }

    pub fn is_admin(&self) -> bool { self.access_type == AccessType::Admin }
}
