use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_OWNER_FIELD: &str = "_createdBy";
pub const DEFAULT_CREATED_AT_FIELD: &str = "_createdAt";
pub const DEFAULT_COMPOSED_FIELD: &str = "_composed";
pub const DEFAULT_COMPOSE_MAX_DEPTH: u32 = 3;

/// Settings applied to every resource unless a collection overrides them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlobalAclConfig {
    /// Record field holding the id of the client that created it; own-scoped
    /// permissions filter on it.
    pub owner_field: String,
    pub created_at_field: String,
    /// Marker map added to documents whose reference fields were expanded.
    pub composed_field: String,
    /// Upper bound on nested reference expansion.
    pub compose_max_depth: u32,
}

impl Default for GlobalAclConfig {
    fn default() -> Self {
        Self {
            owner_field: DEFAULT_OWNER_FIELD.to_string(),
            created_at_field: DEFAULT_CREATED_AT_FIELD.to_string(),
            composed_field: DEFAULT_COMPOSED_FIELD.to_string(),
            compose_max_depth: DEFAULT_COMPOSE_MAX_DEPTH,
        }
    }
}

impl GlobalAclConfig {
    /// Defaults overlaid with `TOLLGATE_OWNER_FIELD` and `TOLLGATE_COMPOSE_MAX_DEPTH`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(v) = std::env::var("TOLLGATE_OWNER_FIELD") {
            if !v.trim().is_empty() { cfg.owner_field = v.trim().to_string(); }
        }
        if let Ok(v) = std::env::var("TOLLGATE_COMPOSE_MAX_DEPTH") {
            match v.trim().parse::<u32>() {
                Ok(d) => cfg.compose_max_depth = d,
                Err(_) => tracing::warn!(target: "tollgate::config", "ignoring invalid TOLLGATE_COMPOSE_MAX_DEPTH={:?}", v),
            }
        }
        cfg
    }
}

/// Per-collection overrides. Unspecified values inherit from Global.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CollectionAclConfig {
    pub owner_field: Option<String>,
    pub compose_max_depth: Option<u32>,
}

/// Fully resolved settings for one resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EffectiveConfig {
    pub owner_field: String,
    pub created_at_field: String,
    pub composed_field: String,
    pub compose_max_depth: u32,
}

impl EffectiveConfig {
    pub fn from_layers(global: &GlobalAclConfig, collection: Option<&CollectionAclConfig>) -> Self {
        let owner_field = collection
            .and_then(|c| c.owner_field.clone())
            .unwrap_or_else(|| global.owner_field.clone());
        let compose_max_depth = collection
            .and_then(|c| c.compose_max_depth)
            .unwrap_or(global.compose_max_depth);
        Self {
            owner_field,
            created_at_field: global.created_at_field.clone(),
            composed_field: global.composed_field.clone(),
            compose_max_depth,
        }
    }

    /// Fields a client may never write directly.
    pub fn internal_fields(&self) -> [&str; 4] {
        [crate::acl::ID_FIELD, &self.owner_field, &self.created_at_field, &self.composed_field]
    }

    /// Depth to compose to: the requested depth, capped by the configured maximum.
    pub fn compose_depth(&self, requested: Option<u32>) -> u32 {
        requested.map_or(self.compose_max_depth, |d| d.min(self.compose_max_depth))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub global: GlobalAclConfig,
    /// Keyed by resource key.
    pub collections: HashMap<String, CollectionAclConfig>,
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    pub fn effective_for(&self, resource_key: &str) -> EffectiveConfig {
        EffectiveConfig::from_layers(&self.global, self.collections.get(resource_key))
    }
}
