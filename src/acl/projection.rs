//! Field projections: which fields of a document a client may see or write.
//!
//! A projection is either an inclusion list or an exclusion list. The identifier field
//! survives every projection. Applying a projection never mutates its input and is
//! idempotent, so read shaping can safely be repeated at each composition level.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::model::{DescriptorError, Document, ID_FIELD};

// Top-level collection field names. Projections match top-level keys only, so dotted
// paths and operators such as `$where` are rejected.
static FIELD_NAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*$").ok());

fn is_field_name(name: &str) -> bool {
    FIELD_NAME.as_ref().map_or(true, |re| re.is_match(name))
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectionMode {
    Include,
    Exclude,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldProjection {
    pub mode: ProjectionMode,
    pub fields: BTreeSet<String>,
}

impl FieldProjection {
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { mode: ProjectionMode::Include, fields: fields.into_iter().map(Into::into).collect() }
    }

    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { mode: ProjectionMode::Exclude, fields: fields.into_iter().map(Into::into).collect() }
    }

    /// Projection that keeps nothing but the identifier.
    pub fn id_only() -> Self {
        Self { mode: ProjectionMode::Include, fields: BTreeSet::new() }
    }

    /// Build from an ACL/query `fields` map such as `{"title": 1}` or `{"title": 0}`.
    /// An empty map places no restriction and yields `None`.
    pub fn from_fields_map(map: &Map<String, Value>) -> Result<Option<Self>, DescriptorError> {
        let mut include = BTreeSet::new();
        let mut exclude = BTreeSet::new();
        for (field, v) in map {
            if !is_field_name(field) {
                return Err(DescriptorError::InvalidFieldName(field.clone()));
            }
            let keep = match v {
                Value::Bool(b) => *b,
                Value::Number(n) => match n.as_f64() {
                    Some(x) if x == 1.0 => true,
                    Some(x) if x == 0.0 => false,
                    _ => return Err(DescriptorError::InvalidFieldValue { field: field.clone() }),
                },
                _ => return Err(DescriptorError::InvalidFieldValue { field: field.clone() }),
            };
            if keep { include.insert(field.clone()); } else { exclude.insert(field.clone()); }
        }
        match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Ok(None),
            (false, true) => Ok(Some(Self { mode: ProjectionMode::Include, fields: include })),
            (true, false) => Ok(Some(Self { mode: ProjectionMode::Exclude, fields: exclude })),
            (false, false) => Err(DescriptorError::MixedProjection),
        }
    }

    pub fn to_fields_map(&self) -> Map<String, Value> {
        let flag = match self.mode { ProjectionMode::Include => 1, ProjectionMode::Exclude => 0 };
        self.fields.iter().map(|f| (f.clone(), Value::from(flag))).collect()
    }

    /// Whether `field` survives this projection.
    pub fn allows(&self, field: &str) -> bool {
        if field == ID_FIELD {
            return true;
        }
        match self.mode {
            ProjectionMode::Include => self.fields.contains(field),
            ProjectionMode::Exclude => !self.fields.contains(field),
        }
    }
}

/// Narrow an ACL projection by a projection the caller asked for. The result never
/// exposes a field the ACL projection hides.
pub fn merge(acl: Option<&FieldProjection>, requested: Option<&FieldProjection>) -> Option<FieldProjection> {
    use ProjectionMode::*;
    match (acl, requested) {
        (None, None) => None,
        (Some(p), None) | (None, Some(p)) => Some(p.clone()),
        (Some(a), Some(r)) => Some(match (a.mode, r.mode) {
            (Include, Include) => FieldProjection { mode: Include, fields: a.fields.intersection(&r.fields).cloned().collect() },
            (Include, Exclude) => FieldProjection { mode: Include, fields: a.fields.difference(&r.fields).cloned().collect() },
            (Exclude, Include) => FieldProjection { mode: Include, fields: r.fields.difference(&a.fields).cloned().collect() },
            (Exclude, Exclude) => FieldProjection { mode: Exclude, fields: a.fields.union(&r.fields).cloned().collect() },
        }),
    }
}

pub fn project(document: &Document, projection: Option<&FieldProjection>) -> Document {
    match projection {
        None => document.clone(),
        Some(p) => document.iter().filter(|(k, _)| p.allows(k)).map(|(k, v)| (k.clone(), v.clone())).collect(),
    }
}

pub fn project_many(documents: &[Document], projection: Option<&FieldProjection>) -> Vec<Document> {
    documents.iter().map(|d| project(d, projection)).collect()
}

/// Write shaping: keep the writable part of `payload` and report which fields were
/// dropped, in payload order.
pub fn strip(payload: &Document, projection: Option<&FieldProjection>) -> (Document, Vec<String>) {
    let Some(p) = projection else { return (payload.clone(), Vec::new()) };
    let mut kept = Map::new();
    let mut removed = Vec::new();
    for (k, v) in payload {
        if p.allows(k) { kept.insert(k.clone(), v.clone()); } else { removed.push(k.clone()); }
    }
    (kept, removed)
}
