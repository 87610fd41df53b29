//! Access resolution: one client, one resource, one action -> `AccessDecision`.
//!
//! Resolution is total. A missing resource entry or a missing action grants nothing.
//! Own-scoped entries (`readOwn`, `updateOwn`, `deleteOwn`) are consulted only when the
//! plain entry is absent; an explicit `false` on the plain entry is final.

use tracing::debug;

use super::filter;
use super::model::{AccessDecision, Action, ActionPermission, PermissionDescriptor, Query};
use crate::identity::ClientIdentity;

/// Who owns a record: the record field holding the creator and the current client.
#[derive(Debug, Clone, Copy)]
pub struct Ownership<'a> {
    pub field: &'a str,
    pub client_id: &'a str,
}

impl Ownership<'_> {
    pub fn filter(&self) -> Query {
        filter::field_equals(self.field, self.client_id)
    }
}

pub fn resolve(client: &ClientIdentity, resource_key: &str, action: Action, owner_field: &str) -> AccessDecision {
    let decision = if client.is_admin() {
        AccessDecision::allow_all("admin")
    } else {
        match client.resources.get(resource_key) {
            None => AccessDecision::deny("no_resource_permissions"),
            Some(d) => resolve_descriptor(d, action, Ownership { field: owner_field, client_id: &client.client_id }),
        }
    };
    debug!(
        target: "tollgate::acl",
        "resolve client={} resource={} action={} allowed={} filtered={} projected={} reason={:?}",
        client.client_id,
        resource_key,
        action.as_str(),
        decision.allowed,
        decision.filter.is_some(),
        decision.projection.is_some(),
        decision.reason
    );
    decision
}

pub fn resolve_descriptor(descriptor: &PermissionDescriptor, action: Action, owner: Ownership<'_>) -> AccessDecision {
    if let Some(p) = descriptor.entry(action) {
        return from_permission(p, None, action.as_str());
    }
    match (descriptor.own_entry(action), action.own_key()) {
        (Some(p), Some(key)) => from_permission(p, Some(owner.filter()), key),
        _ => AccessDecision::deny(format!("no_{}_permission", action.as_str())),
    }
}

fn from_permission(p: &ActionPermission, own: Option<Query>, key: &str) -> AccessDecision {
    match p {
        ActionPermission::Deny => AccessDecision::deny(format!("{}_denied", key)),
        ActionPermission::AllowAll => AccessDecision {
            allowed: true,
            filter: own,
            projection: None,
            reason: Some(format!("{}_allowed", key)),
        },
        // An object entry is an allow, with or without restrictions.
        ActionPermission::AllowRestricted { filter: f, fields } => AccessDecision {
            allowed: true,
            filter: filter::combine_opt(f.as_ref(), own.as_ref()),
            projection: fields.clone(),
            reason: Some(format!("{}_restricted", key)),
        },
    }
}
