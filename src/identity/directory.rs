//! Where client permissions come from.
//!
//! Permissions are read per request so that grants changed by an administrator apply
//! to the very next request. `CachedDirectory` avoids the round trip when the backing
//! directory is remote; entries are dropped explicitly by client id, or all at once by
//! bumping the global epoch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::debug;

use super::principal::ClientIdentity;
use crate::acl::{DescriptorError, PermissionDescriptor};

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("unknown client: {0}")]
    UnknownClient(String),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_permissions(&self, client_id: &str) -> Result<ClientIdentity, DirectoryError>;
}

/// Process-local directory; clients can be replaced at runtime.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    clients: RwLock<HashMap<String, ClientIdentity>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self { Self::default() }

    pub fn with_clients<I: IntoIterator<Item = ClientIdentity>>(clients: I) -> Self {
        let d = Self::new();
        for c in clients { d.upsert(c); }
        d
    }

    /// Load from a JSON array of clients.
    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        let clients: Vec<ClientIdentity> = serde_json::from_str(s)?;
        Ok(Self::with_clients(clients))
    }

    pub fn upsert(&self, client: ClientIdentity) {
        self.clients.write().insert(client.client_id.clone(), client);
    }

    /// Replace one resource entry of an existing client. Returns false when the client
    /// is unknown.
    pub fn set_resource(&self, client_id: &str, resource: &str, descriptor: PermissionDescriptor) -> bool {
        let mut w = self.clients.write();
        let Some(c) = w.get_mut(client_id) else { return false };
        c.resources.insert(resource.to_string(), descriptor);
        true
    }

    pub fn remove(&self, client_id: &str) -> bool {
        self.clients.write().remove(client_id).is_some()
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn get_permissions(&self, client_id: &str) -> Result<ClientIdentity, DirectoryError> {
        self.clients
            .read()
            .get(client_id)
            .cloned()
            .ok_or_else(|| DirectoryError::UnknownClient(client_id.to_string()))
    }
}

/// Read-through cache in front of another directory.
///
/// Entries are tagged with the global epoch and the client's own epoch at the time the
/// fetch started. A fill whose epochs moved while the inner directory was answering is
/// returned to its caller but never cached.
pub struct CachedDirectory<D> {
    inner: D,
    entries: RwLock<HashMap<String, (u64, u64, ClientIdentity)>>,
    epoch: AtomicU64,
    client_epochs: RwLock<HashMap<String, u64>>,
}

impl<D: Directory> CachedDirectory<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(1),
            client_epochs: RwLock::new(HashMap::new()),
        }
    }

    pub fn inner(&self) -> &D { &self.inner }

    pub fn epoch_global(&self) -> u64 { self.epoch.load(Ordering::Relaxed) }

    pub fn epoch_client(&self, client_id: &str) -> u64 {
        *self.client_epochs.read().get(client_id).unwrap_or(&1)
    }

    /// Drop the client's entry and bump its epoch; returns whether an entry was cached.
    pub fn invalidate(&self, client_id: &str) -> bool {
        let ep = {
            let mut m = self.client_epochs.write();
            let v = m.get(client_id).copied().unwrap_or(1) + 1;
            m.insert(client_id.to_string(), v);
            v
        };
        let removed = self.entries.write().remove(client_id).is_some();
        debug!(target: "tollgate::directory", "invalidate client={} epoch={} removed={}", client_id, ep, removed);
        removed
    }

    /// Drop every cached entry; returns the new epoch.
    pub fn invalidate_all(&self) -> u64 {
        let ep = self.epoch.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(target: "tollgate::directory", "invalidate_all epoch={}", ep);
        ep
    }

    pub fn len(&self) -> usize { self.entries.read().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

#[async_trait]
impl<D: Directory> Directory for CachedDirectory<D> {
    async fn get_permissions(&self, client_id: &str) -> Result<ClientIdentity, DirectoryError> {
        let global = self.epoch_global();
        let client = self.epoch_client(client_id);
        let cached = self
            .entries
            .read()
            .get(client_id)
            .filter(|(g, c, _)| *g == global && *c == client)
            .map(|(_, _, identity)| identity.clone());
        if let Some(identity) = cached {
            return Ok(identity);
        }
        let fetched = self.inner.get_permissions(client_id).await?;
        let mut w = self.entries.write();
        if self.epoch_global() == global && self.epoch_client(client_id) == client {
            w.insert(client_id.to_string(), (global, client, fetched.clone()));
            debug!(target: "tollgate::directory", "cache fill client={} epoch={}/{}", client_id, global, client);
        } else {
            debug!(target: "tollgate::directory", "cache fill skipped client={}: invalidated during fetch", client_id);
        }
        Ok(fetched)
    }
}
