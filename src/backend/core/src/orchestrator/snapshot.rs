//! Versioned view of which namespaces are claimed by tenants.
//!
//! Rebuilt at the start of every authorization pass and read by the event
//! mapper to decide whether an inventory change is worth a reconcile.

use crate::error::Result;
use crate::resources::Tenant;
use crate::store::{list_typed, ListParams, ObjectStore};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Immutable tenant namespace view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantNamespaceSnapshot {
    version: u64,
    /// Inventory namespace to the tenants claiming it.
    namespaces: BTreeMap<String, BTreeSet<String>>,
}

impl TenantNamespaceSnapshot {
    pub fn from_tenants(version: u64, tenants: &[Tenant]) -> Self {
        let mut namespaces: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for tenant in tenants {
            namespaces
                .entry(tenant.spec.inventory_namespace.clone())
                .or_default()
                .insert(tenant.metadata.name.clone());
        }
        Self {
            version,
            namespaces,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    /// Names of the tenants claiming `namespace`.
    pub fn tenants_in(&self, namespace: &str) -> Vec<&str> {
        self.namespaces
            .get(namespace)
            .map(|names| names.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Namespaces claimed by the tenant named `tenant`.
    pub fn namespaces_of(&self, tenant: &str) -> Vec<&str> {
        self.namespaces
            .iter()
            .filter(|(_, tenants)| tenants.contains(tenant))
            .map(|(namespace, _)| namespace.as_str())
            .collect()
    }

    /// Namespaces claimed in `previous` but no longer claimed here.
    pub fn released_since(&self, previous: &TenantNamespaceSnapshot) -> Vec<String> {
        previous
            .namespaces
            .keys()
            .filter(|namespace| !self.namespaces.contains_key(*namespace))
            .cloned()
            .collect()
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

/// Publishes the latest [`TenantNamespaceSnapshot`].
#[derive(Debug, Default)]
pub struct TenantNamespaceIndex {
    current: RwLock<Arc<TenantNamespaceSnapshot>>,
    version: AtomicU64,
}

impl TenantNamespaceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently published snapshot.
    pub fn current(&self) -> Arc<TenantNamespaceSnapshot> {
        self.current.read().clone()
    }

    /// Build a snapshot from `tenants` and publish it.
    pub fn publish(&self, tenants: &[Tenant]) -> Arc<TenantNamespaceSnapshot> {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(TenantNamespaceSnapshot::from_tenants(version, tenants));
        *self.current.write() = snapshot.clone();
        trace!(version, namespaces = snapshot.len(), "Published tenant namespace snapshot");
        snapshot
    }

    /// List tenants from `store` and publish a fresh snapshot.
    pub async fn refresh(&self, store: &dyn ObjectStore) -> Result<(Arc<TenantNamespaceSnapshot>, Vec<Tenant>)> {
        let tenants: Vec<Tenant> = list_typed(store, &ListParams::all()).await?;
        let snapshot = self.publish(&tenants);
        Ok((snapshot, tenants))
    }
}
