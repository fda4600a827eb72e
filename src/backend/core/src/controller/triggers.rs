//! Mapping store events to reconcile keys.

use crate::orchestrator::TenantNamespaceSnapshot;
use crate::resources::Kind;
use crate::store::WatchEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of scheduling. Two reconciles for the same key never overlap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconcileKey {
    /// Every tenant and inventory of one inventory namespace.
    Authz { namespace: String },
    /// One config object.
    Config { namespace: String, name: String },
}

impl ReconcileKey {
    pub fn authz(namespace: impl Into<String>) -> Self {
        Self::Authz {
            namespace: namespace.into(),
        }
    }

    pub fn config(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Config {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Authz { namespace } | Self::Config { namespace, .. } => namespace,
        }
    }

    /// Label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authz { .. } => "authz",
            Self::Config { .. } => "config",
        }
    }
}

impl fmt::Display for ReconcileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authz { namespace } => write!(f, "{}/authz-{}", namespace, namespace),
            Self::Config { namespace, name } => write!(f, "{}/{}", namespace, name),
        }
    }
}

/// Keys to reconcile in response to `event`.
///
/// Role and RoleBinding events only use metadata. Inventory events outside
/// tenant namespaces are dropped. Tenant events also map to every namespace
/// the snapshot still records for that tenant.
pub fn map_event(event: &WatchEvent, tenants: &TenantNamespaceSnapshot) -> Vec<ReconcileKey> {
    let namespace = event.meta.namespace.as_deref();
    match event.kind {
        Kind::Tenant => {
            // The namespace the tenant claimed before this change must also
            // be revisited so inherited access is revoked there.
            let current = event
                .object
                .pointer("/spec/inventoryNamespace")
                .and_then(|ns| ns.as_str())
                .filter(|ns| !ns.is_empty());
            let mut keys: Vec<ReconcileKey> =
                current.into_iter().map(ReconcileKey::authz).collect();
            for previous in tenants.namespaces_of(&event.meta.name) {
                if current != Some(previous) {
                    keys.push(ReconcileKey::authz(previous));
                }
            }
            keys
        }
        Kind::Inventory => namespace
            .filter(|ns| tenants.contains(ns))
            .map(|ns| vec![ReconcileKey::authz(ns)])
            .unwrap_or_default(),
        Kind::Role | Kind::RoleBinding => namespace
            .map(|ns| vec![ReconcileKey::authz(ns)])
            .unwrap_or_default(),
        Kind::Config => namespace
            .map(|ns| vec![ReconcileKey::config(ns, event.meta.name.clone())])
            .unwrap_or_default(),
        Kind::ResourceQuota => match namespace {
            Some(ns) => event
                .meta
                .owner_references
                .iter()
                .filter(|owner| owner.kind == Kind::Config.as_str())
                .map(|owner| ReconcileKey::config(ns, owner.name.clone()))
                .collect(),
            None => Vec::new(),
        },
        Kind::ClusterRole | Kind::ClusterRoleBinding => Vec::new(),
    }
}
