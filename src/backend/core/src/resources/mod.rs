//! Typed object model for the objects the core reads and writes.
//!
//! - **dbaas**: Tenant, Inventory and Config (externally owned inputs)
//! - **rbac**: Role, ClusterRole, RoleBinding, ClusterRoleBinding (derived)
//! - **quota**: ResourceQuota (derived from the active Config)
//! - **condition**: status condition helpers
//!
//! Every object implements [`Resource`], which is what the store boundary
//! marshals to and from raw JSON documents.

pub mod condition;
pub mod dbaas;
pub mod quota;
pub mod rbac;

pub use condition::{
    find_condition, is_condition_true, set_condition, Condition, ConditionStatus,
};
pub use dbaas::{
    Config, ConfigSpec, ConfigStatus, Inventory, InventorySpec, InventoryStatus, ProviderRef,
    Tenant, TenantAuthz, TenantSpec, UsersGroups,
};
pub use quota::{ResourceQuota, ResourceQuotaSpec};
pub use rbac::{
    ClusterRole, ClusterRoleBinding, HasBinding, HasRules, PolicyRule, Role, RoleBinding,
    RoleRef, Subject, SubjectKind,
};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// API group of the DBaaS custom resources.
pub const DBAAS_GROUP: &str = "dbaas.redhat.com";
/// API version of the DBaaS custom resources.
pub const DBAAS_API_VERSION: &str = "dbaas.redhat.com/v1alpha1";
/// API group of the RBAC objects.
pub const RBAC_GROUP: &str = "rbac.authorization.k8s.io";
/// API version of the RBAC objects.
pub const RBAC_API_VERSION: &str = "rbac.authorization.k8s.io/v1";
/// API version of core objects.
pub const CORE_API_VERSION: &str = "v1";

// ═══════════════════════════════════════════════════════════════════════════════
// Kind
// ═══════════════════════════════════════════════════════════════════════════════

/// Every object kind the core touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    #[serde(rename = "DBaaSTenant")]
    Tenant,
    #[serde(rename = "DBaaSInventory")]
    Inventory,
    #[serde(rename = "DBaaSConfig")]
    Config,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
    ResourceQuota,
}

impl Kind {
    /// Wire name of the kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "DBaaSTenant",
            Self::Inventory => "DBaaSInventory",
            Self::Config => "DBaaSConfig",
            Self::Role => "Role",
            Self::RoleBinding => "RoleBinding",
            Self::ClusterRole => "ClusterRole",
            Self::ClusterRoleBinding => "ClusterRoleBinding",
            Self::ResourceQuota => "ResourceQuota",
        }
    }

    pub const fn api_version(&self) -> &'static str {
        match self {
            Self::Tenant | Self::Inventory | Self::Config => DBAAS_API_VERSION,
            Self::Role | Self::RoleBinding | Self::ClusterRole | Self::ClusterRoleBinding => {
                RBAC_API_VERSION
            }
            Self::ResourceQuota => CORE_API_VERSION,
        }
    }

    /// Tenants and the cluster-wide RBAC kinds have no namespace.
    pub const fn is_namespaced(&self) -> bool {
        !matches!(
            self,
            Self::Tenant | Self::ClusterRole | Self::ClusterRoleBinding
        )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Metadata
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity of an object within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Declared ownership link used for cascading garbage collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

impl OwnerReference {
    /// Controller reference pointing at `owner`.
    pub fn controller_of<R: Resource>(owner: &R) -> Self {
        Self {
            api_version: R::KIND.api_version().to_string(),
            kind: R::KIND.as_str().to_string(),
            name: owner.meta().name.clone(),
            uid: owner.meta().uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}

/// Standard object metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// True when one of the owner references carries `uid`.
    pub fn is_owned_by(&self, uid: &str) -> bool {
        !uid.is_empty() && self.owner_references.iter().any(|r| r.uid == uid)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Resource
// ═══════════════════════════════════════════════════════════════════════════════

/// A typed object that can cross the store boundary.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: Kind;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        &self.meta().name
    }

    fn namespace(&self) -> Option<&str> {
        self.meta().namespace.as_deref()
    }

    fn key(&self) -> ObjectKey {
        self.meta().key()
    }
}

macro_rules! impl_resource {
    ($ty:ty, $kind:expr) => {
        impl $crate::resources::Resource for $ty {
            const KIND: $crate::resources::Kind = $kind;

            fn meta(&self) -> &$crate::resources::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut $crate::resources::ObjectMeta {
                &mut self.metadata
            }
        }
    };
}

pub(crate) use impl_resource;
