//! DBaaS custom resources: Tenant, Inventory and Config.

use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::{impl_resource, Kind, ObjectMeta};

// ═══════════════════════════════════════════════════════════════════════════════
// Users and groups
// ═══════════════════════════════════════════════════════════════════════════════

/// An authorization declaration.
///
/// Absence and presence are distinct: `users: None` means "not declared",
/// `users: Some(vec![])` means "declared as nobody".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsersGroups {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

impl UsersGroups {
    pub fn new(users: Vec<String>, groups: Vec<String>) -> Self {
        Self {
            users: Some(users),
            groups: Some(groups),
        }
    }

    /// Neither users nor groups declared.
    pub fn is_unset(&self) -> bool {
        self.users.is_none() && self.groups.is_none()
    }

    pub fn users(&self) -> &[String] {
        self.users.as_deref().unwrap_or_default()
    }

    pub fn groups(&self) -> &[String] {
        self.groups.as_deref().unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tenant
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantAuthz {
    /// Default access for inventories that declare none.
    #[serde(default)]
    pub developer: UsersGroups,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    pub inventory_namespace: String,
    #[serde(default)]
    pub authz: TenantAuthz,
}

/// Administrative boundary claiming one inventory namespace. Cluster scoped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub metadata: ObjectMeta,
    pub spec: TenantSpec,
}

impl Tenant {
    pub fn new(name: impl Into<String>, inventory_namespace: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::cluster(name),
            spec: TenantSpec {
                inventory_namespace: inventory_namespace.into(),
                authz: TenantAuthz::default(),
            },
        }
    }

    pub fn with_developers(mut self, users: &[&str], groups: &[&str]) -> Self {
        self.spec.authz.developer = UsersGroups::new(
            users.iter().map(|s| s.to_string()).collect(),
            groups.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

impl_resource!(Tenant, Kind::Tenant);

// ═══════════════════════════════════════════════════════════════════════════════
// Inventory
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRef {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventorySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_ref: Option<ProviderRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_ref: Option<String>,
    /// Explicit access; when unset the tenant developer defaults apply.
    #[serde(default)]
    pub authz: UsersGroups,
    /// Local override of the namespace config's provisioning default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_provisions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_namespaces: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// A registered database-provider account within a namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: InventorySpec,
    #[serde(default)]
    pub status: InventoryStatus,
}

impl Inventory {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::namespaced(namespace, name),
            ..Default::default()
        }
    }

    pub fn with_authz(mut self, users: &[&str], groups: &[&str]) -> Self {
        self.spec.authz = UsersGroups::new(
            users.iter().map(|s| s.to_string()).collect(),
            groups.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

impl_resource!(Inventory, Kind::Inventory);

// ═══════════════════════════════════════════════════════════════════════════════
// Config
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_provisions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_namespaces: Option<Vec<String>>,
    /// Hide the namespace's inventories from the console plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_in_ui: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// Namespace-scoped policy object; at most one per namespace is active.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ConfigSpec,
    #[serde(default)]
    pub status: ConfigStatus,
}

impl Config {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::namespaced(namespace, name),
            ..Default::default()
        }
    }
}

impl_resource!(Config, Kind::Config);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_vs_empty_authz() {
        let inventory: Inventory = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "i1", "namespace": "ns"},
            "spec": {}
        }))
        .unwrap();
        assert!(inventory.spec.authz.is_unset());

        let inventory: Inventory = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "i1", "namespace": "ns"},
            "spec": {"authz": {"users": []}}
        }))
        .unwrap();
        assert!(!inventory.spec.authz.is_unset());
        assert!(inventory.spec.authz.users().is_empty());
        assert!(inventory.spec.authz.groups().is_empty());
    }

    #[test]
    fn test_tenant_wire_format() {
        let tenant: Tenant = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "t1"},
            "spec": {
                "inventoryNamespace": "ns",
                "authz": {"developer": {"groups": ["system:authenticated"]}}
            }
        }))
        .unwrap();
        assert_eq!(tenant.spec.inventory_namespace, "ns");
        assert_eq!(tenant.spec.authz.developer.groups(), ["system:authenticated"]);
        assert!(tenant.spec.authz.developer.users().is_empty());
    }

    #[test]
    fn test_config_spec_camel_case() {
        let mut config = Config::new("ns", "c1");
        config.spec.disable_provisions = Some(true);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["spec"]["disableProvisions"], true);
    }
}
