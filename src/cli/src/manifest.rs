//! YAML manifests seeding the in-memory store.

use anyhow::{Context, Result};
use dbaas_authz_core::access::{StaticAccessReviewer, StaticGrant};
use dbaas_authz_core::resources::{Config, Inventory, Resource, Tenant};
use dbaas_authz_core::store::{create_typed, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Objects and access review answers for one scenario.
///
/// ```yaml
/// tenants:
///   - metadata: { name: acme }
///     spec: { inventoryNamespace: acme-inv }
/// inventories:
///   - metadata: { name: mongo, namespace: acme-inv }
/// configs:
///   - metadata: { name: cluster, namespace: openshift-dbaas-operator }
/// accessReviews:
///   - verb: list
///     resource: dbaasinventories
///     namespace: acme-inv
///     users: [alice]
/// ```
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Manifest {
    pub tenants: Vec<Tenant>,
    pub inventories: Vec<Inventory>,
    pub configs: Vec<Config>,
    pub access_reviews: Vec<StaticGrant>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let manifest: Manifest = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))?;
        Ok(manifest)
    }

    /// Reviewer answering from `accessReviews`.
    pub fn reviewer(&self) -> StaticAccessReviewer {
        StaticAccessReviewer::new(self.access_reviews.clone())
    }

    /// Create every object in `store`. Returns the number created.
    pub async fn seed(&self, store: &dyn ObjectStore) -> Result<usize> {
        for tenant in &self.tenants {
            create_typed(store, tenant)
                .await
                .with_context(|| format!("Failed to seed tenant {}", tenant.key()))?;
        }
        for inventory in &self.inventories {
            create_typed(store, inventory)
                .await
                .with_context(|| format!("Failed to seed inventory {}", inventory.key()))?;
        }
        for config in &self.configs {
            create_typed(store, config)
                .await
                .with_context(|| format!("Failed to seed config {}", config.key()))?;
        }
        Ok(self.tenants.len() + self.inventories.len() + self.configs.len())
    }

    /// Inventory namespaces claimed by at least one tenant.
    pub fn tenant_namespaces(&self) -> BTreeSet<&str> {
        self.tenants
            .iter()
            .map(|t| t.spec.inventory_namespace.as_str())
            .collect()
    }

    pub fn tenants_in(&self, namespace: &str) -> Vec<Tenant> {
        self.tenants
            .iter()
            .filter(|t| t.spec.inventory_namespace == namespace)
            .cloned()
            .collect()
    }

    pub fn inventories_in(&self, namespace: &str) -> Vec<Inventory> {
        self.inventories
            .iter()
            .filter(|i| i.namespace() == Some(namespace))
            .cloned()
            .collect()
    }
}
