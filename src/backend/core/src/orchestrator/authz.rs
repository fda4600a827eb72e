//! Per-namespace authorization pass.

use super::snapshot::TenantNamespaceIndex;
use crate::access::{
    resolve_inventory_access, resolve_tenant_access, AccessReviewer, ReviewQueries,
};
use crate::error::Result;
use crate::rbac::{
    binding_name, inventory_rbac_objects, inventory_role_name, tenant_rbac_objects,
    EnsureOutcome, RbacSynchronizer,
};
use crate::resources::{Inventory, ObjectKey, RoleBinding, Tenant};
use crate::store::{get_opt_typed, list_typed, ListParams, ObjectStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

/// Counts of what one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub namespace: String,
    pub snapshot_version: u64,
    pub tenants: usize,
    pub inventories: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
    pub not_owned: usize,
    /// Namespaces that lost their last tenant since the previous snapshot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub released_namespaces: Vec<String>,
}

impl PassSummary {
    fn new(namespace: &str, snapshot_version: u64) -> Self {
        Self {
            namespace: namespace.to_string(),
            snapshot_version,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: &EnsureOutcome) {
        match outcome {
            EnsureOutcome::Created => self.created += 1,
            EnsureOutcome::Updated => self.updated += 1,
            EnsureOutcome::Unchanged => self.unchanged += 1,
            EnsureOutcome::Rejected { .. } => self.rejected += 1,
            EnsureOutcome::NotOwned => self.not_owned += 1,
        }
    }

    /// Objects written during the pass.
    pub fn writes(&self) -> usize {
        self.created + self.updated
    }

    /// Whether the namespace was claimed by any tenant.
    pub fn is_tenant_namespace(&self) -> bool {
        self.tenants > 0
    }

    pub fn merge(&mut self, other: &PassSummary) {
        self.tenants += other.tenants;
        self.inventories += other.inventories;
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.rejected += other.rejected;
        self.not_owned += other.not_owned;
        for namespace in &other.released_namespaces {
            if !self.released_namespaces.contains(namespace) {
                self.released_namespaces.push(namespace.clone());
            }
        }
        self.snapshot_version = self.snapshot_version.max(other.snapshot_version);
    }
}

/// Derives and materializes the RBAC objects of one inventory namespace.
#[derive(Clone)]
pub struct AuthzOrchestrator {
    store: Arc<dyn ObjectStore>,
    sync: RbacSynchronizer,
    reviews: ReviewQueries,
    index: Arc<TenantNamespaceIndex>,
}

impl AuthzOrchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        reviewer: Arc<dyn AccessReviewer>,
        index: Arc<TenantNamespaceIndex>,
    ) -> Self {
        Self {
            sync: RbacSynchronizer::new(store.clone()),
            reviews: ReviewQueries::new(reviewer),
            store,
            index,
        }
    }

    pub fn index(&self) -> &Arc<TenantNamespaceIndex> {
        &self.index
    }

    /// Reconcile every tenant and inventory of `namespace`.
    ///
    /// Namespaces not claimed by a tenant are skipped, except for inventories
    /// that still carry a derived binding: those are re-resolved so access
    /// inherited from departed tenants is revoked. Safety-gate rejections are
    /// counted and the pass continues; store errors abort the pass and are
    /// returned to the scheduler.
    pub async fn reconcile_namespace(&self, namespace: &str) -> Result<PassSummary> {
        let span = info_span!("reconcile_authz", namespace = %namespace);
        self.run_pass(namespace).instrument(span).await
    }

    async fn has_derived_binding(&self, inventory: &Inventory) -> Result<bool> {
        let key = ObjectKey::namespaced(
            inventory.metadata.namespace.clone().unwrap_or_default(),
            binding_name(&inventory_role_name(&inventory.metadata.name)),
        );
        let binding: Option<RoleBinding> = get_opt_typed(self.store.as_ref(), &key).await?;
        Ok(binding.is_some())
    }

    async fn run_pass(&self, namespace: &str) -> Result<PassSummary> {
        let started = Instant::now();
        let previous = self.index.current();
        let (snapshot, all_tenants) = self.index.refresh(self.store.as_ref()).await?;
        let mut summary = PassSummary::new(namespace, snapshot.version());
        summary.released_namespaces = snapshot.released_since(&previous);

        let tenants: Vec<Tenant> = all_tenants
            .into_iter()
            .filter(|t| t.spec.inventory_namespace == namespace)
            .collect();
        let mut inventories: Vec<Inventory> =
            list_typed(self.store.as_ref(), &ListParams::in_namespace(namespace)).await?;

        if tenants.is_empty() {
            let mut bound = Vec::new();
            for inventory in inventories {
                if self.has_derived_binding(&inventory).await? {
                    bound.push(inventory);
                }
            }
            if bound.is_empty() {
                debug!("Namespace is not claimed by any tenant, skipping");
                return Ok(summary);
            }
            debug!(
                inventories = bound.len(),
                "Namespace lost its tenants, revoking inherited access"
            );
            inventories = bound;
        }

        summary.tenants = tenants.len();
        summary.inventories = inventories.len();

        if !tenants.is_empty() {
            let inputs = self.reviews.tenant_inputs(namespace).await;
            for tenant in &tenants {
                let access = resolve_tenant_access(tenant, &inventories, &inputs);
                let (role, binding) = tenant_rbac_objects(tenant, &access);
                summary.record(&self.sync.ensure(&role, tenant).await?);
                summary.record(&self.sync.ensure(&binding, tenant).await?);
            }
        }

        for inventory in &inventories {
            let access = resolve_inventory_access(inventory, &tenants);
            let (role, binding) = inventory_rbac_objects(inventory, &access);
            summary.record(&self.sync.ensure(&role, inventory).await?);
            summary.record(&self.sync.ensure(&binding, inventory).await?);
        }

        metrics::histogram!("dbaas_authz_pass_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        info!(
            tenants = summary.tenants,
            inventories = summary.inventories,
            created = summary.created,
            updated = summary.updated,
            unchanged = summary.unchanged,
            rejected = summary.rejected,
            duration_ms = started.elapsed().as_millis() as u64,
            "Authorization pass complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::StaticAccessReviewer;
    use crate::store::{create_typed, delete_typed, get_typed, InMemoryStore};

    #[tokio::test]
    async fn test_unclaimed_namespace_is_skipped() {
        let store = Arc::new(InMemoryStore::new());
        create_typed(store.as_ref(), &Inventory::new("orphan", "i")).await.unwrap();
        let orchestrator = AuthzOrchestrator::new(
            store.clone(),
            Arc::new(StaticAccessReviewer::default()),
            Arc::new(TenantNamespaceIndex::new()),
        );

        let writes = store.write_count();
        let summary = orchestrator.reconcile_namespace("orphan").await.unwrap();
        assert!(!summary.is_tenant_namespace());
        assert_eq!(summary.writes(), 0);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_pass_creates_four_objects_per_pair() {
        let store = Arc::new(InMemoryStore::new());
        create_typed(store.as_ref(), &Tenant::new("t", "ns")).await.unwrap();
        create_typed(store.as_ref(), &Inventory::new("ns", "i")).await.unwrap();
        let orchestrator = AuthzOrchestrator::new(
            store.clone(),
            Arc::new(StaticAccessReviewer::default()),
            Arc::new(TenantNamespaceIndex::new()),
        );

        let summary = orchestrator.reconcile_namespace("ns").await.unwrap();
        assert_eq!(summary.created, 4);
        assert_eq!(summary.snapshot_version, 1);
        assert!(orchestrator.index().current().contains("ns"));
    }

    #[tokio::test]
    async fn test_released_namespace_revokes_inherited_access() {
        let store = Arc::new(InMemoryStore::new());
        let tenant = Tenant::new("t", "ns").with_developers(&["alice"], &[]);
        create_typed(store.as_ref(), &tenant).await.unwrap();
        create_typed(store.as_ref(), &Inventory::new("ns", "i")).await.unwrap();
        let orchestrator = AuthzOrchestrator::new(
            store.clone(),
            Arc::new(StaticAccessReviewer::default()),
            Arc::new(TenantNamespaceIndex::new()),
        );
        orchestrator.reconcile_namespace("ns").await.unwrap();

        delete_typed::<Tenant>(store.as_ref(), &ObjectKey::cluster("t")).await.unwrap();
        let summary = orchestrator.reconcile_namespace("ns").await.unwrap();

        assert!(!summary.is_tenant_namespace());
        assert_eq!(summary.inventories, 1);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.released_namespaces, ["ns"]);
        let key = ObjectKey::namespaced("ns", binding_name(&inventory_role_name("i")));
        let binding: RoleBinding = get_typed(store.as_ref(), &key).await.unwrap();
        assert!(binding.subjects.is_empty());

        let again = orchestrator.reconcile_namespace("ns").await.unwrap();
        assert_eq!(again.writes(), 0);
        assert!(again.released_namespaces.is_empty());
    }

    #[test]
    fn test_summary_merge() {
        let mut total = PassSummary::default();
        let mut pass = PassSummary::new("ns", 3);
        pass.record(&EnsureOutcome::Created);
        pass.record(&EnsureOutcome::Rejected { verbs: vec!["list".into()] });
        total.merge(&pass);
        total.merge(&pass);

        assert_eq!(total.created, 2);
        assert_eq!(total.rejected, 2);
        assert_eq!(total.snapshot_version, 3);
        assert_eq!(total.writes(), 2);
    }
}
