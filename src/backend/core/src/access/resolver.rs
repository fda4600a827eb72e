//! Access set derivation for inventories and tenants.
//!
//! Pure functions; every input is passed in explicitly, including the
//! results of platform access reviews.

use super::AccessSet;
use crate::resources::{Inventory, Tenant};

/// Access reviews gathered once per namespace pass and shared by every
/// tenant claiming that namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantAccessInputs {
    /// Who can create both inventories and secrets in the namespace.
    pub service_admin: AccessSet,
    /// Who can list inventories in the namespace.
    pub developer_review: AccessSet,
    /// Who can list every tenant in the cluster.
    pub tenant_list: AccessSet,
}

/// Principals that may view `inventory`.
///
/// An inventory with no authz declared inherits the developer defaults of
/// every tenant claiming its namespace. Any declaration, even an empty one,
/// replaces inheritance entirely.
pub fn resolve_inventory_access(inventory: &Inventory, tenants: &[Tenant]) -> AccessSet {
    let authz = &inventory.spec.authz;
    if !authz.is_unset() {
        return AccessSet::from(authz);
    }

    let namespace = inventory.metadata.namespace.as_deref().unwrap_or_default();
    let mut access = AccessSet::empty();
    for tenant in tenants
        .iter()
        .filter(|t| t.spec.inventory_namespace == namespace)
    {
        let developer = &tenant.spec.authz.developer;
        access.extend_from(developer.users(), developer.groups());
    }
    access
}

/// Developer access across all of a tenant's inventories.
///
/// Starts from the developer access review, then adds each inventory's
/// explicit authz, then the tenant defaults if at least one inventory
/// declares none.
pub fn consolidate_developer_access(
    tenant: &Tenant,
    inventories: &[Inventory],
    developer_review: &AccessSet,
) -> AccessSet {
    let namespace = tenant.spec.inventory_namespace.as_str();
    let mut access = developer_review.clone();
    let mut inherits_defaults = false;

    for inventory in inventories
        .iter()
        .filter(|i| i.metadata.namespace.as_deref() == Some(namespace))
    {
        let authz = &inventory.spec.authz;
        if authz.is_unset() {
            inherits_defaults = true;
        } else {
            access.extend_from(authz.users(), authz.groups());
        }
    }

    if inherits_defaults {
        let developer = &tenant.spec.authz.developer;
        access.extend_from(developer.users(), developer.groups());
    }
    access
}

/// Principals that may view `tenant`.
///
/// Service admins plus consolidated developers, minus anyone who can
/// already list every tenant.
pub fn resolve_tenant_access(
    tenant: &Tenant,
    inventories: &[Inventory],
    inputs: &TenantAccessInputs,
) -> AccessSet {
    let developers = consolidate_developer_access(tenant, inventories, &inputs.developer_review);
    inputs
        .service_admin
        .union(&developers)
        .subtract(&inputs.tenant_list)
}
