//! Desired RBAC objects, computed fresh on every pass.

use crate::access::{to_subjects, AccessSet};
use crate::resources::{
    ClusterRole, ClusterRoleBinding, Inventory, ObjectMeta, PolicyRule, Role, RoleBinding,
    RoleRef, Tenant, DBAAS_GROUP,
};

/// Prefix of every derived object name.
pub const NAME_PREFIX: &str = "dbaas";

pub fn inventory_role_name(inventory: &str) -> String {
    format!("{}-{}-inventory-viewer", NAME_PREFIX, inventory)
}

pub fn tenant_cluster_role_name(tenant: &str) -> String {
    format!("{}-{}-tenant-viewer", NAME_PREFIX, tenant)
}

/// Bindings are named after their role with a trailing `s`.
pub fn binding_name(role: &str) -> String {
    format!("{}s", role)
}

fn viewer_rule(resource: &str, name: &str) -> PolicyRule {
    let status = format!("{}/status", resource);
    PolicyRule::new(&[DBAAS_GROUP], &[resource, status.as_str()], &["get"])
        .with_resource_names(&[name])
}

/// Role and RoleBinding granting `access` read access to one inventory.
pub fn inventory_rbac_objects(inventory: &Inventory, access: &AccessSet) -> (Role, RoleBinding) {
    let namespace = inventory.metadata.namespace.clone().unwrap_or_default();
    let role_name = inventory_role_name(&inventory.metadata.name);

    let role = Role {
        metadata: ObjectMeta::namespaced(namespace.clone(), role_name.clone()),
        rules: vec![viewer_rule("dbaasinventories", &inventory.metadata.name)],
    };
    let binding = RoleBinding {
        metadata: ObjectMeta::namespaced(namespace.clone(), binding_name(&role_name)),
        role_ref: RoleRef::role(role_name),
        subjects: to_subjects(access, Some(&namespace)),
    };
    (role, binding)
}

/// ClusterRole and ClusterRoleBinding granting `access` read access to one tenant.
pub fn tenant_rbac_objects(
    tenant: &Tenant,
    access: &AccessSet,
) -> (ClusterRole, ClusterRoleBinding) {
    let role_name = tenant_cluster_role_name(&tenant.metadata.name);

    let role = ClusterRole {
        metadata: ObjectMeta::cluster(role_name.clone()),
        rules: vec![viewer_rule("dbaastenants", &tenant.metadata.name)],
    };
    let binding = ClusterRoleBinding {
        metadata: ObjectMeta::cluster(binding_name(&role_name)),
        role_ref: RoleRef::cluster_role(role_name),
        subjects: to_subjects(access, None),
    };
    (role, binding)
}
