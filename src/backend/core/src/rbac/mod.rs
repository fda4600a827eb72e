//! Derived RBAC objects.
//!
//! - **descriptors**: desired Role/ClusterRole and bindings for inventories and tenants
//! - **safety**: refuses roles carrying mutating or list verbs
//! - **sync**: idempotent create-or-update against the object store

pub mod descriptors;
pub mod safety;
pub mod sync;

pub use descriptors::{
    binding_name, inventory_rbac_objects, inventory_role_name, tenant_cluster_role_name,
    tenant_rbac_objects, NAME_PREFIX,
};
pub use safety::{forbidden_verbs, FORBIDDEN_VERBS};
pub use sync::{EnsureOutcome, RbacSynchronizer, SyncTarget};
