#![allow(clippy::result_large_err)]
//! # DBaaS Authz Core
//!
//! Multi-tenant authorization and config-exclusivity reconciliation for the
//! DBaaS operator.
//!
//! ## Architecture
//!
//! - **Access**: Resolves who may see tenants and inventories from authorization reviews
//! - **RBAC**: Builds Role/Binding descriptors and writes them behind a verb safety gate
//! - **Config Selector**: Keeps at most one active DBaaSConfig per namespace
//! - **Orchestrator**: Per-namespace authorization passes over a versioned tenant snapshot
//! - **Controller**: Event-driven scheduling with per-key serialization and backoff
//! - **Store**: Object store boundary with an in-memory implementation
//! - **Telemetry**: Structured logging

pub mod access;
pub mod config;
pub mod config_selector;
pub mod controller;
pub mod error;
pub mod orchestrator;
pub mod rbac;
pub mod resources;
pub mod store;
pub mod telemetry;

pub use error::{AuthzError, ErrorCode, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::access::{
        AccessReviewer, AccessSet, HttpAccessReviewer, ReviewAction, StaticAccessReviewer,
        StaticGrant,
    };
    pub use crate::config::Settings;
    pub use crate::config_selector::{
        can_provision, validate_config_admission, ConfigDecision, ConfigSelector,
    };
    pub use crate::controller::{Controller, ControllerConfig, ReconcileAction, ReconcileKey};
    pub use crate::error::{AuthzError, ErrorCode, ErrorDetails, ErrorSeverity, Result};
    pub use crate::orchestrator::{AuthzOrchestrator, PassSummary, TenantNamespaceIndex};
    pub use crate::rbac::{EnsureOutcome, RbacSynchronizer};
    pub use crate::resources::{
        ClusterRole, ClusterRoleBinding, Config, Inventory, Kind, ObjectKey, ObjectMeta,
        ResourceQuota, Resource, Role, RoleBinding, Tenant,
    };
    pub use crate::store::{InMemoryStore, ObjectStore};
}
