//! Authorization reconciliation.
//!
//! One pass per inventory namespace: list the tenants claiming it and its
//! inventories, derive access sets, and materialize the viewer roles and
//! bindings. Tenant access also depends on platform access reviews, which
//! are gathered once per pass.

pub mod authz;
pub mod snapshot;

pub use authz::{AuthzOrchestrator, PassSummary};
pub use snapshot::{TenantNamespaceIndex, TenantNamespaceSnapshot};
