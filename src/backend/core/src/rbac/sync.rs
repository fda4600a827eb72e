//! Idempotent materialization of derived RBAC objects.

use super::safety::forbidden_verbs;
use crate::error::Result;
use crate::resources::{
    ClusterRole, ClusterRoleBinding, HasBinding, HasRules, OwnerReference, PolicyRule, Resource,
    Role, RoleBinding,
};
use crate::store::{create_typed, get_opt_typed, update_typed, ObjectStore};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Sync Targets
// ═══════════════════════════════════════════════════════════════════════════════

/// A derived object kind the synchronizer knows how to compare.
pub trait SyncTarget: Resource {
    /// Rules checked by the safety gate. Bindings carry none.
    fn gated_rules(&self) -> Option<&[PolicyRule]>;

    /// Whether the semantically relevant fields of `observed` differ.
    fn differs_from(&self, observed: &Self) -> bool;

    /// Copy the semantically relevant fields onto `observed`.
    fn apply_to(&self, observed: &mut Self);
}

macro_rules! role_target {
    ($ty:ty) => {
        impl SyncTarget for $ty {
            fn gated_rules(&self) -> Option<&[PolicyRule]> {
                Some(self.rules())
            }

            fn differs_from(&self, observed: &Self) -> bool {
                self.rules() != observed.rules()
            }

            fn apply_to(&self, observed: &mut Self) {
                observed.set_rules(self.rules().to_vec());
            }
        }
    };
}

macro_rules! binding_target {
    ($ty:ty) => {
        impl SyncTarget for $ty {
            fn gated_rules(&self) -> Option<&[PolicyRule]> {
                None
            }

            fn differs_from(&self, observed: &Self) -> bool {
                self.role_ref() != observed.role_ref() || self.subjects() != observed.subjects()
            }

            fn apply_to(&self, observed: &mut Self) {
                observed.set_binding(self.role_ref().clone(), self.subjects().to_vec());
            }
        }
    };
}

role_target!(Role);
role_target!(ClusterRole);
binding_target!(RoleBinding);
binding_target!(ClusterRoleBinding);

// ═══════════════════════════════════════════════════════════════════════════════
// Outcome
// ═══════════════════════════════════════════════════════════════════════════════

/// What `ensure` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnsureOutcome {
    Created,
    Updated,
    Unchanged,
    /// Refused by the safety gate; nothing was read or written.
    Rejected { verbs: Vec<String> },
    /// Exists with different content but is owned by someone else.
    NotOwned,
}

impl EnsureOutcome {
    /// Whether the object was found in the store.
    pub fn existed(&self) -> bool {
        matches!(self, Self::Updated | Self::Unchanged | Self::NotOwned)
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Rejected { .. } => "rejected",
            Self::NotOwned => "not_owned",
        }
    }
}

impl fmt::Display for EnsureOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Synchronizer
// ═══════════════════════════════════════════════════════════════════════════════

/// Creates or updates derived RBAC objects owned by a Tenant or Inventory.
#[derive(Clone)]
pub struct RbacSynchronizer {
    store: Arc<dyn ObjectStore>,
}

impl RbacSynchronizer {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Make the stored object match `desired`.
    ///
    /// Not-found on fetch is the first-time path. Conflicts and other store
    /// errors are returned unchanged so the scheduler can requeue.
    pub async fn ensure<T, O>(&self, desired: &T, owner: &O) -> Result<EnsureOutcome>
    where
        T: SyncTarget,
        O: Resource,
    {
        let kind = T::KIND;
        let key = desired.key();

        if let Some(rules) = desired.gated_rules() {
            let verbs = forbidden_verbs(rules);
            if !verbs.is_empty() {
                warn!(
                    kind = %kind,
                    key = %key,
                    verbs = ?verbs,
                    "Role carries edit or list verbs, will not synchronize"
                );
                return Ok(self.record(kind.as_str(), EnsureOutcome::Rejected { verbs }));
            }
        }

        let observed = match get_opt_typed::<T>(self.store.as_ref(), &key).await? {
            Some(observed) => observed,
            None => {
                debug!(kind = %kind, key = %key, "Resource not found, creating");
                let mut object = desired.clone();
                object.meta_mut().owner_references = vec![OwnerReference::controller_of(owner)];
                create_typed(self.store.as_ref(), &object).await?;
                info!(kind = %kind, key = %key, owner = owner.name(), "Resource created");
                return Ok(self.record(kind.as_str(), EnsureOutcome::Created));
            }
        };

        if !desired.differs_from(&observed) {
            return Ok(self.record(kind.as_str(), EnsureOutcome::Unchanged));
        }

        if !observed.meta().is_owned_by(&owner.meta().uid) {
            warn!(
                kind = %kind,
                key = %key,
                owner = owner.name(),
                "Resource differs but is not owned by this object, leaving it alone"
            );
            return Ok(self.record(kind.as_str(), EnsureOutcome::NotOwned));
        }

        let mut updated = observed;
        desired.apply_to(&mut updated);
        update_typed(self.store.as_ref(), &updated).await?;
        info!(kind = %kind, key = %key, "Resource updated");
        Ok(self.record(kind.as_str(), EnsureOutcome::Updated))
    }

    fn record(&self, kind: &'static str, outcome: EnsureOutcome) -> EnsureOutcome {
        counter!(
            "dbaas_authz_rbac_sync_total",
            "kind" => kind,
            "outcome" => outcome.as_str()
        )
        .increment(1);
        outcome
    }
}
