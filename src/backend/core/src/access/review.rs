//! Access reviews: "who may perform this action".

use super::{AccessSet, TenantAccessInputs};
use crate::error::{AuthzError, Result};
use crate::resources::DBAAS_GROUP;
use async_trait::async_trait;
use metrics::counter;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Version of the DBaaS API group used in review actions.
const DBAAS_VERSION: &str = "v1alpha1";

// ═══════════════════════════════════════════════════════════════════════════════
// Review Action
// ═══════════════════════════════════════════════════════════════════════════════

/// The action being reviewed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewAction {
    pub verb: String,
    pub resource: String,
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub version: String,
    /// `None` reviews the action cluster wide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ReviewAction {
    pub fn new(verb: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            resource: resource.into(),
            group: String::new(),
            version: String::new(),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn dbaas(mut self) -> Self {
        self.group = DBAAS_GROUP.to_string();
        self.version = DBAAS_VERSION.to_string();
        self
    }

    pub fn create_inventories(namespace: &str) -> Self {
        Self::new("create", "dbaasinventories").dbaas().in_namespace(namespace)
    }

    pub fn create_secrets(namespace: &str) -> Self {
        let mut action = Self::new("create", "secrets").in_namespace(namespace);
        action.version = "v1".to_string();
        action
    }

    pub fn list_inventories(namespace: &str) -> Self {
        Self::new("list", "dbaasinventories").dbaas().in_namespace(namespace)
    }

    pub fn list_tenants() -> Self {
        Self::new("list", "dbaastenants").dbaas()
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {} in {}", self.verb, self.resource, ns),
            None => write!(f, "{} {} cluster-wide", self.verb, self.resource),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Reviewer Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Answers access review queries against the platform.
#[async_trait]
pub trait AccessReviewer: Send + Sync {
    async fn review(&self, action: &ReviewAction) -> Result<AccessSet>;

    fn name(&self) -> &'static str;
}

/// Run a review, degrading any failure to the empty set.
///
/// An empty set grants nothing extra, so a failed review never widens access.
pub async fn review_or_empty(reviewer: &dyn AccessReviewer, action: &ReviewAction) -> AccessSet {
    match reviewer.review(action).await {
        Ok(access) => {
            debug!(
                action = %action,
                users = access.users().len(),
                groups = access.groups().len(),
                "Access review completed"
            );
            access
        }
        Err(e) => {
            counter!("dbaas_authz_access_review_failures_total", "resource" => action.resource.clone())
                .increment(1);
            warn!(action = %action, reviewer = reviewer.name(), error = %e, "Access review failed, assuming no access");
            AccessSet::empty()
        }
    }
}

/// The per-namespace review queries the tenant derivation needs.
#[derive(Clone)]
pub struct ReviewQueries {
    reviewer: Arc<dyn AccessReviewer>,
}

impl ReviewQueries {
    pub fn new(reviewer: Arc<dyn AccessReviewer>) -> Self {
        Self { reviewer }
    }

    /// Who can create both inventories and secrets in `namespace`.
    pub async fn service_admin(&self, namespace: &str) -> AccessSet {
        let inventories =
            review_or_empty(self.reviewer.as_ref(), &ReviewAction::create_inventories(namespace))
                .await;
        if inventories.is_empty() {
            return inventories;
        }
        let secrets =
            review_or_empty(self.reviewer.as_ref(), &ReviewAction::create_secrets(namespace)).await;
        inventories.intersect(&secrets)
    }

    /// Who can list inventories in `namespace`.
    pub async fn developer(&self, namespace: &str) -> AccessSet {
        review_or_empty(self.reviewer.as_ref(), &ReviewAction::list_inventories(namespace)).await
    }

    /// Who can list every tenant.
    pub async fn tenant_list(&self) -> AccessSet {
        review_or_empty(self.reviewer.as_ref(), &ReviewAction::list_tenants()).await
    }

    /// All three reviews, issued concurrently.
    pub async fn tenant_inputs(&self, namespace: &str) -> TenantAccessInputs {
        let (service_admin, developer_review, tenant_list) = futures::join!(
            self.service_admin(namespace),
            self.developer(namespace),
            self.tenant_list(),
        );
        TenantAccessInputs {
            service_admin,
            developer_review,
            tenant_list,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Static Reviewer
// ═══════════════════════════════════════════════════════════════════════════════

/// A grant in the static reviewer's table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticGrant {
    pub verb: String,
    pub resource: String,
    /// `None` grants in every namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl StaticGrant {
    fn applies_to(&self, action: &ReviewAction) -> bool {
        self.verb == action.verb
            && self.resource == action.resource
            && match (&self.namespace, &action.namespace) {
                (None, _) => true,
                (Some(granted), Some(asked)) => granted == asked,
                (Some(_), None) => false,
            }
    }
}

/// Table-driven reviewer for tests and offline manifests.
#[derive(Default)]
pub struct StaticAccessReviewer {
    grants: RwLock<Vec<StaticGrant>>,
    failing: RwLock<HashSet<String>>,
    calls: AtomicU64,
}

impl StaticAccessReviewer {
    pub fn new(grants: Vec<StaticGrant>) -> Self {
        Self {
            grants: RwLock::new(grants),
            ..Default::default()
        }
    }

    /// Grant `verb` on `resource` to the given principals.
    pub fn grant(
        &self,
        verb: &str,
        resource: &str,
        namespace: Option<&str>,
        users: &[&str],
        groups: &[&str],
    ) {
        self.grants.write().push(StaticGrant {
            verb: verb.to_string(),
            resource: resource.to_string(),
            namespace: namespace.map(str::to_string),
            users: users.iter().map(|s| s.to_string()).collect(),
            groups: groups.iter().map(|s| s.to_string()).collect(),
        });
    }

    /// Make every review of `resource` fail.
    pub fn fail_on(&self, resource: &str) {
        self.failing.write().insert(resource.to_string());
    }

    /// Reviews answered so far, failures included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccessReviewer for StaticAccessReviewer {
    async fn review(&self, action: &ReviewAction) -> Result<AccessSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.read().contains(&action.resource) {
            return Err(AuthzError::access_review(format!("review of {} failed", action)));
        }

        let mut access = AccessSet::empty();
        for grant in self.grants.read().iter().filter(|g| g.applies_to(action)) {
            access.extend_from(&grant.users, &grant.groups);
        }
        Ok(access)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
