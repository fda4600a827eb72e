//! Principal sets and the queries that produce them.
//!
//! - **AccessSet**: deduplicated, first-seen ordered users and groups
//! - **resolver**: derives the access set of every inventory and tenant
//! - **subjects**: renders an access set as binding subjects
//! - **review**: asks the platform who may perform an action
//! - **http**: access review client for the platform API

pub mod http;
pub mod resolver;
pub mod review;
pub mod subjects;

pub use http::HttpAccessReviewer;
pub use resolver::{
    consolidate_developer_access, resolve_inventory_access, resolve_tenant_access,
    TenantAccessInputs,
};
pub use review::{
    review_or_empty, AccessReviewer, ReviewAction, ReviewQueries, StaticAccessReviewer,
    StaticGrant,
};
pub use subjects::{to_subjects, SERVICE_ACCOUNT_PREFIX};

use crate::resources::UsersGroups;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An ordered, duplicate-free pair of user and group lists.
///
/// Equality is set equality. Iteration order is first-seen, so derived
/// subjects come out in a stable order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessSet {
    users: Vec<String>,
    groups: Vec<String>,
}

fn unique<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let item = item.into();
        if seen.insert(item.clone()) {
            out.push(item);
        }
    }
    out
}

impl AccessSet {
    pub fn new<U, G, S, T>(users: U, groups: G) -> Self
    where
        U: IntoIterator<Item = S>,
        G: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            users: unique(users),
            groups: unique(groups),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn users(&self) -> &[String] {
        &self.users
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty() && self.groups.is_empty()
    }

    /// Append `other`, keeping first occurrences.
    pub fn extend(&mut self, other: &AccessSet) {
        self.extend_from(&other.users, &other.groups);
    }

    pub fn extend_from(&mut self, users: &[String], groups: &[String]) {
        let merged_users = unique(self.users.iter().chain(users).cloned());
        let merged_groups = unique(self.groups.iter().chain(groups).cloned());
        self.users = merged_users;
        self.groups = merged_groups;
    }

    pub fn union(&self, other: &AccessSet) -> AccessSet {
        let mut out = self.clone();
        out.extend(other);
        out
    }

    /// Entries of `self` not present in `other`, in `self`'s order.
    pub fn subtract(&self, other: &AccessSet) -> AccessSet {
        let users: HashSet<&String> = other.users.iter().collect();
        let groups: HashSet<&String> = other.groups.iter().collect();
        AccessSet {
            users: self.users.iter().filter(|u| !users.contains(u)).cloned().collect(),
            groups: self.groups.iter().filter(|g| !groups.contains(g)).cloned().collect(),
        }
    }

    /// Entries present in both, in `self`'s order.
    pub fn intersect(&self, other: &AccessSet) -> AccessSet {
        let users: HashSet<&String> = other.users.iter().collect();
        let groups: HashSet<&String> = other.groups.iter().collect();
        AccessSet {
            users: self.users.iter().filter(|u| users.contains(u)).cloned().collect(),
            groups: self.groups.iter().filter(|g| groups.contains(g)).cloned().collect(),
        }
    }
}

impl From<&UsersGroups> for AccessSet {
    fn from(authz: &UsersGroups) -> Self {
        AccessSet::new(authz.users().iter().cloned(), authz.groups().iter().cloned())
    }
}

impl PartialEq for AccessSet {
    fn eq(&self, other: &Self) -> bool {
        fn same(a: &[String], b: &[String]) -> bool {
            a.len() == b.len() && a.iter().collect::<HashSet<_>>() == b.iter().collect::<HashSet<_>>()
        }
        same(&self.users, &other.users) && same(&self.groups, &other.groups)
    }
}

impl Eq for AccessSet {}
