//! RBAC objects derived by the synchronizer.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{impl_resource, Kind, ObjectMeta, RBAC_GROUP};

/// One rule of a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,
    pub verbs: Vec<String>,
}

impl PolicyRule {
    pub fn new<S: AsRef<str>>(api_groups: &[S], resources: &[S], verbs: &[S]) -> Self {
        Self {
            api_groups: api_groups.iter().map(|s| s.as_ref().to_string()).collect(),
            resources: resources.iter().map(|s| s.as_ref().to_string()).collect(),
            resource_names: Vec::new(),
            verbs: verbs.iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    pub fn with_resource_names<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.resource_names = names.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }
}

/// Reference from a binding to the role it grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub api_group: String,
    pub kind: String,
    pub name: String,
}

impl RoleRef {
    pub fn role(name: impl Into<String>) -> Self {
        Self {
            api_group: RBAC_GROUP.to_string(),
            kind: Kind::Role.as_str().to_string(),
            name: name.into(),
        }
    }

    pub fn cluster_role(name: impl Into<String>) -> Self {
        Self {
            api_group: RBAC_GROUP.to_string(),
            kind: Kind::ClusterRole.as_str().to_string(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    User,
    Group,
    ServiceAccount,
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "User",
            Self::Group => "Group",
            Self::ServiceAccount => "ServiceAccount",
        };
        f.write_str(s)
    }
}

/// A principal a binding grants its role to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub kind: SubjectKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Capabilities
// ═══════════════════════════════════════════════════════════════════════════════

/// Kinds that carry policy rules.
pub trait HasRules {
    fn rules(&self) -> &[PolicyRule];

    fn set_rules(&mut self, rules: Vec<PolicyRule>);
}

/// Kinds that bind subjects to a role.
pub trait HasBinding {
    fn role_ref(&self) -> &RoleRef;

    fn subjects(&self) -> &[Subject];

    fn set_binding(&mut self, role_ref: RoleRef, subjects: Vec<Subject>);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Objects
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterRole {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    pub metadata: ObjectMeta,
    pub role_ref: RoleRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRoleBinding {
    pub metadata: ObjectMeta,
    pub role_ref: RoleRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<Subject>,
}

impl_resource!(Role, Kind::Role);
impl_resource!(ClusterRole, Kind::ClusterRole);
impl_resource!(RoleBinding, Kind::RoleBinding);
impl_resource!(ClusterRoleBinding, Kind::ClusterRoleBinding);

macro_rules! impl_has_rules {
    ($ty:ty) => {
        impl HasRules for $ty {
            fn rules(&self) -> &[PolicyRule] {
                &self.rules
            }

            fn set_rules(&mut self, rules: Vec<PolicyRule>) {
                self.rules = rules;
            }
        }
    };
}

macro_rules! impl_has_binding {
    ($ty:ty) => {
        impl HasBinding for $ty {
            fn role_ref(&self) -> &RoleRef {
                &self.role_ref
            }

            fn subjects(&self) -> &[Subject] {
                &self.subjects
            }

            fn set_binding(&mut self, role_ref: RoleRef, subjects: Vec<Subject>) {
                self.role_ref = role_ref;
                self.subjects = subjects;
            }
        }
    };
}

impl_has_rules!(Role);
impl_has_rules!(ClusterRole);
impl_has_binding!(RoleBinding);
impl_has_binding!(ClusterRoleBinding);
