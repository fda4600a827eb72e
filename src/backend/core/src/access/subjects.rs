//! Rendering access sets as binding subjects.

use super::AccessSet;
use crate::resources::{Subject, SubjectKind, RBAC_GROUP};
use tracing::warn;

/// Identity prefix of platform service accounts.
pub const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// Parse `system:serviceaccount:<namespace>:<name>`.
///
/// Returns `None` unless both parts are present and non-empty.
fn parse_service_account(user: &str) -> Option<Subject> {
    let (namespace, name) = user.strip_prefix(SERVICE_ACCOUNT_PREFIX)?.split_once(':')?;
    if namespace.is_empty() || name.is_empty() || name.contains(':') {
        return None;
    }
    Some(Subject {
        kind: SubjectKind::ServiceAccount,
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
        api_group: None,
    })
}

fn principal(kind: SubjectKind, name: &str, namespace: Option<&str>) -> Subject {
    Subject {
        kind,
        name: name.to_string(),
        namespace: namespace.map(str::to_string),
        api_group: Some(RBAC_GROUP.to_string()),
    }
}

/// Subjects for a binding in `namespace` (`None` for cluster bindings).
///
/// Users come first, then groups, each in the set's order. Service account
/// identities become ServiceAccount subjects in their own namespace;
/// malformed ones are skipped.
pub fn to_subjects(access: &AccessSet, namespace: Option<&str>) -> Vec<Subject> {
    let mut subjects = Vec::with_capacity(access.users().len() + access.groups().len());

    for user in access.users() {
        if user.starts_with(SERVICE_ACCOUNT_PREFIX) {
            match parse_service_account(user) {
                Some(subject) => subjects.push(subject),
                None => warn!(identity = %user, "Skipping malformed service account identity"),
            }
        } else {
            subjects.push(principal(SubjectKind::User, user, namespace));
        }
    }
    for group in access.groups() {
        subjects.push(principal(SubjectKind::Group, group, namespace));
    }

    subjects
}
