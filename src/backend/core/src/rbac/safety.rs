//! Safety gate for derived roles.
//!
//! The derived path only ever grants read access to single objects. A role
//! carrying any verb below must be hand-authored and is never synchronized.

use crate::resources::PolicyRule;

/// Verbs a derived role may not carry. `*` implies all of them.
pub const FORBIDDEN_VERBS: [&str; 6] = ["create", "patch", "update", "delete", "list", "*"];

/// Forbidden verbs present in `rules`, in [`FORBIDDEN_VERBS`] order.
pub fn forbidden_verbs(rules: &[PolicyRule]) -> Vec<String> {
    FORBIDDEN_VERBS
        .iter()
        .filter(|forbidden| {
            rules
                .iter()
                .any(|rule| rule.verbs.iter().any(|verb| verb == *forbidden))
        })
        .map(|verb| verb.to_string())
        .collect()
}
