//! Create-time validation and the default config.

use super::{active_config, DEFAULT_CONFIG_NAME};
use crate::error::{AuthzError, Result};
use crate::resources::{Config, ConfigSpec, ObjectMeta};
use crate::store::{create_typed, list_typed, ListParams, ObjectStore};
use tracing::{debug, info};

/// Validate creation of `candidate` against the namespace's existing configs.
///
/// A namespace may hold a single config, so any existing one denies the
/// request. The message names the active config when there is one.
pub fn validate_config_admission(candidate: &Config, existing: &[Config]) -> Result<()> {
    let namespace = candidate.metadata.namespace.as_deref().unwrap_or_default();
    let others: Vec<Config> = existing
        .iter()
        .filter(|c| c.metadata.namespace.as_deref() == Some(namespace))
        .filter(|c| c.metadata.name != candidate.metadata.name)
        .cloned()
        .collect();

    if let Some(active) = active_config(&others) {
        return Err(AuthzError::admission_denied(format!(
            "the namespace {} is already managed by config {}, it cannot be managed by another config",
            namespace, active.metadata.name
        ))
        .with_context("field", "metadata.namespace"));
    }
    if !others.is_empty() {
        return Err(AuthzError::admission_denied(format!(
            "the namespace {} is already managed by another config",
            namespace
        ))
        .with_context("field", "metadata.namespace"));
    }
    Ok(())
}

/// The config created in the install namespace when it has none.
pub fn default_config(install_namespace: &str) -> Config {
    Config {
        metadata: ObjectMeta::namespaced(install_namespace, DEFAULT_CONFIG_NAME),
        spec: ConfigSpec {
            disable_provisions: Some(false),
            connection_namespaces: Some(vec!["*".to_string()]),
            disable_in_ui: None,
        },
        ..Default::default()
    }
}

/// Create the default config if the install namespace has no configs.
///
/// Returns the created config, or `None` when configs already exist.
pub async fn ensure_default_config(
    store: &dyn ObjectStore,
    install_namespace: &str,
) -> Result<Option<Config>> {
    let existing: Vec<Config> =
        list_typed(store, &ListParams::in_namespace(install_namespace)).await?;
    if !existing.is_empty() {
        debug!(namespace = install_namespace, count = existing.len(), "Configs exist, no default needed");
        return Ok(None);
    }

    match create_typed(store, &default_config(install_namespace)).await {
        Ok(created) => {
            info!(namespace = install_namespace, name = DEFAULT_CONFIG_NAME, "Created default config");
            Ok(Some(created))
        }
        Err(e) if e.code() == crate::error::ErrorCode::ObjectAlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_selector::{MSG_CONFIG_READY, READY_CONDITION, REASON_READY};
    use crate::error::ErrorCode;
    use crate::resources::{set_condition, Condition, ConditionStatus};
    use crate::store::InMemoryStore;

    #[test]
    fn test_first_config_is_admitted() {
        assert!(validate_config_admission(&Config::new("ns", "c1"), &[]).is_ok());
        let elsewhere = vec![Config::new("other", "c0")];
        assert!(validate_config_admission(&Config::new("ns", "c1"), &elsewhere).is_ok());
    }

    #[test]
    fn test_denial_names_active_config() {
        let mut active = Config::new("ns", "c1");
        set_condition(
            &mut active.status.conditions,
            Condition::new(READY_CONDITION, ConditionStatus::True, REASON_READY, MSG_CONFIG_READY),
        );

        let err = validate_config_admission(&Config::new("ns", "c2"), &[active]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AdmissionDenied);
        assert_eq!(
            err.message(),
            "the namespace ns is already managed by config c1, it cannot be managed by another config"
        );
    }

    #[test]
    fn test_denial_without_active_config() {
        let err = validate_config_admission(&Config::new("ns", "c2"), &[Config::new("ns", "c1")])
            .unwrap_err();
        assert_eq!(err.message(), "the namespace ns is already managed by another config");
    }

    #[tokio::test]
    async fn test_default_config_created_once() {
        let store = InMemoryStore::new();
        let created = ensure_default_config(&store, "openshift-dbaas-operator")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.metadata.name, DEFAULT_CONFIG_NAME);
        assert_eq!(created.spec.connection_namespaces, Some(vec!["*".to_string()]));

        assert!(ensure_default_config(&store, "openshift-dbaas-operator")
            .await
            .unwrap()
            .is_none());
    }
}
