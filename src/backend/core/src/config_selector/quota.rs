//! Quota owned by the active config.

use crate::error::Result;
use crate::rbac::{EnsureOutcome, NAME_PREFIX};
use crate::resources::{Config, ObjectMeta, OwnerReference, ResourceQuota, ResourceQuotaSpec};
use crate::store::{create_typed, get_opt_typed, update_typed, ObjectStore};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Quota resource counting Config objects.
pub const QUOTA_RESOURCE: &str = "count/dbaasconfigs.dbaas.redhat.com";

pub fn quota_name(config: &str) -> String {
    format!("{}-{}", NAME_PREFIX, config)
}

/// Quota limiting `config`'s namespace to one Config, owned by `config`.
pub fn desired_quota(config: &Config) -> ResourceQuota {
    let mut metadata = ObjectMeta::namespaced(
        config.metadata.namespace.clone().unwrap_or_default(),
        quota_name(&config.metadata.name),
    );
    metadata.owner_references = vec![OwnerReference::controller_of(config)];

    ResourceQuota {
        metadata,
        spec: ResourceQuotaSpec {
            hard: BTreeMap::from([(QUOTA_RESOURCE.to_string(), "1".to_string())]),
        },
    }
}

/// Create the quota, or correct its limits when they drifted.
pub async fn ensure_quota(store: &dyn ObjectStore, config: &Config) -> Result<EnsureOutcome> {
    let desired = desired_quota(config);
    let key = desired.metadata.key();

    let Some(mut observed) = get_opt_typed::<ResourceQuota>(store, &key).await? else {
        create_typed(store, &desired).await?;
        info!(quota = %key, config = %config.metadata.name, "Quota created");
        return Ok(EnsureOutcome::Created);
    };

    if observed.spec.hard == desired.spec.hard {
        debug!(quota = %key, "Quota up to date");
        return Ok(EnsureOutcome::Unchanged);
    }
    if !observed.metadata.is_owned_by(&config.metadata.uid) {
        warn!(quota = %key, config = %config.metadata.name, "Quota is not owned by this config");
        return Ok(EnsureOutcome::NotOwned);
    }

    observed.spec.hard = desired.spec.hard;
    update_typed(store, &observed).await?;
    info!(quota = %key, "Quota limits updated");
    Ok(EnsureOutcome::Updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn test_desired_quota_shape() {
        let mut config = Config::new("ns", "c1");
        config.metadata.uid = "uid-c1".into();
        let quota = desired_quota(&config);

        assert_eq!(quota.metadata.name, "dbaas-c1");
        assert_eq!(quota.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(quota.spec.hard.get(QUOTA_RESOURCE).map(String::as_str), Some("1"));
        assert!(quota.metadata.is_owned_by("uid-c1"));
    }

    #[tokio::test]
    async fn test_drifted_limit_is_restored() {
        let store = InMemoryStore::new();
        let config = create_typed(&store, &Config::new("ns", "c1")).await.unwrap();

        assert_eq!(ensure_quota(&store, &config).await.unwrap(), EnsureOutcome::Created);
        assert_eq!(ensure_quota(&store, &config).await.unwrap(), EnsureOutcome::Unchanged);

        let mut drifted: ResourceQuota =
            crate::store::get_typed(&store, &desired_quota(&config).metadata.key()).await.unwrap();
        drifted.spec.hard.insert(QUOTA_RESOURCE.into(), "5".into());
        update_typed(&store, &drifted).await.unwrap();

        assert_eq!(ensure_quota(&store, &config).await.unwrap(), EnsureOutcome::Updated);
    }
}
