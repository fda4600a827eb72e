//! Per-config reconcile and re-election.

use super::quota::{ensure_quota, quota_name};
use super::{
    active_config, is_active, MSG_CONFIG_NOT_READY, MSG_CONFIG_READY, READY_CONDITION,
    REASON_NOT_READY, REASON_READY,
};
use crate::error::{AuthzError, Result};
use crate::resources::{
    set_condition, Condition, ConditionStatus, Config, ObjectKey, ResourceQuota,
};
use crate::store::{
    delete_typed, get_opt_typed, list_typed, update_typed, ListParams, ObjectStore,
};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of reconciling one config key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ConfigDecision {
    /// The config is the namespace's active config.
    Active { name: String },
    /// Another config is active.
    Denied { name: String, active: String },
    /// The config is gone; `reelected` names the config activated in its place.
    Deleted { reelected: Option<String> },
}

impl ConfigDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active { .. } => "active",
            Self::Denied { .. } => "denied",
            Self::Deleted { .. } => "deleted",
        }
    }
}

/// Reconciles Config objects so at most one per namespace is active.
#[derive(Clone)]
pub struct ConfigSelector {
    store: Arc<dyn ObjectStore>,
}

impl ConfigSelector {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Reconcile the config at `key`.
    ///
    /// A missing config triggers re-election among the namespace's
    /// remaining configs.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ConfigDecision> {
        let namespace = key
            .namespace
            .clone()
            .ok_or_else(|| AuthzError::internal(format!("config key {} has no namespace", key)))?;

        let decision = match get_opt_typed::<Config>(self.store.as_ref(), key).await? {
            Some(config) => {
                let configs = self.list(&namespace).await?;
                self.transition(config, &configs).await?
            }
            None => {
                debug!(config = %key, "Config deleted, checking for re-election");
                self.reelect(&namespace).await?
            }
        };

        counter!("dbaas_authz_config_decisions_total", "decision" => decision.as_str())
            .increment(1);
        Ok(decision)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<Config>> {
        list_typed(self.store.as_ref(), &ListParams::in_namespace(namespace)).await
    }

    /// Elect the lexically first config when none is active.
    async fn reelect(&self, namespace: &str) -> Result<ConfigDecision> {
        let configs = self.list(namespace).await?;
        if let Some(active) = active_config(&configs) {
            debug!(namespace, active = %active.metadata.name, "Namespace still has an active config");
            return Ok(ConfigDecision::Deleted { reelected: None });
        }

        let Some(candidate) = configs
            .iter()
            .min_by(|a, b| a.metadata.name.cmp(&b.metadata.name))
            .cloned()
        else {
            debug!(namespace, "No configs remain");
            return Ok(ConfigDecision::Deleted { reelected: None });
        };

        info!(namespace, config = %candidate.metadata.name, "Re-electing active config");
        match self.transition(candidate, &configs).await? {
            ConfigDecision::Active { name } => Ok(ConfigDecision::Deleted {
                reelected: Some(name),
            }),
            _ => Ok(ConfigDecision::Deleted { reelected: None }),
        }
    }

    /// Mark `config` active or denied given the namespace's `configs`.
    async fn transition(&self, config: Config, configs: &[Config]) -> Result<ConfigDecision> {
        let name = config.metadata.name.clone();
        let blocking = configs
            .iter()
            .filter(|c| c.metadata.name != name && is_active(c))
            .map(|c| c.metadata.name.clone())
            .min()
            // Two transiently active configs: the smaller name keeps it.
            .filter(|other| !(is_active(&config) && name < *other));

        match blocking {
            Some(active) => {
                let condition = Condition::new(
                    READY_CONDITION,
                    ConditionStatus::False,
                    REASON_NOT_READY,
                    format!("{} - {}", MSG_CONFIG_NOT_READY, active),
                );
                let config = self.write_status(config, condition).await?;
                self.release_quota(&config).await?;
                info!(config = %name, active = %active, "Config denied, namespace already has an active config");
                Ok(ConfigDecision::Denied { name, active })
            }
            None => {
                let condition = Condition::new(
                    READY_CONDITION,
                    ConditionStatus::True,
                    REASON_READY,
                    MSG_CONFIG_READY,
                );
                let config = self.write_status(config, condition).await?;
                ensure_quota(self.store.as_ref(), &config).await?;
                Ok(ConfigDecision::Active { name })
            }
        }
    }

    async fn write_status(&self, mut config: Config, condition: Condition) -> Result<Config> {
        if !set_condition(&mut config.status.conditions, condition) {
            return Ok(config);
        }
        let updated = update_typed(self.store.as_ref(), &config).await?;
        debug!(config = %updated.metadata.key(), active = is_active(&updated), "Config status updated");
        Ok(updated)
    }

    /// Drop a quota left over from a period when `config` was active.
    async fn release_quota(&self, config: &Config) -> Result<()> {
        let key = ObjectKey {
            namespace: config.metadata.namespace.clone(),
            name: quota_name(&config.metadata.name),
        };
        let Some(quota) = get_opt_typed::<ResourceQuota>(self.store.as_ref(), &key).await? else {
            return Ok(());
        };
        if quota.metadata.is_owned_by(&config.metadata.uid) {
            match delete_typed::<ResourceQuota>(self.store.as_ref(), &key).await {
                Ok(()) => info!(quota = %key, "Released quota of demoted config"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
