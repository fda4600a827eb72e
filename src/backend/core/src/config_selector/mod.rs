//! Exclusive config selection.
//!
//! At most one Config per namespace carries `ReadyForProvisioning=True`.
//! The active config owns a quota object limiting the namespace to a single
//! Config, and when it is deleted the lexically first remaining config is
//! elected in its place.
//!
//! - **selector**: the per-config reconcile and re-election
//! - **quota**: the quota owned by the active config
//! - **admission**: create-time validation and the install namespace default

pub mod admission;
pub mod quota;
pub mod selector;

pub use admission::{default_config, ensure_default_config, validate_config_admission};
pub use quota::{desired_quota, ensure_quota, quota_name, QUOTA_RESOURCE};
pub use selector::{ConfigDecision, ConfigSelector};

use crate::resources::{is_condition_true, Config, Inventory};

/// Condition type marking the active config.
pub const READY_CONDITION: &str = "ReadyForProvisioning";
/// Reason on the active config.
pub const REASON_READY: &str = "Ready";
/// Reason on a config blocked by another active one.
pub const REASON_NOT_READY: &str = "ConfigNotReady";
pub const MSG_CONFIG_READY: &str = "DBaaS config is ready for provisioning";
pub const MSG_CONFIG_NOT_READY: &str = "Another active DBaaSConfig exists in this namespace";

/// Name of the config created in the install namespace when none exists.
pub const DEFAULT_CONFIG_NAME: &str = "cluster";

pub fn is_active(config: &Config) -> bool {
    is_condition_true(&config.status.conditions, READY_CONDITION)
}

/// The active config among `configs`; the lexically smallest name wins if
/// several are transiently Ready.
pub fn active_config(configs: &[Config]) -> Option<&Config> {
    configs
        .iter()
        .filter(|c| is_active(c))
        .min_by(|a, b| a.metadata.name.cmp(&b.metadata.name))
}

/// Whether `inventory` may provision new resources.
///
/// No active config denies. Otherwise the inventory's own setting, when
/// present, wins over the config default.
pub fn can_provision(inventory: &Inventory, active: Option<&Config>) -> bool {
    let Some(config) = active else {
        return false;
    };
    match inventory.spec.disable_provisions {
        Some(disabled) => !disabled,
        None => !config.spec.disable_provisions.unwrap_or(false),
    }
}
