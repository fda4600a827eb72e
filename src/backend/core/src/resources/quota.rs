//! ResourceQuota, used to make config exclusivity visible at the API layer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{impl_resource, Kind, ObjectMeta};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuotaSpec {
    #[serde(default)]
    pub hard: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuota {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ResourceQuotaSpec,
}

impl_resource!(ResourceQuota, Kind::ResourceQuota);
