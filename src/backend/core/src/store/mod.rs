//! Object store boundary.
//!
//! The core never talks to the cluster directly. Everything it reads and
//! writes goes through [`ObjectStore`], which deals in raw JSON documents;
//! the typed helpers in this module are the only place where documents are
//! marshalled into and out of [`Resource`] types.
//!
//! - **ObjectStore**: get/list/create/update/delete plus a watch stream
//! - **InMemoryStore**: the reference implementation used by tests and the CLI

pub mod memory;

pub use memory::InMemoryStore;

use crate::error::{AuthzError, ErrorCode, ErrorDetails, Result};
use crate::resources::{Kind, ObjectKey, ObjectMeta, Resource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::broadcast;

// ═══════════════════════════════════════════════════════════════════════════════
// Store Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Failures reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: Kind, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    #[error("{kind} {key} has resource version {actual}, update carried {expected}")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        expected: String,
        actual: String,
    },

    #[error("invalid {kind} object: {reason}")]
    Invalid { kind: Kind, reason: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for AuthzError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, key } => {
                AuthzError::not_found(kind.as_str(), key.to_string())
            }
            StoreError::AlreadyExists { kind, key } => {
                AuthzError::already_exists(kind.as_str(), key.to_string())
            }
            StoreError::Conflict { kind, key, .. } => {
                let message = err_message(kind, &key);
                AuthzError::conflict(kind.as_str(), key.to_string()).with_internal_message(message)
            }
            StoreError::Invalid { kind, reason } => {
                AuthzError::new(ErrorCode::StoreError, format!("invalid {} object", kind))
                    .with_internal_message(reason)
                    .with_details(ErrorDetails::new().with_context("kind", kind.as_str()))
            }
            StoreError::Serialization(source) => AuthzError::serialization(source),
            StoreError::Unavailable(reason) => {
                AuthzError::new(ErrorCode::StoreUnavailable, "Object store unavailable")
                    .with_internal_message(reason)
            }
        }
    }
}

fn err_message(kind: Kind, key: &ObjectKey) -> String {
    format!("optimistic concurrency check failed for {} {}", kind, key)
}

// ═══════════════════════════════════════════════════════════════════════════════
// List Parameters
// ═══════════════════════════════════════════════════════════════════════════════

/// Filter applied to `list`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    /// Restrict to one namespace; `None` lists across all namespaces.
    pub namespace: Option<String>,

    /// Every label here must be present with the same value.
    pub label_selector: BTreeMap<String, String>,
}

impl ListParams {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.label_selector.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, meta: &ObjectMeta) -> bool {
        if let Some(ns) = &self.namespace {
            if meta.namespace.as_deref() != Some(ns.as_str()) {
                return false;
            }
        }
        self.label_selector
            .iter()
            .all(|(k, v)| meta.labels.get(k) == Some(v))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Watch Events
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

/// A change notification.
///
/// `meta` is always populated so consumers that only need identity and
/// ownership never have to decode `object`.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub kind: Kind,
    pub meta: ObjectMeta,
    pub object: Value,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Declarative object store with optimistic concurrency.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one object.
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<Value>;

    /// List objects of a kind matching `params`, ordered by key.
    async fn list(&self, kind: Kind, params: &ListParams) -> StoreResult<Vec<Value>>;

    /// Create an object. Fails with `AlreadyExists` when the key is taken.
    async fn create(&self, kind: Kind, object: Value) -> StoreResult<Value>;

    /// Replace an object. A carried `resourceVersion` must match the stored one.
    async fn update(&self, kind: Kind, object: Value) -> StoreResult<Value>;

    /// Delete an object and everything it owns.
    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()>;

    /// Subscribe to change notifications.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;

    /// Implementation name, for logs.
    fn name(&self) -> &'static str;
}

// ─────────────────────────────────────────────────────────────────────────────
// Typed helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Extract the metadata of a raw document.
pub fn meta_of(kind: Kind, object: &Value) -> StoreResult<ObjectMeta> {
    let meta = object
        .get("metadata")
        .cloned()
        .ok_or_else(|| StoreError::Invalid {
            kind,
            reason: "missing metadata".into(),
        })?;
    Ok(serde_json::from_value(meta)?)
}

fn decode<R: Resource>(object: Value) -> Result<R> {
    serde_json::from_value(object).map_err(|e| {
        AuthzError::serialization(e).with_context("kind", R::KIND.as_str())
    })
}

fn encode<R: Resource>(object: &R) -> Result<Value> {
    serde_json::to_value(object).map_err(|e| {
        AuthzError::serialization(e).with_context("kind", R::KIND.as_str())
    })
}

pub async fn get_typed<R: Resource>(store: &dyn ObjectStore, key: &ObjectKey) -> Result<R> {
    let object = store.get(R::KIND, key).await?;
    decode(object)
}

/// Like [`get_typed`] but maps not-found to `None`.
pub async fn get_opt_typed<R: Resource>(
    store: &dyn ObjectStore,
    key: &ObjectKey,
) -> Result<Option<R>> {
    match store.get(R::KIND, key).await {
        Ok(object) => decode(object).map(Some),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn list_typed<R: Resource>(store: &dyn ObjectStore, params: &ListParams) -> Result<Vec<R>> {
    store
        .list(R::KIND, params)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

pub async fn create_typed<R: Resource>(store: &dyn ObjectStore, object: &R) -> Result<R> {
    let created = store.create(R::KIND, encode(object)?).await?;
    decode(created)
}

pub async fn update_typed<R: Resource>(store: &dyn ObjectStore, object: &R) -> Result<R> {
    let updated = store.update(R::KIND, encode(object)?).await?;
    decode(updated)
}

pub async fn delete_typed<R: Resource>(store: &dyn ObjectStore, key: &ObjectKey) -> Result<()> {
    store.delete(R::KIND, key).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_matching() {
        let mut meta = ObjectMeta::namespaced("ns", "a");
        meta.labels.insert("app".into(), "dbaas".into());

        assert!(ListParams::all().matches(&meta));
        assert!(ListParams::in_namespace("ns").matches(&meta));
        assert!(!ListParams::in_namespace("other").matches(&meta));
        assert!(ListParams::in_namespace("ns").with_label("app", "dbaas").matches(&meta));
        assert!(!ListParams::all().with_label("app", "other").matches(&meta));
        assert!(!ListParams::in_namespace("ns").matches(&ObjectMeta::cluster("t")));
    }

    #[test]
    fn test_store_error_classification() {
        let err: AuthzError = StoreError::Conflict {
            kind: Kind::Config,
            key: ObjectKey::namespaced("ns", "c1"),
            expected: "1".into(),
            actual: "2".into(),
        }
        .into();
        assert!(err.is_conflict());
        assert!(err.is_retryable());

        let err: AuthzError = StoreError::NotFound {
            kind: Kind::Role,
            key: ObjectKey::namespaced("ns", "r"),
        }
        .into();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }
}
