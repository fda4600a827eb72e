//! In-memory object store.
//!
//! Implements the guarantees the controller relies on from the cluster:
//! resource versions with optimistic concurrency, uid assignment, cascading
//! deletion through owner references, and a watch stream.

use super::{meta_of, ListParams, ObjectStore, StoreError, StoreResult, WatchEvent, WatchEventType};
use crate::resources::{Kind, ObjectKey, ObjectMeta};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

const WATCH_CAPACITY: usize = 1024;

type StoreKey = (Kind, ObjectKey);

/// Dashmap-backed [`ObjectStore`].
pub struct InMemoryStore {
    /// Stored documents
    objects: DashMap<StoreKey, Value>,

    /// Last issued resource version
    resource_version: AtomicU64,

    /// Successful create/update/delete calls
    writes: AtomicU64,

    events: broadcast::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: DashMap::new(),
            resource_version: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            events,
        }
    }

    /// Number of writes accepted so far, cascaded deletions included.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of stored objects across all kinds.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn next_version(&self) -> String {
        (self.resource_version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn publish(&self, event_type: WatchEventType, kind: Kind, meta: ObjectMeta, object: Value) {
        // No subscribers is not an error.
        let _ = self.events.send(WatchEvent {
            event_type,
            kind,
            meta,
            object,
        });
    }

    fn validate_scope(kind: Kind, meta: &ObjectMeta) -> StoreResult<()> {
        if meta.name.is_empty() {
            return Err(StoreError::Invalid {
                kind,
                reason: "metadata.name is required".into(),
            });
        }
        match (kind.is_namespaced(), meta.namespace.as_deref()) {
            (true, None) | (true, Some("")) => Err(StoreError::Invalid {
                kind,
                reason: format!("{} is namespaced but has no namespace", meta.name),
            }),
            (false, Some(_)) => Err(StoreError::Invalid {
                kind,
                reason: format!("{} is cluster scoped but has a namespace", meta.name),
            }),
            _ => Ok(()),
        }
    }

    /// Keys of every object with an owner reference to `uid`.
    fn dependents_of(&self, uid: &str) -> Vec<StoreKey> {
        self.objects
            .iter()
            .filter(|entry| {
                meta_of(entry.key().0, entry.value())
                    .map(|meta| meta.is_owned_by(uid))
                    .unwrap_or(false)
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn remove(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()> {
        let (_, object) = self
            .objects
            .remove(&(kind, key.clone()))
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })?;
        self.writes.fetch_add(1, Ordering::SeqCst);

        let meta = meta_of(kind, &object)?;
        let uid = meta.uid.clone();
        self.publish(WatchEventType::Deleted, kind, meta, object);

        for (dep_kind, dep_key) in self.dependents_of(&uid) {
            debug!(owner = %key, kind = %dep_kind, key = %dep_key, "Garbage collecting dependent");
            match self.remove(dep_kind, &dep_key) {
                Ok(()) | Err(StoreError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn with_meta(mut object: Value, kind: Kind, meta: &ObjectMeta) -> StoreResult<Value> {
    let map = object.as_object_mut().ok_or_else(|| StoreError::Invalid {
        kind,
        reason: "object is not a JSON map".into(),
    })?;
    map.insert("metadata".into(), serde_json::to_value(meta)?);
    Ok(object)
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, kind: Kind, key: &ObjectKey) -> StoreResult<Value> {
        self.objects
            .get(&(kind, key.clone()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound {
                kind,
                key: key.clone(),
            })
    }

    async fn list(&self, kind: Kind, params: &ListParams) -> StoreResult<Vec<Value>> {
        let mut matched = Vec::new();
        for entry in self.objects.iter() {
            if entry.key().0 != kind {
                continue;
            }
            let meta = meta_of(kind, entry.value())?;
            if params.matches(&meta) {
                matched.push((entry.key().1.clone(), entry.value().clone()));
            }
        }
        matched.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matched.into_iter().map(|(_, v)| v).collect())
    }

    async fn create(&self, kind: Kind, object: Value) -> StoreResult<Value> {
        let mut meta = meta_of(kind, &object)?;
        Self::validate_scope(kind, &meta)?;

        let key = meta.key();
        let entry = match self.objects.entry((kind, key.clone())) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists { kind, key });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => entry,
        };

        if meta.uid.is_empty() {
            meta.uid = Uuid::new_v4().to_string();
        }
        meta.resource_version = Some(self.next_version());
        meta.creation_timestamp = Some(Utc::now());

        let stored = with_meta(object, kind, &meta)?;
        entry.insert(stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);

        trace!(kind = %kind, key = %key, version = ?meta.resource_version, "Created");
        self.publish(WatchEventType::Added, kind, meta, stored.clone());
        Ok(stored)
    }

    async fn update(&self, kind: Kind, object: Value) -> StoreResult<Value> {
        let mut meta = meta_of(kind, &object)?;
        Self::validate_scope(kind, &meta)?;
        let key = meta.key();

        let stored = {
            let mut entry = self
                .objects
                .get_mut(&(kind, key.clone()))
                .ok_or_else(|| StoreError::NotFound {
                    kind,
                    key: key.clone(),
                })?;
            let current = meta_of(kind, entry.value())?;

            if let Some(expected) = &meta.resource_version {
                let actual = current.resource_version.clone().unwrap_or_default();
                if *expected != actual {
                    return Err(StoreError::Conflict {
                        kind,
                        key,
                        expected: expected.clone(),
                        actual,
                    });
                }
            }

            meta.uid = current.uid;
            meta.creation_timestamp = current.creation_timestamp;
            meta.resource_version = Some(self.next_version());

            let stored = with_meta(object, kind, &meta)?;
            *entry.value_mut() = stored.clone();
            stored
        };
        self.writes.fetch_add(1, Ordering::SeqCst);

        trace!(kind = %kind, key = %key, version = ?meta.resource_version, "Updated");
        self.publish(WatchEventType::Modified, kind, meta, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, kind: Kind, key: &ObjectKey) -> StoreResult<()> {
        self.remove(kind, key)
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
