//! Scheduling runtime.
//!
//! Turns store watch events into reconcile keys and runs them on a bounded
//! worker pool. A key is never reconciled by two workers at once; keys that
//! fail or hit a write conflict are requeued with per-key backoff.

pub mod backoff;
pub mod queue;
pub mod triggers;
pub mod worker_pool;

pub use backoff::Backoff;
pub use queue::WorkQueue;
pub use triggers::{map_event, ReconcileKey};
pub use worker_pool::{WorkerPermit, WorkerPool, WorkerPoolConfig, WorkerPoolStats};

use crate::access::AccessReviewer;
use crate::config::Settings;
use crate::config_selector::{ensure_default_config, ConfigSelector};
use crate::error::{AuthzError, ErrorCode, Result};
use crate::orchestrator::{AuthzOrchestrator, TenantNamespaceIndex};
use crate::resources::{Config, Inventory, ObjectKey};
use crate::store::{list_typed, ListParams, ObjectStore, WatchEvent};
use metrics::{counter, gauge, histogram};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub max_concurrent_reconciles: usize,
    pub requeue_base_delay: Duration,
    pub requeue_max_delay: Duration,
    pub acquire_timeout: Duration,
    pub shutdown_grace: Duration,
    pub install_namespace: String,
    pub create_default_config: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ControllerConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            max_concurrent_reconciles: settings.controller.max_concurrent_reconciles,
            requeue_base_delay: settings.controller.requeue_base_delay,
            requeue_max_delay: settings.controller.requeue_max_delay,
            acquire_timeout: settings.controller.acquire_timeout,
            shutdown_grace: settings.controller.shutdown_grace,
            install_namespace: settings.operator.install_namespace.clone(),
            create_default_config: settings.operator.create_default_config,
        }
    }
}

/// What the scheduler should do with a key after a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Done,
    /// Run again after the key's backoff delay.
    Requeue,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Controller
// ═══════════════════════════════════════════════════════════════════════════════

/// Drives the authorization and config reconcilers from store events.
#[derive(Clone)]
pub struct Controller {
    store: Arc<dyn ObjectStore>,
    authz: AuthzOrchestrator,
    configs: ConfigSelector,
    index: Arc<TenantNamespaceIndex>,
    queue: Arc<WorkQueue<ReconcileKey>>,
    backoff: Arc<Backoff<ReconcileKey>>,
    pool: Arc<WorkerPool>,
    config: ControllerConfig,
}

impl Controller {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        reviewer: Arc<dyn AccessReviewer>,
        config: ControllerConfig,
    ) -> Self {
        let index = Arc::new(TenantNamespaceIndex::new());
        let pool = WorkerPool::new(WorkerPoolConfig {
            max_workers: config.max_concurrent_reconciles,
            acquire_timeout: config.acquire_timeout,
        });

        Self {
            authz: AuthzOrchestrator::new(store.clone(), reviewer, index.clone()),
            configs: ConfigSelector::new(store.clone()),
            queue: Arc::new(WorkQueue::new()),
            backoff: Arc::new(Backoff::new(config.requeue_base_delay, config.requeue_max_delay)),
            pool: Arc::new(pool),
            store,
            index,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<WorkQueue<ReconcileKey>> {
        &self.queue
    }

    pub fn pool_stats(&self) -> WorkerPoolStats {
        self.pool.stats()
    }

    /// Reconcile a single key.
    ///
    /// Write conflicts and create races are not errors: the key is requeued
    /// and the next attempt re-reads the current state.
    pub async fn reconcile(&self, key: &ReconcileKey) -> Result<ReconcileAction> {
        let span = info_span!("reconcile", key = %key, kind = key.kind());
        async {
            let result = match key {
                ReconcileKey::Authz { namespace } => {
                    self.authz.reconcile_namespace(namespace).await.map(|summary| {
                        for released in &summary.released_namespaces {
                            if released != namespace {
                                debug!(
                                    namespace = %released,
                                    "Namespace released by its tenants"
                                );
                                self.queue.add(ReconcileKey::authz(released.clone()));
                            }
                        }
                    })
                }
                ReconcileKey::Config { namespace, name } => self
                    .configs
                    .reconcile(&ObjectKey::namespaced(namespace, name))
                    .await
                    .map(|_| ()),
            };

            match result {
                Ok(()) => Ok(ReconcileAction::Done),
                Err(e) if is_stale_write(&e) => {
                    info!(error = %e, "Requeued due to update conflict");
                    Ok(ReconcileAction::Requeue)
                }
                Err(e) => Err(e),
            }
        }
        .instrument(span)
        .await
    }

    /// Queue `key` for reconciliation.
    pub fn enqueue(&self, key: ReconcileKey) {
        self.queue.add(key);
    }

    /// Queue every key derived from `event`.
    pub fn handle_event(&self, event: &WatchEvent) {
        let snapshot = self.index.current();
        for key in map_event(event, &snapshot) {
            debug!(key = %key, kind = event.kind.as_str(), "Event triggered reconcile");
            self.queue.add(key);
        }
    }

    /// Queue every tenant or inventory namespace and every config. Returns
    /// the number of keys queued.
    ///
    /// Inventory namespaces without tenants are included so that access
    /// inherited from tenants removed while no watch was running is revoked.
    pub async fn resync(&self) -> Result<usize> {
        let (snapshot, _) = self.index.refresh(self.store.as_ref()).await?;
        let inventories: Vec<Inventory> =
            list_typed(self.store.as_ref(), &ListParams::all()).await?;
        let namespaces: BTreeSet<&str> = snapshot
            .namespaces()
            .chain(inventories.iter().filter_map(|i| i.metadata.namespace.as_deref()))
            .collect();

        let mut queued = 0;
        for namespace in namespaces {
            self.queue.add(ReconcileKey::authz(namespace));
            queued += 1;
        }

        let configs: Vec<Config> = list_typed(self.store.as_ref(), &ListParams::all()).await?;
        for config in &configs {
            if let Some(namespace) = &config.metadata.namespace {
                self.queue
                    .add(ReconcileKey::config(namespace.clone(), config.metadata.name.clone()));
                queued += 1;
            }
        }

        info!(
            queued,
            snapshot_version = snapshot.version(),
            "Resynced all tenant namespaces and configs"
        );
        Ok(queued)
    }

    async fn bootstrap(&self) -> Result<()> {
        if self.config.create_default_config {
            ensure_default_config(self.store.as_ref(), &self.config.install_namespace).await?;
        }
        self.resync().await?;
        Ok(())
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// On cancellation no new keys are handed out; in-flight reconciles get
    /// `shutdown_grace` to finish before they are aborted.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        // Subscribe before the initial resync so no event falls in between.
        let mut events = self.store.watch();
        self.bootstrap().await?;

        info!(
            store = self.store.name(),
            workers = self.config.max_concurrent_reconciles,
            "Controller started"
        );

        let mut workers = JoinSet::new();
        loop {
            gauge!("dbaas_authz_queue_depth").set(self.queue.len() as f64);

            tokio::select! {
                _ = shutdown.cancelled() => break,

                event = events.recv() => match event {
                    Ok(event) => self.handle_event(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Watch stream lagged, resyncing");
                        if let Err(e) = self.resync().await {
                            e.log();
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!("Watch stream closed, stopping controller");
                        break;
                    }
                },

                key = self.queue.get() => {
                    let Some(key) = key else { break };
                    let permit = tokio::select! {
                        _ = shutdown.cancelled() => {
                            self.queue.done(&key);
                            break;
                        }
                        permit = self.pool.acquire() => permit,
                    };
                    match permit {
                        Ok(permit) => {
                            let this = self.clone();
                            workers.spawn(async move { this.process(key, permit).await });
                        }
                        Err(e) => {
                            warn!(key = %key, error = %e, "No worker available, requeueing");
                            self.queue.done(&key);
                            self.queue.add_after(key.clone(), self.backoff.next_delay(&key));
                        }
                    }
                }

                Some(joined) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            error!(error = %e, "Reconcile worker panicked");
                        }
                    }
                }
            }
        }

        self.shutdown(workers).await;
        Ok(())
    }

    async fn shutdown(&self, mut workers: JoinSet<()>) {
        info!(in_flight = workers.len(), "Controller shutting down");
        self.queue.shutdown();
        self.pool.close();

        let drain = async { while workers.join_next().await.is_some() {} };
        if tokio::time::timeout(self.config.shutdown_grace, drain).await.is_err() {
            warn!(
                grace_ms = self.config.shutdown_grace.as_millis() as u64,
                "Reconciles still running after grace period, aborting"
            );
            workers.abort_all();
        }

        let stats = self.pool.stats();
        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            "Controller stopped"
        );
    }

    async fn process(&self, key: ReconcileKey, permit: WorkerPermit) {
        let started = Instant::now();
        let outcome = match self.reconcile(&key).await {
            Ok(ReconcileAction::Done) => {
                self.backoff.reset(&key);
                permit.mark_success();
                "success"
            }
            Ok(ReconcileAction::Requeue) => {
                self.queue.add_after(key.clone(), self.backoff.next_delay(&key));
                permit.mark_success();
                "requeue"
            }
            Err(e) => {
                e.log();
                let delay = self.backoff.next_delay(&key);
                warn!(
                    key = %key,
                    failures = self.backoff.failures(&key),
                    delay_ms = delay.as_millis() as u64,
                    "Reconcile failed, requeueing"
                );
                self.queue.add_after(key.clone(), delay);
                permit.mark_failure();
                "error"
            }
        };

        counter!("dbaas_authz_reconciles_total", "kind" => key.kind(), "result" => outcome)
            .increment(1);
        histogram!("dbaas_authz_reconcile_duration_seconds", "kind" => key.kind())
            .record(started.elapsed().as_secs_f64());
        self.queue.done(&key);
    }

    /// Reconcile on the current task until no key is pending.
    ///
    /// Events caused by the reconciles themselves are fed back into the
    /// queue, so the store is settled when this returns. Fails when more
    /// than `max_reconciles` keys are processed.
    pub async fn run_until_idle(&self, max_reconciles: usize) -> Result<usize> {
        let mut events = self.store.watch();
        self.bootstrap().await?;

        let mut processed = 0;
        loop {
            loop {
                match events.try_recv() {
                    Ok(event) => self.handle_event(&event),
                    Err(TryRecvError::Lagged(_)) => {
                        self.resync().await?;
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }

            if self.queue.is_empty() {
                break;
            }
            if processed >= max_reconciles {
                return Err(AuthzError::internal(format!(
                    "store did not settle after {} reconciles",
                    processed
                )));
            }

            let Some(key) = self.queue.get().await else { break };
            let action = self.reconcile(&key).await;
            self.queue.done(&key);
            processed += 1;

            if action? == ReconcileAction::Requeue {
                self.queue.add(key);
            }
        }

        debug!(processed, "Store settled");
        Ok(processed)
    }
}

fn is_stale_write(error: &AuthzError) -> bool {
    error.is_conflict() || error.code() == ErrorCode::ObjectAlreadyExists
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::StaticAccessReviewer;
    use crate::resources::{Inventory, Tenant};
    use crate::store::{create_typed, InMemoryStore};

    fn controller(store: Arc<InMemoryStore>) -> Controller {
        let reviewer = Arc::new(StaticAccessReviewer::new(Vec::new()));
        Controller::new(store, reviewer, ControllerConfig::default())
    }

    #[test]
    fn test_config_from_settings() {
        let mut settings = Settings::default();
        settings.controller.max_concurrent_reconciles = 2;
        settings.operator.install_namespace = "ops".into();

        let config = ControllerConfig::from(&settings);
        assert_eq!(config.max_concurrent_reconciles, 2);
        assert_eq!(config.install_namespace, "ops");
        assert!(config.create_default_config);
    }

    #[tokio::test]
    async fn test_resync_queues_tenant_namespaces_and_configs() {
        let store = Arc::new(InMemoryStore::new());
        create_typed(store.as_ref(), &Tenant::new("t1", "ns-a")).await.unwrap();
        create_typed(store.as_ref(), &Tenant::new("t2", "ns-a")).await.unwrap();
        create_typed(store.as_ref(), &Inventory::new("ns-a", "i1")).await.unwrap();
        create_typed(store.as_ref(), &Inventory::new("ns-c", "i2")).await.unwrap();
        create_typed(store.as_ref(), &Config::new("ns-b", "c1")).await.unwrap();

        let controller = controller(store);
        assert_eq!(controller.resync().await.unwrap(), 3);
        assert_eq!(controller.queue().len(), 3);
    }

    #[tokio::test]
    async fn test_run_until_idle_settles() {
        let store = Arc::new(InMemoryStore::new());
        create_typed(store.as_ref(), &Tenant::new("t1", "ns")).await.unwrap();
        create_typed(store.as_ref(), &Inventory::new("ns", "inv")).await.unwrap();

        let controller = controller(store.clone());
        let processed = controller.run_until_idle(100).await.unwrap();
        assert!(processed >= 2);

        let writes = store.write_count();
        controller.run_until_idle(100).await.unwrap();
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(InMemoryStore::new());
        let controller = controller(store);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        controller.run(shutdown).await.unwrap();
        assert!(controller.queue().is_shutting_down());
    }
}
