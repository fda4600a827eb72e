//! Integration tests for the event-driven controller.

use dbaas_authz_core::access::StaticAccessReviewer;
use dbaas_authz_core::config_selector::{is_active, DEFAULT_CONFIG_NAME};
use dbaas_authz_core::controller::{Controller, ControllerConfig, ReconcileAction, ReconcileKey};
use dbaas_authz_core::rbac::{binding_name, inventory_role_name};
use dbaas_authz_core::resources::{Config, Inventory, ObjectKey, RoleBinding, Tenant};
use dbaas_authz_core::store::{
    create_typed, delete_typed, get_opt_typed, get_typed, update_typed, InMemoryStore,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Utilities
// ============================================================================

fn test_config() -> ControllerConfig {
    ControllerConfig {
        max_concurrent_reconciles: 2,
        requeue_base_delay: Duration::from_millis(5),
        requeue_max_delay: Duration::from_millis(100),
        acquire_timeout: Duration::from_secs(5),
        shutdown_grace: Duration::from_secs(5),
        install_namespace: "operator-ns".to_string(),
        create_default_config: true,
    }
}

fn controller(store: &Arc<InMemoryStore>) -> Controller {
    Controller::new(
        store.clone(),
        Arc::new(StaticAccessReviewer::default()),
        test_config(),
    )
}

/// Poll `check` until it holds or five seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..500 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn inventory_binding(store: &InMemoryStore, ns: &str, inventory: &str) -> Option<RoleBinding> {
    let name = binding_name(&inventory_role_name(inventory));
    get_opt_typed(store, &ObjectKey::namespaced(ns, name)).await.unwrap()
}

async fn binds(store: &InMemoryStore, ns: &str, inventory: &str, user: &str) -> bool {
    inventory_binding(store, ns, inventory)
        .await
        .map_or(false, |b| b.subjects.iter().any(|s| s.name == user))
}

async fn move_tenant(store: &InMemoryStore, name: &str, namespace: &str) {
    let mut tenant: Tenant = get_typed(store, &ObjectKey::cluster(name)).await.unwrap();
    tenant.spec.inventory_namespace = namespace.to_string();
    update_typed(store, &tenant).await.unwrap();
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_reconcile_single_key() {
    let store = Arc::new(InMemoryStore::new());
    create_typed(store.as_ref(), &Tenant::new("t1", "ns")).await.unwrap();
    create_typed(store.as_ref(), &Inventory::new("ns", "i1")).await.unwrap();

    let action = controller(&store)
        .reconcile(&ReconcileKey::authz("ns"))
        .await
        .unwrap();
    assert_eq!(action, ReconcileAction::Done);
    assert!(inventory_binding(&store, "ns", "i1").await.is_some());
}

#[tokio::test]
async fn test_run_reacts_to_events_and_stops_on_cancel() {
    let store = Arc::new(InMemoryStore::new());
    create_typed(store.as_ref(), &Tenant::new("t1", "ns-a")).await.unwrap();
    create_typed(store.as_ref(), &Inventory::new("ns-a", "i1")).await.unwrap();

    let controller = controller(&store);
    let shutdown = CancellationToken::new();
    let handle = {
        let controller = controller.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { controller.run(shutdown).await })
    };

    let st: &InMemoryStore = &store;

    // initial resync
    assert!(eventually(|| async move { inventory_binding(st, "ns-a", "i1").await.is_some() }).await);

    // default config bootstrap and selection
    assert!(
        eventually(|| async move {
            let config: Option<Config> = get_opt_typed(
                st,
                &ObjectKey::namespaced("operator-ns", DEFAULT_CONFIG_NAME),
            )
            .await
            .unwrap();
            config.map_or(false, |c| is_active(&c))
        })
        .await
    );

    // a new tenant and inventory arrive while running
    create_typed(store.as_ref(), &Tenant::new("t2", "ns-b").with_developers(&["bob"], &[]))
        .await
        .unwrap();
    create_typed(store.as_ref(), &Inventory::new("ns-b", "i2")).await.unwrap();
    assert!(
        eventually(|| async move {
            inventory_binding(st, "ns-b", "i2")
                .await
                .map_or(false, |b| b.subjects.iter().any(|s| s.name == "bob"))
        })
        .await
    );

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("controller did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert!(controller.queue().is_shutting_down());
    assert!(controller.pool_stats().succeeded > 0);
}

#[tokio::test]
async fn test_run_until_idle_is_quiescent() {
    let store = Arc::new(InMemoryStore::new());
    create_typed(store.as_ref(), &Tenant::new("t1", "ns")).await.unwrap();
    create_typed(store.as_ref(), &Inventory::new("ns", "i1")).await.unwrap();
    create_typed(store.as_ref(), &Config::new("ns", "c1")).await.unwrap();
    create_typed(store.as_ref(), &Config::new("ns", "c2")).await.unwrap();

    let controller = controller(&store);
    controller.run_until_idle(100).await.unwrap();

    let c1: Config = get_opt_typed(store.as_ref(), &ObjectKey::namespaced("ns", "c1"))
        .await
        .unwrap()
        .unwrap();
    let c2: Config = get_opt_typed(store.as_ref(), &ObjectKey::namespaced("ns", "c2"))
        .await
        .unwrap()
        .unwrap();
    assert!(is_active(&c1) ^ is_active(&c2));

    let writes = store.write_count();
    controller.run_until_idle(100).await.unwrap();
    assert_eq!(store.write_count(), writes);
}

#[tokio::test]
async fn test_departed_tenants_lose_inherited_access() {
    let store = Arc::new(InMemoryStore::new());
    create_typed(store.as_ref(), &Tenant::new("t1", "ns-a").with_developers(&["alice"], &[]))
        .await
        .unwrap();
    create_typed(store.as_ref(), &Tenant::new("t2", "ns-b").with_developers(&["bob"], &[]))
        .await
        .unwrap();
    create_typed(store.as_ref(), &Inventory::new("ns-a", "i1")).await.unwrap();
    create_typed(store.as_ref(), &Inventory::new("ns-b", "i2")).await.unwrap();

    let controller = controller(&store);
    controller.run_until_idle(100).await.unwrap();
    assert!(binds(&store, "ns-a", "i1", "alice").await);
    assert!(binds(&store, "ns-b", "i2", "bob").await);

    // deleted tenant
    delete_typed::<Tenant>(store.as_ref(), &ObjectKey::cluster("t1")).await.unwrap();
    controller.run_until_idle(100).await.unwrap();
    let binding = inventory_binding(&store, "ns-a", "i1").await.unwrap();
    assert!(binding.subjects.is_empty());

    // tenant moved to another namespace
    move_tenant(&store, "t2", "ns-c").await;
    controller.run_until_idle(100).await.unwrap();
    assert!(!binds(&store, "ns-b", "i2", "bob").await);

    // a fresh controller also settles with nothing left to revoke
    let writes = store.write_count();
    let restarted = Controller::new(
        store.clone(),
        Arc::new(StaticAccessReviewer::default()),
        test_config(),
    );
    restarted.run_until_idle(100).await.unwrap();
    assert_eq!(store.write_count(), writes);
}

#[tokio::test]
async fn test_running_controller_revokes_access_after_tenant_moves() {
    let store = Arc::new(InMemoryStore::new());
    create_typed(store.as_ref(), &Tenant::new("t1", "ns-a").with_developers(&["alice"], &[]))
        .await
        .unwrap();
    create_typed(store.as_ref(), &Inventory::new("ns-a", "i1")).await.unwrap();

    let controller = controller(&store);
    let shutdown = CancellationToken::new();
    let handle = {
        let controller = controller.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { controller.run(shutdown).await })
    };

    let st: &InMemoryStore = &store;
    assert!(eventually(|| async move { binds(st, "ns-a", "i1", "alice").await }).await);

    move_tenant(&store, "t1", "ns-b").await;
    assert!(eventually(|| async move { !binds(st, "ns-a", "i1", "alice").await }).await);

    shutdown.cancel();
    let result = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("controller did not stop")
        .unwrap();
    assert!(result.is_ok());
}
