//! Integration tests for the authorization pass.
//!
//! These tests drive `AuthzOrchestrator` against an in-memory store and a
//! table-driven access reviewer.

use dbaas_authz_core::access::StaticAccessReviewer;
use dbaas_authz_core::orchestrator::{AuthzOrchestrator, TenantNamespaceIndex};
use dbaas_authz_core::rbac::{binding_name, inventory_role_name, tenant_cluster_role_name};
use dbaas_authz_core::rbac::{EnsureOutcome, RbacSynchronizer};
use dbaas_authz_core::resources::{
    ClusterRole, ClusterRoleBinding, Inventory, ObjectKey, ObjectMeta, PolicyRule, Role,
    RoleBinding, Subject, SubjectKind, Tenant, DBAAS_GROUP, RBAC_GROUP,
};
use dbaas_authz_core::store::{
    create_typed, delete_typed, get_opt_typed, get_typed, update_typed, InMemoryStore,
};
use std::sync::Arc;

// ============================================================================
// Test Utilities
// ============================================================================

const NS: &str = "inv-ns";

fn orchestrator(store: &Arc<InMemoryStore>, reviewer: Arc<StaticAccessReviewer>) -> AuthzOrchestrator {
    AuthzOrchestrator::new(store.clone(), reviewer, Arc::new(TenantNamespaceIndex::new()))
}

fn names(subjects: &[Subject]) -> Vec<(SubjectKind, &str)> {
    subjects.iter().map(|s| (s.kind, s.name.as_str())).collect()
}

async fn tenant_binding(store: &InMemoryStore, tenant: &str) -> ClusterRoleBinding {
    let name = binding_name(&tenant_cluster_role_name(tenant));
    get_typed(store, &ObjectKey::cluster(name)).await.unwrap()
}

async fn inventory_binding(store: &InMemoryStore, inventory: &str) -> RoleBinding {
    let name = binding_name(&inventory_role_name(inventory));
    get_typed(store, &ObjectKey::namespaced(NS, name)).await.unwrap()
}

/// Reviewer answers shared by the scenario tests.
fn scenario_reviewer() -> Arc<StaticAccessReviewer> {
    let reviewer = StaticAccessReviewer::default();
    reviewer.grant("create", "dbaasinventories", Some(NS), &["admin", "u1"], &[]);
    reviewer.grant("create", "secrets", Some(NS), &["admin"], &[]);
    reviewer.grant("list", "dbaasinventories", Some(NS), &["dev"], &[]);
    reviewer.grant("list", "dbaastenants", None, &["cluster-admin", "dev"], &[]);
    Arc::new(reviewer)
}

async fn seed_scenario(store: &InMemoryStore) {
    let tenant = Tenant::new("t1", NS).with_developers(&["u1"], &["g1"]);
    create_typed(store, &tenant).await.unwrap();

    create_typed(store, &Inventory::new(NS, "i1")).await.unwrap();
    let explicit = Inventory::new(NS, "i2").with_authz(&["u2"], &[]);
    create_typed(store, &explicit).await.unwrap();
}

// ============================================================================
// End-to-end derivation
// ============================================================================

#[tokio::test]
async fn test_tenant_access_combines_reviews_and_inventory_authz() {
    let store = Arc::new(InMemoryStore::new());
    seed_scenario(&store).await;

    let summary = orchestrator(&store, scenario_reviewer())
        .reconcile_namespace(NS)
        .await
        .unwrap();
    assert_eq!(summary.tenants, 1);
    assert_eq!(summary.inventories, 2);
    assert_eq!(summary.created, 6);
    assert_eq!(summary.rejected, 0);

    // service admins, then review developers, explicit authz and defaults,
    // minus everyone who can list all tenants
    let binding = tenant_binding(&store, "t1").await;
    assert_eq!(
        names(&binding.subjects),
        [
            (SubjectKind::User, "admin"),
            (SubjectKind::User, "u2"),
            (SubjectKind::User, "u1"),
            (SubjectKind::Group, "g1"),
        ]
    );
    assert!(binding.subjects.iter().all(|s| s.namespace.is_none()));
    assert!(binding
        .subjects
        .iter()
        .all(|s| s.api_group.as_deref() == Some(RBAC_GROUP)));

    let role: ClusterRole = get_typed(store.as_ref(), &ObjectKey::cluster(tenant_cluster_role_name("t1")))
        .await
        .unwrap();
    assert_eq!(role.rules[0].verbs, ["get"]);
    assert_eq!(role.rules[0].resource_names, ["t1"]);
    assert_eq!(role.rules[0].resources, ["dbaastenants", "dbaastenants/status"]);
}

#[tokio::test]
async fn test_inventory_access_inherits_or_overrides() {
    let store = Arc::new(InMemoryStore::new());
    seed_scenario(&store).await;
    orchestrator(&store, scenario_reviewer())
        .reconcile_namespace(NS)
        .await
        .unwrap();

    let inherited = inventory_binding(&store, "i1").await;
    assert_eq!(
        names(&inherited.subjects),
        [(SubjectKind::User, "u1"), (SubjectKind::Group, "g1")]
    );
    assert!(inherited
        .subjects
        .iter()
        .all(|s| s.namespace.as_deref() == Some(NS)));

    let explicit = inventory_binding(&store, "i2").await;
    assert_eq!(names(&explicit.subjects), [(SubjectKind::User, "u2")]);

    let role: Role = get_typed(store.as_ref(), &ObjectKey::namespaced(NS, inventory_role_name("i2")))
        .await
        .unwrap();
    assert_eq!(role.rules[0].resources, ["dbaasinventories", "dbaasinventories/status"]);
    assert_eq!(role.rules[0].resource_names, ["i2"]);
}

#[tokio::test]
async fn test_empty_explicit_authz_grants_nobody() {
    let store = Arc::new(InMemoryStore::new());
    create_typed(store.as_ref(), &Tenant::new("t1", NS).with_developers(&["u1"], &[]))
        .await
        .unwrap();
    let locked = Inventory::new(NS, "locked").with_authz(&[], &[]);
    create_typed(store.as_ref(), &locked).await.unwrap();

    orchestrator(&store, Arc::new(StaticAccessReviewer::default()))
        .reconcile_namespace(NS)
        .await
        .unwrap();

    assert!(inventory_binding(&store, "locked").await.subjects.is_empty());
    // no inventory inherits, so the tenant defaults are not consolidated either
    assert!(tenant_binding(&store, "t1").await.subjects.is_empty());
}

#[tokio::test]
async fn test_subjects_are_deduplicated_in_first_seen_order() {
    let store = Arc::new(InMemoryStore::new());
    create_typed(
        store.as_ref(),
        &Tenant::new("t1", NS).with_developers(&["b", "a", "b"], &["g", "g"]),
    )
    .await
    .unwrap();
    create_typed(
        store.as_ref(),
        &Tenant::new("t2", NS).with_developers(&["a", "c"], &[]),
    )
    .await
    .unwrap();
    create_typed(store.as_ref(), &Inventory::new(NS, "i1")).await.unwrap();

    orchestrator(&store, Arc::new(StaticAccessReviewer::default()))
        .reconcile_namespace(NS)
        .await
        .unwrap();

    let binding = inventory_binding(&store, "i1").await;
    assert_eq!(
        names(&binding.subjects),
        [
            (SubjectKind::User, "b"),
            (SubjectKind::User, "a"),
            (SubjectKind::User, "c"),
            (SubjectKind::Group, "g"),
        ]
    );
}

#[tokio::test]
async fn test_service_accounts_become_service_account_subjects() {
    let store = Arc::new(InMemoryStore::new());
    create_typed(
        store.as_ref(),
        &Tenant::new("t1", NS).with_developers(
            &["system:serviceaccount:team:bot", "system:serviceaccount:broken"],
            &[],
        ),
    )
    .await
    .unwrap();
    create_typed(store.as_ref(), &Inventory::new(NS, "i1")).await.unwrap();

    orchestrator(&store, Arc::new(StaticAccessReviewer::default()))
        .reconcile_namespace(NS)
        .await
        .unwrap();

    let binding = inventory_binding(&store, "i1").await;
    assert_eq!(binding.subjects.len(), 1);
    let subject = &binding.subjects[0];
    assert_eq!(subject.kind, SubjectKind::ServiceAccount);
    assert_eq!(subject.name, "bot");
    assert_eq!(subject.namespace.as_deref(), Some("team"));
    assert!(subject.api_group.is_none());
}

// ============================================================================
// Idempotence and ownership
// ============================================================================

#[tokio::test]
async fn test_second_pass_writes_nothing() {
    let store = Arc::new(InMemoryStore::new());
    seed_scenario(&store).await;
    let orchestrator = orchestrator(&store, scenario_reviewer());

    orchestrator.reconcile_namespace(NS).await.unwrap();
    let writes = store.write_count();

    let summary = orchestrator.reconcile_namespace(NS).await.unwrap();
    assert_eq!(summary.writes(), 0);
    assert_eq!(summary.unchanged, 6);
    assert_eq!(store.write_count(), writes);
    assert_eq!(summary.snapshot_version, 2);
}

#[tokio::test]
async fn test_drifted_binding_is_restored() {
    let store = Arc::new(InMemoryStore::new());
    seed_scenario(&store).await;
    let orchestrator = orchestrator(&store, scenario_reviewer());
    orchestrator.reconcile_namespace(NS).await.unwrap();

    let mut binding = inventory_binding(&store, "i2").await;
    binding.subjects.clear();
    update_typed(store.as_ref(), &binding).await.unwrap();

    let summary = orchestrator.reconcile_namespace(NS).await.unwrap();
    assert_eq!(summary.updated, 1);
    assert_eq!(
        names(&inventory_binding(&store, "i2").await.subjects),
        [(SubjectKind::User, "u2")]
    );
}

#[tokio::test]
async fn test_foreign_object_is_left_alone() {
    let store = Arc::new(InMemoryStore::new());
    seed_scenario(&store).await;

    let foreign = Role {
        metadata: ObjectMeta::namespaced(NS, inventory_role_name("i1")),
        rules: vec![PolicyRule::new(&[DBAAS_GROUP], &["dbaasinventories"], &["watch"])],
    };
    create_typed(store.as_ref(), &foreign).await.unwrap();

    let summary = orchestrator(&store, scenario_reviewer())
        .reconcile_namespace(NS)
        .await
        .unwrap();
    assert_eq!(summary.not_owned, 1);

    let stored: Role = get_typed(store.as_ref(), &foreign.metadata.key()).await.unwrap();
    assert_eq!(stored.rules, foreign.rules);
}

#[tokio::test]
async fn test_deleting_owner_collects_derived_objects() {
    let store = Arc::new(InMemoryStore::new());
    seed_scenario(&store).await;
    orchestrator(&store, scenario_reviewer())
        .reconcile_namespace(NS)
        .await
        .unwrap();

    delete_typed::<Tenant>(store.as_ref(), &ObjectKey::cluster("t1")).await.unwrap();

    let role: Option<ClusterRole> =
        get_opt_typed(store.as_ref(), &ObjectKey::cluster(tenant_cluster_role_name("t1")))
            .await
            .unwrap();
    assert!(role.is_none());
    let binding: Option<ClusterRoleBinding> = get_opt_typed(
        store.as_ref(),
        &ObjectKey::cluster(binding_name(&tenant_cluster_role_name("t1"))),
    )
    .await
    .unwrap();
    assert!(binding.is_none());
}

// ============================================================================
// Safety gate and degraded reviews
// ============================================================================

#[tokio::test]
async fn test_role_with_write_verbs_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let owner = create_typed(store.as_ref(), &Inventory::new(NS, "i1")).await.unwrap();
    let sync = RbacSynchronizer::new(store.clone());

    let role = Role {
        metadata: ObjectMeta::namespaced(NS, "too-broad"),
        rules: vec![PolicyRule::new(
            &[DBAAS_GROUP],
            &["dbaasinventories"],
            &["get", "list", "delete"],
        )],
    };
    let writes = store.write_count();
    let outcome = sync.ensure(&role, &owner).await.unwrap();

    assert_eq!(
        outcome,
        EnsureOutcome::Rejected {
            verbs: vec!["delete".to_string(), "list".to_string()]
        }
    );
    assert_eq!(store.write_count(), writes);
    let stored: Option<Role> = get_opt_typed(store.as_ref(), &role.metadata.key()).await.unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn test_failed_review_degrades_to_empty() {
    let store = Arc::new(InMemoryStore::new());
    seed_scenario(&store).await;
    let reviewer = scenario_reviewer();
    reviewer.fail_on("dbaastenants");

    let summary = orchestrator(&store, reviewer.clone())
        .reconcile_namespace(NS)
        .await
        .unwrap();
    assert_eq!(summary.created, 6);

    // nobody is subtracted when the tenant-list review fails
    let binding = tenant_binding(&store, "t1").await;
    assert_eq!(
        names(&binding.subjects),
        [
            (SubjectKind::User, "admin"),
            (SubjectKind::User, "dev"),
            (SubjectKind::User, "u2"),
            (SubjectKind::User, "u1"),
            (SubjectKind::Group, "g1"),
        ]
    );
    assert!(reviewer.calls() >= 4);
}
