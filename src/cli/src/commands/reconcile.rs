//! One-shot reconciliation of a manifest.

use anyhow::Result;
use clap::Args;
use dbaas_authz_core::config::Settings;
use dbaas_authz_core::config_selector::READY_CONDITION;
use dbaas_authz_core::controller::{Controller, ControllerConfig};
use dbaas_authz_core::resources::{
    find_condition, ClusterRole, ClusterRoleBinding, Config, HasBinding, HasRules, PolicyRule,
    Resource, ResourceQuota, Role, RoleBinding,
};
use dbaas_authz_core::store::{list_typed, InMemoryStore, ListParams, ObjectStore};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

use crate::manifest::Manifest;
use crate::output::{self, join_or_dash, OutputFormat};

#[derive(Args)]
pub struct ReconcileArgs {
    /// Manifest file
    manifest: PathBuf,

    /// Give up when the store has not settled after this many reconciles
    #[arg(long, default_value = "1000")]
    max_reconciles: usize,
}

#[derive(Debug, Serialize, Tabled)]
struct ObjectRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl ObjectRow {
    fn new<R: Resource>(object: &R, detail: String) -> Self {
        Self {
            kind: R::KIND.as_str().to_string(),
            namespace: object.namespace().unwrap_or("-").to_string(),
            name: object.name().to_string(),
            detail,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReconcileReport {
    seeded: usize,
    reconciles: usize,
    writes: u64,
    objects: Vec<ObjectRow>,
}

async fn collect_rows(store: &dyn ObjectStore) -> Result<Vec<ObjectRow>> {
    let all = ListParams::all();
    let mut rows = Vec::new();

    for role in list_typed::<ClusterRole>(store, &all).await? {
        rows.push(ObjectRow::new(&role, verbs(role.rules())));
    }
    for binding in list_typed::<ClusterRoleBinding>(store, &all).await? {
        rows.push(ObjectRow::new(&binding, subjects(&binding)));
    }
    for role in list_typed::<Role>(store, &all).await? {
        rows.push(ObjectRow::new(&role, verbs(role.rules())));
    }
    for binding in list_typed::<RoleBinding>(store, &all).await? {
        rows.push(ObjectRow::new(&binding, subjects(&binding)));
    }
    for config in list_typed::<Config>(store, &all).await? {
        let detail = match find_condition(&config.status.conditions, READY_CONDITION) {
            Some(c) => format!("{}={} ({})", c.type_, c.status, c.reason),
            None => "-".to_string(),
        };
        rows.push(ObjectRow::new(&config, detail));
    }
    for quota in list_typed::<ResourceQuota>(store, &all).await? {
        let hard = quota.spec.hard.iter().map(|(k, v)| format!("{}={}", k, v));
        rows.push(ObjectRow::new(&quota, join_or_dash(hard)));
    }
    Ok(rows)
}

fn verbs(rules: &[PolicyRule]) -> String {
    join_or_dash(
        rules
            .iter()
            .map(|r| format!("{}: {}", r.resources.join("|"), r.verbs.join("|"))),
    )
}

fn subjects<B: HasBinding>(binding: &B) -> String {
    join_or_dash(binding.subjects().iter().map(|s| s.to_string()))
}

pub async fn execute(args: ReconcileArgs, settings: &Settings, format: OutputFormat) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let store = Arc::new(InMemoryStore::new());
    let seeded = manifest.seed(store.as_ref()).await?;
    let seed_writes = store.write_count();

    let reviewer = super::reviewer(settings, &manifest)?;
    let controller = Controller::new(store.clone(), reviewer, ControllerConfig::from(settings));
    let reconciles = controller.run_until_idle(args.max_reconciles).await?;

    let report = ReconcileReport {
        seeded,
        reconciles,
        writes: store.write_count() - seed_writes,
        objects: collect_rows(store.as_ref()).await?,
    };

    match format {
        OutputFormat::Table => {
            output::print_list(&report.objects, format)?;
            output::print_success(&format!(
                "Settled after {} reconciles ({} writes)",
                report.reconciles, report.writes
            ));
            Ok(())
        }
        _ => output::print_item(&report, format),
    }
}
