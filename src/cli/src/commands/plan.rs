//! Offline planning of derived RBAC objects.

use anyhow::Result;
use clap::Args;
use dbaas_authz_core::access::{resolve_inventory_access, resolve_tenant_access, ReviewQueries};
use dbaas_authz_core::config::Settings;
use dbaas_authz_core::rbac::{forbidden_verbs, inventory_rbac_objects, tenant_rbac_objects};
use dbaas_authz_core::resources::{HasBinding, HasRules, Resource};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::manifest::Manifest;
use crate::output::{self, join_or_dash, OutputFormat};

#[derive(Args)]
pub struct PlanArgs {
    /// Manifest file
    manifest: PathBuf,
}

#[derive(Debug, Serialize, Tabled)]
struct PlannedRow {
    #[tabled(rename = "Namespace")]
    namespace: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Owner")]
    owner: String,
    #[tabled(rename = "Verbs / Subjects")]
    contents: String,
    #[tabled(rename = "Gate")]
    gate: String,
}

impl PlannedRow {
    fn rules<T: HasRules + Resource>(namespace: &str, role: &T, owner: &str) -> Self {
        let verbs = role
            .rules()
            .iter()
            .flat_map(|rule| rule.verbs.iter().cloned())
            .collect::<std::collections::BTreeSet<_>>();
        let forbidden = forbidden_verbs(role.rules());
        Self {
            namespace: namespace.to_string(),
            kind: T::KIND.as_str().to_string(),
            name: role.name().to_string(),
            owner: owner.to_string(),
            contents: join_or_dash(verbs),
            gate: if forbidden.is_empty() {
                "ok".to_string()
            } else {
                format!("rejected ({})", forbidden.join(", "))
            },
        }
    }

    fn binding<T: HasBinding + Resource>(namespace: &str, binding: &T, owner: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind: T::KIND.as_str().to_string(),
            name: binding.name().to_string(),
            owner: owner.to_string(),
            contents: join_or_dash(binding.subjects().iter().map(|s| s.to_string())),
            gate: "ok".to_string(),
        }
    }
}

pub async fn execute(args: PlanArgs, settings: &Settings, format: OutputFormat) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let queries = ReviewQueries::new(super::reviewer(settings, &manifest)?);

    let mut rows = Vec::new();
    for namespace in manifest.tenant_namespaces() {
        let tenants = manifest.tenants_in(namespace);
        let inventories = manifest.inventories_in(namespace);
        let inputs = queries.tenant_inputs(namespace).await;

        for tenant in &tenants {
            let access = resolve_tenant_access(tenant, &inventories, &inputs);
            let (role, binding) = tenant_rbac_objects(tenant, &access);
            rows.push(PlannedRow::rules(namespace, &role, tenant.name()));
            rows.push(PlannedRow::binding(namespace, &binding, tenant.name()));
        }
        for inventory in &inventories {
            let access = resolve_inventory_access(inventory, &tenants);
            let (role, binding) = inventory_rbac_objects(inventory, &access);
            rows.push(PlannedRow::rules(namespace, &role, inventory.name()));
            rows.push(PlannedRow::binding(namespace, &binding, inventory.name()));
        }
    }

    let claimed = manifest.tenant_namespaces();
    let unclaimed = manifest
        .inventories
        .iter()
        .filter(|i| i.namespace().map_or(true, |ns| !claimed.contains(ns)))
        .count();
    if unclaimed > 0 && format == OutputFormat::Table {
        output::print_info(&format!(
            "{} inventories are outside every tenant namespace and get no RBAC objects",
            unclaimed
        ));
    }

    output::print_list(&rows, format)
}
