//! Admission check for a config in a manifest.

use anyhow::{bail, Context, Result};
use clap::Args;
use dbaas_authz_core::config_selector::validate_config_admission;
use dbaas_authz_core::resources::{Config, Resource};
use serde::Serialize;
use std::path::PathBuf;

use crate::manifest::Manifest;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ValidateArgs {
    /// Manifest file
    manifest: PathBuf,

    /// Name of the config to check against the others in its namespace
    config: String,
}

#[derive(Debug, Serialize)]
struct AdmissionResult {
    namespace: String,
    config: String,
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

pub async fn execute(args: ValidateArgs, format: OutputFormat) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let candidate = manifest
        .configs
        .iter()
        .find(|c| c.name() == args.config)
        .with_context(|| format!("Config '{}' not found in manifest", args.config))?;
    let namespace = candidate.namespace().unwrap_or_default().to_string();

    let existing: Vec<Config> = manifest
        .configs
        .iter()
        .filter(|c| c.namespace() == candidate.namespace() && c.name() != candidate.name())
        .cloned()
        .collect();

    let verdict = validate_config_admission(candidate, &existing);
    let result = AdmissionResult {
        namespace,
        config: args.config.clone(),
        allowed: verdict.is_ok(),
        message: verdict.as_ref().err().map(|e| e.message().to_string()),
    };

    match format {
        OutputFormat::Table if result.allowed => {
            output::print_success(&format!(
                "Config '{}' would be admitted in namespace '{}'",
                result.config, result.namespace
            ));
        }
        OutputFormat::Table => {}
        _ => output::print_item(&result, format)?,
    }

    if let Some(message) = result.message {
        bail!("Config '{}' would be denied: {}", args.config, message);
    }
    Ok(())
}
