//! Long-running controller over a manifest-seeded store.

use anyhow::Result;
use clap::Args;
use dbaas_authz_core::config::Settings;
use dbaas_authz_core::controller::{Controller, ControllerConfig};
use dbaas_authz_core::store::InMemoryStore;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::manifest::Manifest;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Manifest file
    manifest: PathBuf,
}

pub async fn execute(args: RunArgs, settings: &Settings, format: OutputFormat) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;
    let store = Arc::new(InMemoryStore::new());
    let seeded = manifest.seed(store.as_ref()).await?;

    let reviewer = super::reviewer(settings, &manifest)?;
    let controller = Controller::new(store.clone(), reviewer, ControllerConfig::from(settings));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal.cancel();
    });

    if format == OutputFormat::Table {
        output::print_header("dbaas-authz controller");
        output::print_detail("Manifest", &args.manifest.display().to_string());
        output::print_detail("Objects seeded", &seeded.to_string());
        output::print_detail("Workers", &settings.controller.max_concurrent_reconciles.to_string());
        output::print_detail("Install namespace", &settings.operator.install_namespace);
        println!();
    }

    controller.run(shutdown).await?;

    let stats = controller.pool_stats();
    match format {
        OutputFormat::Table => {
            output::print_success(&format!(
                "Controller stopped: {} reconciles succeeded, {} failed, {} writes",
                stats.succeeded,
                stats.failed,
                store.write_count()
            ));
            Ok(())
        }
        _ => output::print_item(&stats, format),
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
