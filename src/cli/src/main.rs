//! dbaas-authz - plan, reconcile and run the DBaaS authorization controller.
//!
//! Objects come from a YAML manifest seeded into an in-memory store.

mod commands;
mod manifest;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dbaas_authz_core::config::Settings;
use dbaas_authz_core::telemetry::init_logging;
use std::path::PathBuf;

use commands::{plan, reconcile, run, validate};
use output::OutputFormat;

/// DBaaS multi-tenant authorization controller
#[derive(Parser)]
#[command(
    name = "dbaas-authz",
    author = "Aezi <aezi.zhu@icloud.com>",
    version = "0.1.0",
    about = "DBaaS multi-tenant authorization controller",
    long_about = "Derives per-tenant and per-inventory RBAC objects and keeps one DBaaSConfig active per namespace.",
    propagate_version = true
)]
pub struct Cli {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long, global = true, env = "DBAAS_AUTHZ_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the RBAC objects a manifest would produce, without writing
    Plan(plan::PlanArgs),

    /// Reconcile a manifest to a settled state and print the result
    Reconcile(reconcile::ReconcileArgs),

    /// Run the controller over a manifest until interrupted
    Run(run::RunArgs),

    /// Check whether a config in a manifest would be admitted
    ValidateConfig(validate::ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let format = cli.output;
    let result = match Settings::load_from(cli.config.as_deref()) {
        Ok(settings) => {
            let mut logging = settings.logging.clone();
            // Keep one-shot command output readable unless asked otherwise.
            if !matches!(cli.command, Commands::Run(_)) && std::env::var_os("RUST_LOG").is_none() {
                logging.level = "warn".to_string();
            }
            init_logging(&logging)?;

            match cli.command {
                Commands::Plan(args) => plan::execute(args, &settings, format).await,
                Commands::Reconcile(args) => reconcile::execute(args, &settings, format).await,
                Commands::Run(args) => run::execute(args, &settings, format).await,
                Commands::ValidateConfig(args) => validate::execute(args, format).await,
            }
        }
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
