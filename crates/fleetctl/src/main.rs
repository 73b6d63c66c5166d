use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fleet_core::ApiProvider;
use fleet_core::config::FleetDocument;
use fleet_core::reconcile::{DEFAULT_FLEET_CONCURRENCY, Reconciler};

/// Converge declared autoscaling fleets onto live provider state.
#[derive(Parser)]
#[command(name = "fleetctl", version)]
struct Args {
    /// Path to the fleet document.
    #[arg(default_value = "autoscale.yaml")]
    config: PathBuf,

    /// How many fleets to reconcile at once.
    #[arg(long, default_value_t = DEFAULT_FLEET_CONCURRENCY)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let document = match FleetDocument::load(&args.config) {
        Ok(document) => document,
        Err(e) => {
            tracing::error!(path = %args.config.display(), error = %e, "cannot load fleet document");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        path = %args.config.display(),
        region = %document.region,
        fleets = document.groups.len(),
        "loaded fleet document"
    );

    let provider = match ApiProvider::from_env(&document.region) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            tracing::error!(error = %e, "cannot build autoscale provider");
            return ExitCode::FAILURE;
        }
    };

    let outcomes = match Reconciler::new(provider, document)
        .with_concurrency(args.concurrency)
        .run()
        .await
    {
        Ok(outcomes) => outcomes,
        Err(e) => {
            tracing::error!(error = %e, "convergence pass aborted");
            return ExitCode::FAILURE;
        }
    };

    let mut failed = 0usize;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(summary) => {
                tracing::info!(
                    fleet = %outcome.fleet,
                    template = %summary.template,
                    minted = summary.minted,
                    created_group = summary.created_group,
                    alarms_bound = summary.alarms_bound,
                    alarms_skipped = summary.alarms_skipped,
                    templates_deleted = summary.templates_deleted,
                    delete_failures = summary.delete_failures,
                    "fleet converged"
                );
            }
            // Already logged with context where it failed.
            Err(_) => failed += 1,
        }
    }

    if failed > 0 {
        tracing::error!(failed, total = outcomes.len(), "convergence pass finished with failures");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
