//! CLI tool for batch identity reconciliation
//!
//! Pulls organizations, users and memberships from the identity provider and
//! upserts them into the local mirror. Intended for cron and for recovering
//! from missed webhooks.
//!
//! Usage:
//!   reconcile-identities [--config <path>] [--user <id> | --organization <id>] [--verbose]
//!
//! Options:
//!   --config        Path to configuration file
//!   --user          Reconcile a single provider user and their memberships
//!   --organization  Reconcile a single provider organization and its members
//!   --verbose       Enable debug logging
//!
//! Prints the JSON report on stdout. Exits with status 2 when some records
//! failed to reconcile.
//!
//! Example cron entry (nightly full sweep):
//!   15 3 * * * /usr/local/bin/reconcile-identities --config /etc/equiptrack/config.yaml

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use equiptrack::{
    db,
    services::{ClerkClient, ReconcileScope, Reconciler, SyncCache},
    AppConfig,
};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<String> = None;
    let mut scope = ReconcileScope::Full;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--user" => {
                if i + 1 < args.len() {
                    scope = ReconcileScope::User(args[i + 1].clone());
                    i += 1;
                }
            }
            "--organization" => {
                if i + 1 < args.len() {
                    scope = ReconcileScope::Organization(args[i + 1].clone());
                    i += 1;
                }
            }
            "--verbose" | "-v" => {
                verbose = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    // Logs go to stderr so stdout carries only the report
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = config_path {
        env::set_var("EQUIPTRACK_CONFIG", path);
    }
    let config = AppConfig::load().context("Failed to load configuration")?;

    info!("EquipTrack - Identity Reconciliation");

    let pool = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;
    let provider = Arc::new(
        ClerkClient::new(&config.identity).context("Failed to initialize identity provider client")?,
    );

    // The cache only matters to the server; a private one is enough here
    let reconciler = Reconciler::new(
        pool,
        provider,
        Arc::new(SyncCache::new(&config.sync_cache)),
        config.identity.page_size,
    );

    let report = match reconciler.reconcile(scope).await {
        Ok(report) => report,
        Err(e) => {
            error!("Reconciliation aborted: {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failed > 0 {
        error!(
            "{} of {} records failed to reconcile",
            report.failed, report.total
        );
        std::process::exit(2);
    }

    info!("Reconciled {} records in {} ms", report.total, report.elapsed_ms);
    Ok(())
}

fn print_help() {
    println!(
        r#"EquipTrack Identity Reconciliation

USAGE:
    reconcile-identities [OPTIONS]

OPTIONS:
    --config <PATH>         Path to configuration file
    --user <ID>             Reconcile one provider user
    --organization <ID>     Reconcile one provider organization
    -v, --verbose           Enable debug logging
    -h, --help              Print this help message

Without --user or --organization every organization, user and membership
is reconciled."#
    );
}
