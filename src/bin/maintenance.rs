use std::env;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing_subscriber::EnvFilter;

use casefile::{
    audit::ReportQuery,
    config::AppConfig,
    db,
    extraction::CommandToolchain,
    notify::Notifier,
    s3,
    state::AppState,
    storage::S3Storage,
    store::PgDocumentStore,
};

const USAGE: &str = "Usage: maintenance <audit-once | verify <doc_id> | sync-sha <doc_id> | integrity-report [--failed]>";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let mut args = env::args().skip(1);
    let command = args.next();
    let argument = args.next();
    match (command.as_deref(), argument.as_deref()) {
        (Some("audit-once"), None) => {
            let state = connect().await?;
            let summary = state.auditor.run_batch().await?;
            println!(
                "Checked {} documents: {} mismatched, {} errored.",
                summary.checked, summary.mismatched, summary.errored
            );
        }
        (Some("verify"), Some(doc_id)) => {
            let state = connect().await?;
            let result = state.registry.verify(doc_id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        (Some("sync-sha"), Some(doc_id)) => {
            let state = connect().await?;
            let result = state.registry.resync_hash(doc_id).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        (Some("integrity-report"), flag) => {
            let only_failed = match flag {
                None => false,
                Some("--failed") => true,
                Some(other) => bail!("unknown flag {other}\n{USAGE}"),
            };
            let config = AppConfig::from_env()?;
            let log = casefile::audit::IntegrityLog::new(config.audit.log_path.clone());
            let records = log
                .list(&ReportQuery {
                    only_failed,
                    ..ReportQuery::default()
                })
                .await?;
            if records.is_empty() {
                println!("No integrity records found.");
            }
            for record in records {
                println!("{}", serde_json::to_string(&record)?);
            }
        }
        (Some(cmd), _) => {
            eprintln!("Unknown or incomplete command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        (None, _) => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn connect() -> Result<AppState> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = %config.s3_bucket,
        "loaded casefile configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let s3_client = s3::build_client(&config).await?;
    let storage = Arc::new(S3Storage::new(s3_client, config.s3_bucket.clone()));
    let store = Arc::new(PgDocumentStore::new(pool));
    let notifier = Notifier::from_config(&config.notifications)?;
    let toolchain = Arc::new(CommandToolchain::new(&config.extraction));
    let (state, _jobs) = AppState::new(config, store, storage, notifier, toolchain);
    Ok(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
