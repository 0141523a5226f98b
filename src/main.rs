use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tower::make::Shared;
use tracing_subscriber::EnvFilter;

use casefile::audit::AuditScheduler;
use casefile::config::AppConfig;
use casefile::db;
use casefile::extraction::{toolchain, CommandToolchain};
use casefile::notify::Notifier;
use casefile::routes;
use casefile::s3::build_client;
use casefile::state::AppState;
use casefile::storage::S3Storage;
use casefile::store::PgDocumentStore;
use casefile::{default_handlers, Worker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        s3_bucket = %config.s3_bucket,
        extraction_enabled = config.extraction.enabled,
        email_enabled = config.notifications.email.is_some(),
        chat_enabled = config.notifications.matrix.is_some(),
        "loaded casefile configuration"
    );
    if config.extraction.enabled {
        toolchain::probe(&config.extraction)?;
    }

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    let applied = db::run_migrations(&pool)?;
    tracing::info!(applied, "database migrations up to date");

    let s3_client = build_client(&config).await?;
    let storage = Arc::new(S3Storage::new(s3_client, config.s3_bucket.clone()));
    let store = Arc::new(PgDocumentStore::new(pool));
    let notifier = Notifier::from_config(&config.notifications)?;
    let toolchain = Arc::new(CommandToolchain::new(&config.extraction));

    let (state, receiver) = AppState::new(config, store, storage, notifier, toolchain);
    let listen_addr: SocketAddr =
        format!("{}:{}", state.config.server_host, state.config.server_port).parse()?;

    let worker_task = if state.config.extraction.enabled {
        let worker = Worker::new(Arc::new(state.clone()), default_handlers());
        Some(tokio::spawn(async move { worker.run(receiver).await }))
    } else {
        tracing::warn!("text extraction disabled; queued jobs will not run");
        drop(receiver);
        None
    };
    let scheduler = AuditScheduler::start(state.auditor.clone());

    let router = routes::create_router(state);
    let listener = TcpListener::bind(listen_addr).await?;
    tracing::info!("listening on {}", listen_addr);

    axum::serve(listener, Shared::new(router))
        .with_graceful_shutdown(async {
            if let Err(err) = signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
            tracing::info!("received shutdown signal");
        })
        .await?;

    scheduler.shutdown().await;
    if let Some(task) = worker_task {
        task.abort();
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
