//! Lexsync server - single entrypoint for the sync engine
//!
//! Wires the library crates together: database, remote API client, worker
//! pool, webhook receiver, sync orchestration, and the metrics API, all
//! served from one listener.

use axum::Router;
use clap::Parser;
use lexsync_client::RemoteApiClient;
use lexsync_core::{
    EncryptionService, MetricsSettings, RateLimitSettings, RetrySettings, SyncSettings,
    WorkerSettings,
};
use lexsync_metrics::MetricsRecorder;
use lexsync_queue::{JobExecutor, KeyLockMap, SyncJobRepository, SyncQueueService, WorkerPool};
use lexsync_store::{ConnectionRepository, RecordRepository};
use lexsync_sync::SyncOrchestrator;
use lexsync_transform::HandlerRegistry;
use lexsync_webhooks::WebhookService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, Layer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address to bind the server to
    #[arg(long, default_value = "0.0.0.0:8080", env = "LEXSYNC_ADDRESS")]
    address: String,

    /// Database connection URL
    #[arg(
        long,
        default_value = "sqlite://lexsync.db?mode=rwc",
        env = "LEXSYNC_DATABASE_URL"
    )]
    database_url: String,

    /// Redis URL for the metrics store
    #[arg(long, default_value = "redis://127.0.0.1:6379", env = "LEXSYNC_REDIS_URL")]
    redis_url: String,

    /// Practice-management API base URL
    #[arg(long, env = "LEXSYNC_REMOTE_BASE_URL")]
    remote_base_url: String,

    /// Provider tag expected in inbound webhook paths
    #[arg(long, default_value = "practicehub", env = "LEXSYNC_PROVIDER")]
    provider: String,

    /// Shared secret for inbound webhook HMAC validation
    #[arg(long, env = "LEXSYNC_WEBHOOK_SECRET")]
    webhook_secret: String,

    /// Publicly reachable base URL used when registering webhook callbacks
    #[arg(long, env = "LEXSYNC_CALLBACK_BASE_URL")]
    callback_base_url: String,

    /// Hex-encoded 32-byte key for credential encryption at rest
    #[arg(long, env = "LEXSYNC_ENCRYPTION_KEY")]
    encryption_key: String,

    /// Number of parallel sync workers
    #[arg(long, env = "LEXSYNC_WORKERS")]
    workers: Option<usize>,

    /// Records requested per page from the remote API
    #[arg(long, env = "LEXSYNC_PAGE_SIZE")]
    page_size: Option<u32>,

    /// Maximum attempts before a job fails permanently
    #[arg(long, env = "LEXSYNC_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LEXSYNC_LOG_LEVEL")]
    log_level: String,

    /// Log format: compact, full
    #[arg(long, default_value = "compact", env = "LEXSYNC_LOG_FORMAT")]
    log_format: String,
}

impl Cli {
    fn settings(&self) -> SyncSettings {
        let defaults = SyncSettings::default();
        SyncSettings {
            database_url: self.database_url.clone(),
            redis_url: self.redis_url.clone(),
            remote_base_url: self.remote_base_url.clone(),
            provider: self.provider.clone(),
            webhook_secret: self.webhook_secret.clone(),
            callback_base_url: self.callback_base_url.clone(),
            encryption_key: self.encryption_key.clone(),
            listen_addr: self.address.clone(),
            worker: WorkerSettings {
                concurrency: self.workers.unwrap_or(defaults.worker.concurrency),
                page_size: self.page_size.unwrap_or(defaults.worker.page_size),
                ..defaults.worker
            },
            retry: RetrySettings {
                max_attempts: self.max_attempts.unwrap_or(defaults.retry.max_attempts),
                ..defaults.retry
            },
            rate_limit: RateLimitSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

fn init_tracing(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // If RUST_LOG is set the user wants full control; otherwise default to
    // the lexsync crates at the requested level with noisy deps quieted.
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "lexsync_server={level},\
             lexsync_core={level},\
             lexsync_database={level},\
             lexsync_client={level},\
             lexsync_transform={level},\
             lexsync_store={level},\
             lexsync_metrics={level},\
             lexsync_queue={level},\
             lexsync_webhooks={level},\
             lexsync_sync={level},\
             sqlx=warn,\
             sea_orm=warn,\
             tower=warn,\
             hyper=warn,\
             reqwest=warn",
            level = log_level
        ))
    };

    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer().with_target(true).boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn api_doc() -> utoipa::openapi::OpenApi {
    let mut doc = lexsync_sync::SyncApiDoc::openapi();
    doc.merge(lexsync_webhooks::WebhooksApiDoc::openapi());
    doc.merge(lexsync_metrics::MetricsApiDoc::openapi());
    doc
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, &cli.log_format)?;
    let settings = cli.settings();

    let encryption = Arc::new(EncryptionService::new(&settings.encryption_key)?);
    let db = lexsync_database::establish_connection(&settings.database_url).await?;
    let metrics = MetricsRecorder::new(&settings.redis_url, settings.metrics.retention_days)?;

    let connections = Arc::new(ConnectionRepository::new(
        db.clone(),
        encryption,
        &settings.remote_base_url,
    )?);
    let records = Arc::new(RecordRepository::new(db.clone()));
    let jobs = Arc::new(SyncJobRepository::new(db));

    let client = Arc::new(RemoteApiClient::new(
        settings.remote_base_url.clone(),
        connections.clone(),
        settings.retry.clone(),
        settings.rate_limit.clone(),
    )?);

    let (sender, receiver) = SyncQueueService::create_channel(settings.worker.queue_buffer);
    let executor = Arc::new(JobExecutor::new(
        client.clone(),
        Arc::new(HandlerRegistry::new()),
        records,
        connections.clone(),
        jobs.clone(),
        metrics.clone(),
        sender.downgrade(),
        settings.retry.clone(),
        &settings.worker,
    ));
    let queue = SyncQueueService::new(sender, jobs.clone(), settings.retry.max_attempts);
    let pool = WorkerPool::start(
        settings.worker.concurrency,
        receiver,
        executor,
        Arc::new(KeyLockMap::new()),
    );

    // Rows left pending or in_progress by a previous process go back on the
    // queue before the listener accepts traffic.
    let recovered = queue.recover_pending().await?;
    if recovered > 0 {
        info!(recovered, "recovered jobs from previous run");
    }

    let webhook_service = Arc::new(WebhookService::new(
        settings.provider.clone(),
        settings.webhook_secret.clone(),
        settings.callback_base_url.clone(),
        connections.clone(),
        queue.clone(),
        client,
        metrics.clone(),
    ));
    let orchestrator = Arc::new(SyncOrchestrator::new(connections, jobs, queue.clone()));

    let app = Router::new()
        .merge(lexsync_sync::configure_routes().with_state(orchestrator))
        .merge(lexsync_webhooks::configure_routes().with_state(webhook_service))
        .merge(lexsync_metrics::configure_routes().with_state(Arc::new(metrics)))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api_doc()))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&settings.listen_addr).await?;
    info!(address = %settings.listen_addr, "lexsync server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and its service states) is gone; dropping our own queue
    // handle closes the job channel so workers drain and exit.
    drop(queue);
    info!("waiting for workers to drain");
    if tokio::time::timeout(Duration::from_secs(30), pool.join())
        .await
        .is_err()
    {
        warn!("workers still busy after 30s, in-flight jobs will be recovered at next start");
    }

    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("received ctrl-c, shutting down");
}
