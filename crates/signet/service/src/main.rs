//! signetd: the signet contract workflow daemon.

use anyhow::Context;
use clap::Parser;
use signet_lifecycle::LifecycleController;
use signet_notify::{NotificationDispatcher, RecordingDispatcher, WebhookDispatcher};
use signet_service::state::AppState;
use signet_storage::{FsArtifactStore, SqliteContractStore};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Command-line and environment configuration.
#[derive(Debug, Parser)]
#[command(name = "signetd", about = "signet contract countersigning daemon")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "SIGNET_LISTEN", default_value = "127.0.0.1:8460")]
    listen: String,

    /// SQLite database URL.
    #[arg(
        long,
        env = "SIGNET_DATABASE_URL",
        default_value = "sqlite:signet.db?mode=rwc"
    )]
    database_url: String,

    /// Directory for stored document and image artifacts.
    #[arg(long, env = "SIGNET_ARTIFACT_DIR", default_value = "artifacts")]
    artifact_dir: String,

    /// Public base URL used in notification deep links.
    #[arg(long, env = "SIGNET_PUBLIC_URL", default_value = "http://127.0.0.1:8460")]
    public_url: String,

    /// Webhook endpoint notifications are POSTed to. Without one,
    /// notifications are recorded in memory only.
    #[arg(long, env = "SIGNET_NOTIFY_WEBHOOK")]
    notify_webhook: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let contracts = SqliteContractStore::connect(&args.database_url)
        .await
        .context("failed to open contract database")?;
    let artifacts = FsArtifactStore::open(args.artifact_dir.as_str())
        .await
        .context("failed to open artifact store")?;
    let notifier: Arc<dyn NotificationDispatcher> = match &args.notify_webhook {
        Some(endpoint) => Arc::new(WebhookDispatcher::new(endpoint.clone())),
        None => Arc::new(RecordingDispatcher::new()),
    };

    let controller = LifecycleController::new(
        Arc::new(contracts),
        Arc::new(artifacts),
        notifier,
        args.public_url.clone(),
    );
    let router = signet_service::create_router(AppState::new(Arc::new(controller)));

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    tracing::info!(addr = %args.listen, "signetd listening");
    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}
