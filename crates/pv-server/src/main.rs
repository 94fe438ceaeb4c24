//! previewd: builds and runs preview deployments from GitHub webhooks.
//!
//! Webhooks only enqueue jobs; a single consumer task executes them one at a
//! time against the process supervisor and the working copies on disk.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

use pv_core::services::config_loader;
use pv_core::services::deployer::Deployer;
use pv_core::services::git::GitFetcher;
use pv_core::services::pm2::Pm2Supervisor;
use pv_core::services::queue::JobQueue;
use pv_core::services::router::EventRouter;
use pv_core::services::store::RecordStore;
use pv_core::services::supervisor::ProcessSupervisor;
use pv_core::services::tmux::TmuxSupervisor;
use pv_server::config::ServerConfig;
use pv_server::github::GithubClient;
use pv_server::routes::{self, AppState};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SupervisorKind {
    Pm2,
    Tmux,
}

#[derive(Parser)]
#[command(name = "previewd", about = "Preview deployments for pull requests and branches")]
struct Cli {
    /// Deployment config file (YAML list)
    #[arg(short, long, env = "PREVIEW_CONFIG", default_value = "previews.yaml")]
    config: PathBuf,

    /// HTTP port for webhooks and status
    #[arg(short, long, env = "PREVIEW_PORT", default_value = "3000")]
    port: u16,

    /// Directory holding the persisted record store
    #[arg(long, env = "PREVIEW_STATE_DIR", default_value = ".preview")]
    state_dir: PathBuf,

    /// Directory holding one working copy per deployment
    #[arg(long, env = "PREVIEW_DEPLOYS_DIR", default_value = "deploys")]
    deploys_dir: PathBuf,

    /// Process supervisor backend
    #[arg(long, env = "PREVIEW_SUPERVISOR", value_enum, default_value = "pm2")]
    supervisor: SupervisorKind,

    /// Interpreter prefixed to start files (tmux backend only), e.g. `node`
    #[arg(long, env = "PREVIEW_INTERPRETER")]
    interpreter: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    tracing::info!(config = %cli.config.display(), "starting previewd");
    let configs = config_loader::load(&cli.config)?;
    tracing::info!(count = configs.len(), "loaded deployment configs");

    let server_config = ServerConfig::from_env();
    let store = Arc::new(RecordStore::open(&cli.state_dir).await?);

    let supervisor: Arc<dyn ProcessSupervisor> = match (cli.supervisor, cli.interpreter) {
        (SupervisorKind::Pm2, _) => Arc::new(Pm2Supervisor::new()),
        (SupervisorKind::Tmux, Some(interpreter)) => {
            Arc::new(TmuxSupervisor::with_interpreter(interpreter))
        }
        (SupervisorKind::Tmux, None) => Arc::new(TmuxSupervisor::new()),
    };
    let fetcher = Arc::new(GitFetcher::new(server_config.github_token.clone()));
    let deployer = Arc::new(Deployer::new(
        store.clone(),
        supervisor,
        fetcher,
        cli.deploys_dir.clone(),
    ));
    let queue = Arc::new(JobQueue::new(store.clone()));

    let resumed = deployer.check_status(&queue, &configs).await?;
    if resumed > 0 {
        tracing::info!(resumed, "re-enqueued interrupted deployments");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.run(deployer.as_ref(), shutdown_rx).await })
    };

    let router = Arc::new(EventRouter::new(
        Arc::new(configs),
        queue,
        Arc::new(GithubClient::new(server_config.github_token.clone())),
    ));
    let app = routes::app(AppState {
        router,
        store,
        config: server_config,
    })
    .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("waiting for the in-flight job to finish");
    let _ = shutdown_tx.send(true);
    match consumer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "queue consumer failed"),
        Err(e) => tracing::error!(error = %e, "queue consumer panicked"),
    }
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
