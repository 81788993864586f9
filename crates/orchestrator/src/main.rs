//! Orchestrator entry point.

use metrics_exporter_prometheus::PrometheusHandle;
use orchestrator::config::{Config, LogFormat};
use store::{InMemoryStore, PostgresStore, SagaStore};
use task_queue::{InMemoryTaskQueue, WorkerPool};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn run<S: SagaStore + Clone + 'static>(
    config: Config,
    store: S,
    metrics_handle: PrometheusHandle,
) {
    // No task history in the running service.
    let queue = InMemoryTaskQueue::with_history_capacity(0);
    let (state, router) = orchestrator::create_default_state(
        store,
        queue.clone(),
        config.engine_config(),
        config.stall_timeout(),
    );

    // Workers consume the queue until the HTTP server has stopped.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = WorkerPool::new(queue, router, config.worker_config());
    let worker = tokio::spawn(async move { pool.run(shutdown_rx).await });

    let app = orchestrator::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(
        %addr,
        chaos_probability = config.chaos_probability,
        workers = config.worker_concurrency,
        "starting orchestrator"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    let _ = shutdown_tx.send(true);
    match worker.await {
        Ok(Ok(())) => tracing::info!("workers drained"),
        Ok(Err(e)) => tracing::error!(error = %e, "worker pool stopped with error"),
        Err(e) => tracing::error!(error = %e, "worker pool panicked"),
    }

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    // 1. Load configuration
    let config = Config::from_env().expect("invalid configuration");

    // 2. Initialize tracing
    init_tracing(&config);

    // 3. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 4. Pick the store and run
    match config.database_url.clone() {
        Some(url) => {
            let store = PostgresStore::connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL store");
            run(config, store, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory store");
            run(config, InMemoryStore::new(), metrics_handle).await;
        }
    }
}
