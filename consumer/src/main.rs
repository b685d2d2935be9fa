//! Settlement saga consumer.
//!
//! Wires Postgres, Redpanda and the HTTP surface together, then runs the
//! stream reader until the stream closes, the reader fails, or the process is
//! interrupted.

use anyhow::Context;
use axum::{Router, extract::State, routing::get};
use paysaga_consumer::config::Config;
use paysaga_core::environment::{SystemClock, UuidIds};
use paysaga_core::projection::ProjectionStore;
use paysaga_postgres::PostgresEventLog;
use paysaga_projections::PostgresProjectionStore;
use paysaga_redpanda::{RedpandaPartitionReader, RedpandaPublisher};
use paysaga_runtime::metrics::MetricsServer;
use paysaga_runtime::{Pipeline, ReaderExit, SagaEnvironment, StreamReader};
use paysaga_web::hub::DEFAULT_COMMAND_CAPACITY;
use paysaga_web::{AppState, ViewerHub, router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How the process came to a stop without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stopped {
    Reader(ReaderExit),
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "paysaga=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Config::from_env()).await {
        Ok(stopped) => {
            info!(?stopped, "Consumer stopped");
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!(error = ?e, "Consumer failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(config: Config) -> anyhow::Result<Stopped> {
    info!(
        brokers = %config.stream.brokers,
        topic = %config.stream.topic,
        http_addr = %config.server.http_addr,
        metrics_addr = ?config.server.metrics_addr,
        "Configuration loaded"
    );

    if let Some(addr) = &config.server.metrics_addr {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("Invalid METRICS_ADDR {addr:?}"))?;
        let mut metrics = MetricsServer::new(addr);
        metrics.start()?;
        tokio::spawn(serve_metrics(metrics));
    }

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to PostgreSQL")?;

    let event_log = PostgresEventLog::new(pool.clone());
    event_log.migrate().await?;
    let projections = PostgresProjectionStore::new(pool);
    projections.migrate().await?;
    info!("Database ready");

    let publisher = Arc::new(
        RedpandaPublisher::builder()
            .brokers(&config.stream.brokers)
            .topic(&config.stream.topic)
            .partition_key(&config.stream.partition_key)
            .build()?,
    );
    let source = Arc::new(
        RedpandaPartitionReader::builder()
            .brokers(&config.stream.brokers)
            .topic(&config.stream.topic)
            .max_records(config.stream.poll_max_records)
            .build()?,
    );

    let (hub, _hub_task) = ViewerHub::spawn(DEFAULT_COMMAND_CAPACITY);
    let projections: Arc<dyn ProjectionStore> = Arc::new(projections);

    let state = AppState::new(
        publisher.clone(),
        projections.clone(),
        Arc::new(SystemClock),
        Arc::new(UuidIds),
        hub.clone(),
    );
    let listener = TcpListener::bind(&config.server.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.http_addr))?;
    info!(addr = %config.server.http_addr, "HTTP server listening");
    let http = tokio::spawn(async move { axum::serve(listener, router(state)).await });

    let env = SagaEnvironment::new(
        Arc::new(SystemClock),
        Arc::new(UuidIds),
        projections,
        publisher,
        Arc::new(hub),
    );
    let reader = StreamReader::new(
        source,
        Pipeline::new(Arc::new(event_log), env),
        config.stream.reader_config(),
    );

    tokio::select! {
        exit = reader.run() => {
            let exit = exit.context("Stream reader failed")?;
            Ok(Stopped::Reader(exit))
        },
        served = http => {
            served??;
            anyhow::bail!("HTTP server stopped unexpectedly")
        },
        () = shutdown_signal() => Ok(Stopped::Interrupted),
    }
}

/// Serve `/metrics` until the process exits.
async fn serve_metrics(metrics: MetricsServer) {
    let addr = metrics.addr();
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(Arc::new(metrics));

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(%addr, error = %e, "Failed to bind metrics endpoint");
            return;
        },
    };
    info!(%addr, "Metrics endpoint listening");

    if let Err(e) = axum::serve(listener, app).await {
        warn!(error = %e, "Metrics endpoint stopped");
    }
}

async fn render_metrics(State(metrics): State<Arc<MetricsServer>>) -> String {
    metrics.render().unwrap_or_default()
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
