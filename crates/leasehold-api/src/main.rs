//! Leasehold API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use leasehold_api::build_app;
use leasehold_api::config::{AppConfig, Infrastructure};
use leasehold_api::error::AppError;
use leasehold_api::state::AppState;
use leasehold_api::telemetry::Telemetry;
use leasehold_core::clock::SystemClock;
use leasehold_core::memory::InMemoryRecorder;
use leasehold_core::recorder::Recorder;
use leasehold_core::snapshot::SnapshotPolicy;
use leasehold_event_store::PgRecorder;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let telemetry = Telemetry::init(std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok())?;

    let result = run().await;
    if let Err(err) = &result {
        error!(error = %err, "server stopped with an error");
    }

    telemetry.shutdown();
    result
}

async fn run() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    info!(
        infrastructure = ?config.infrastructure,
        snapshot_interval = config.snapshot_interval,
        "starting Leasehold API server"
    );

    let (recorder, postgres): (Arc<dyn Recorder>, Option<PgRecorder>) =
        match config.infrastructure {
            Infrastructure::Postgres => {
                let pg = PgRecorder::connect(&config.postgres).await?;
                (Arc::new(pg.clone()) as Arc<dyn Recorder>, Some(pg))
            }
            Infrastructure::Memory => {
                warn!("using the in-memory recorder; events are lost on exit");
                (Arc::new(InMemoryRecorder::new()) as Arc<dyn Recorder>, None)
            }
        };

    let app_state = AppState::new(
        recorder,
        SnapshotPolicy::every(config.snapshot_interval),
        Arc::new(SystemClock),
    );

    // Keeps the rental directory warm between requests.
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let runner = app_state.directory.clone();
    let runner_task = tokio::spawn(async move {
        runner
            .run_until(async move {
                let _ = stop_rx.changed().await;
            })
            .await;
    });

    let app = build_app(app_state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| {
            AppError::Server(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid HOST:PORT combination: {e}"),
            ))
        })?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let _ = stop_tx.send(true);
    if let Err(err) = runner_task.await {
        warn!(error = %err, "projection runner task failed");
    }
    if let Some(pg) = postgres {
        pg.close().await;
    }
    info!("server stopped");

    served.map_err(AppError::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
