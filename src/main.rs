use callwatch::application::{Scheduler, SessionOrchestrator};
use callwatch::config::Config;
use callwatch::infrastructure::broadcast::EventBroadcaster;
use callwatch::interface::{router, WsState};
use callwatch::telemetry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// `--config <path>` wins over `CALLWATCH_CONFIG`
fn config_path() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var_os("CALLWATCH_CONFIG").map(PathBuf::from)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load(config_path().as_deref())?;

    telemetry::init_tracing(&config.logging.level)?;
    info!("Starting Callwatch engine");
    info!("Configuration loaded: {:?}", config);

    telemetry::init_metrics(config.metrics.prometheus_listen.as_deref())?;

    let broadcaster = Arc::new(EventBroadcaster::new());
    let orchestrator = Arc::new(SessionOrchestrator::new(
        config.engine.clone(),
        broadcaster.clone(),
    ));
    let scheduler = Scheduler::spawn(orchestrator.clone());

    let app = router(WsState {
        broadcaster,
        queue_capacity: config.engine.subscriber_queue_capacity,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!("WebSocket server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    scheduler.shutdown().await;
    info!("Callwatch engine stopped");
    Ok(())
}
