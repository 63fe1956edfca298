use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use tele_actions::{ActionGateway, ActionTransport, BridgeTransport, GatewayOptions};
use tele_events::Bus;
use tele_recorder::{BagRecorder, RecorderOptions};

mod api;
mod app_state;
mod config;
mod log_store;
mod openapi;
mod responses;
mod router;
mod util;

pub(crate) use app_state::AppState;

#[tokio::main]
async fn main() {
    init_tracing();

    let registry = match config::load_registry() {
        Ok(registry) => registry,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };
    let addr = match config::bind_addr() {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("error: {err:#}");
            std::process::exit(2);
        }
    };

    let bus = Bus::new(256);
    let transport: Arc<dyn ActionTransport> = Arc::new(BridgeTransport::from_env());
    let gateway = Arc::new(ActionGateway::with_options(
        registry,
        transport,
        GatewayOptions::from_env(),
    ));
    let recorder = Arc::new(BagRecorder::new(bus.clone(), RecorderOptions::from_env()));
    let log_store = Arc::new(log_store::LogStore::new(
        util::state_dir().join("experiment_logs"),
    ));
    let profile = Arc::new(config::load_profile());
    let state = AppState::new(bus, gateway, recorder, log_store, profile);

    let app = router::build_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind server socket");
    info!(%addr, "tele-server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        error!("http server exited with error: {err}");
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
}
