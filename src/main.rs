//! Hotseat Heat backend entrypoint wiring REST, SSE, the room store and the round authorities.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hotseat_heat_back::{
    config::AppConfig,
    dao::room_store::memory::MemoryRoomStore,
    routes,
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let app_state = AppState::new(AppConfig::load());
    start_room_store(&app_state).await;

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the room store backend: CouchDB when configured, in-process memory otherwise.
async fn start_room_store(state: &SharedState) {
    #[cfg(feature = "couch-store")]
    {
        use hotseat_heat_back::{
            dao::room_store::{
                RoomStore,
                couchdb::{CouchConfig, CouchRoomStore},
            },
            services::storage_supervisor,
        };

        if CouchConfig::is_configured() {
            match CouchConfig::from_env() {
                Ok(config) => {
                    info!(database = %config.database, "using CouchDB room store");
                    tokio::spawn(storage_supervisor::run(state.clone(), move || {
                        let config = config.clone();
                        async move {
                            let store = CouchRoomStore::connect(config).await?;
                            Ok(Arc::new(store) as Arc<dyn RoomStore>)
                        }
                    }));
                    return;
                }
                Err(err) => {
                    warn!(error = %err, "incomplete CouchDB configuration; falling back to memory");
                }
            }
        }
    }

    info!("using in-memory room store");
    state
        .install_room_store(Arc::new(MemoryRoomStore::new()))
        .await;
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
