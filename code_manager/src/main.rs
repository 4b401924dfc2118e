use code_manager::{api::routes, state::AppState};
use common::logger::init_logging;
use std::net::SocketAddr;
use std::path::Path;
use tokio::net::TcpListener;
use util::config::AppConfig;

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_logging(
        Path::new("logs"),
        &config.log_file,
        &config.log_level,
        config.log_to_stdout,
    );

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "Invalid listen address");
            std::process::exit(1);
        }
    };
    let project_name = config.project_name.clone();

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load course registry");
            std::process::exit(1);
        }
    };
    let manager = state.manager.clone();
    let app = routes(state);

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!("Starting {project_name} on http://{addr}");

    let shutdown = async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutting down; cancelling running tasks");
        manager.shutdown();
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %e, "Server crashed");
    }
}
