use freshcheck::{create_router, init, load_model, AppState, Config, ModelState, Result, ResultExt};

use std::time::Duration;

use tokio::net::TcpListener;

/// Longest gap between idle-session sweeps.
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the application
    init()?;

    let config = Config::from_env()?;
    let addr = config.bind_addr;
    let model_config = config.model.clone();

    // Initialize application state; the model loads in the background
    let state = AppState::new(config);

    let loader = {
        let state = state.clone();
        tokio::spawn(async move {
            let loaded = load_model(&model_config).await;
            state.set_model(ModelState::from_load(loaded)).await;
        })
    };

    let sweeper = {
        let state = state.clone();
        let period = state
            .config
            .session_idle_timeout
            .clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let expired = state.expire_idle_sessions().await;
                if expired > 0 {
                    log::info!("Closed {} idle sessions", expired);
                }
            }
        })
    };

    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    log::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // A load still pending at shutdown is abandoned
    loader.abort();
    sweeper.abort();
    log::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
}
