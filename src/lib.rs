pub mod api;
pub mod chat;
pub mod config;
pub mod core_state;
pub mod intake;
pub mod pipeline;
pub mod session;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

/// Fatal startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error("Failed to start the async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Server(#[from] api::ServerError),
}

/// Start the relay and serve until Ctrl-C.
pub fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let app_config = config::AppConfig::from_env();
    let bind = app_config.bind;

    // Service clients are blocking and must exist outside the runtime.
    let core = Arc::new(core_state::CoreState::from_config(app_config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let served = runtime.block_on(async {
        let mut server = api::start_server(Arc::clone(&core), bind).await?;
        tracing::info!(addr = %server.addr(), "Listening");

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for Ctrl-C: {e}");
        }
        server.shutdown();
        server.wait().await;
        Ok::<_, StartupError>(())
    });

    // Blocking clients must not be dropped inside the runtime.
    drop(runtime);
    drop(core);

    tracing::info!("{} stopped", config::APP_NAME);
    served
}
