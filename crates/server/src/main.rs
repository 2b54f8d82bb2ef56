use anyhow::Context;
use ledgerscan_extract::{ApiKeySource, ExtractionClient};
use ledgerscan_server::config::ServerConfig;
use ledgerscan_server::routes::router;
use ledgerscan_server::state::AppState;
use ledgerscan_server::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load().context("loading configuration")?;
    telemetry::init(config.log_format);

    if ApiKeySource::env(&config.extraction.api_key_env).resolve().is_err() {
        tracing::warn!(
            var = %config.extraction.api_key_env,
            "no API key configured; extraction requests will be refused"
        );
    }

    let client = ExtractionClient::from_config(&config.extraction)
        .context("building recognition client")?;
    let state = AppState::with_limits(client, config.session_limits());
    let app = router(state, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        model = %config.extraction.model,
        "ledgerscan server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
