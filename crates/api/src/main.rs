use anyhow::Context;

use paylake_api::app;
use paylake_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    paylake_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let pipeline = app::build_pipeline(&config)?;
    let router = app::build_app(pipeline.services.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The HTTP surface is down; drain the background loops before exit.
    pipeline.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
