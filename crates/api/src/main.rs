use anyhow::Result;
use oficina_api::{build_app, AppConfig};
use oficina_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("oficina_api");

    let config = AppConfig::from_env();
    let app = build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(
        bind = %config.bind,
        persistent = config.database_url.is_some(),
        "oficina api started"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
