use anyhow::Context;
use tracing::{info, warn};

use stockflow_api::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("invalid configuration")?;

    stockflow_observability::init(config.log_format);

    if config.uses_default_secret() {
        warn!("JWT_SECRET not set; using insecure dev default");
    }

    let app = stockflow_api::app::build_app(&config)
        .await
        .context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
