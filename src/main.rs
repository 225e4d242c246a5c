use gemini_live_relay::{GeminiConnector, LoggingOrderStore, RelayConfig, RelayServer, ToolRegistry};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = dotenv::dotenv() {
        info!("No .env file loaded ({}); using process environment.", e);
    }
    let config = Arc::new(RelayConfig::from_env()?);
    info!("Starting relay with {:?}", config);

    let registry = Arc::new(ToolRegistry::with_builtin_tools(Arc::new(LoggingOrderStore)));
    let connector = Arc::new(GeminiConnector::new(config.clone()));
    let server = RelayServer::new(config.clone(), connector, registry);

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Relay stopped.");
    Ok(())
}
