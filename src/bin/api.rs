use statement_graph_assistant::{api::start_server, app::Services, config::AppConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let port = config.port;

    info!("Statement Graph Assistant - API Server");
    info!("Port: {}", port);

    let services = Services::from_config(config).await?;

    info!("Services initialized, starting API server");
    start_server(services.api_state(), port).await?;

    Ok(())
}
