use statement_graph_assistant::{app::Services, config::AppConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ingest <statement-file> [--dry-run]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut path = None;
    let mut dry_run = false;
    for arg in std::env::args().skip(1) {
        if arg == "--dry-run" {
            dry_run = true;
        } else if path.is_none() {
            path = Some(arg);
        } else {
            return Err(USAGE.into());
        }
    }
    let Some(path) = path else {
        return Err(USAGE.into());
    };

    let text = tokio::fs::read_to_string(&path).await?;
    let services = Services::from_config(AppConfig::from_env()?).await?;
    let pipeline = services.ingestion();

    info!(%path, dry_run, "Ingesting statement");

    if dry_run {
        let (report, rows) = pipeline.preview(&text).await;
        for row in &rows {
            println!("{:<20} {}", row.category.as_str(), row.transaction.canonical_description());
        }
        println!("\n{}", serde_json::to_string_pretty(&report)?);
    } else {
        let report = pipeline.ingest(&text).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Ok(())
}
