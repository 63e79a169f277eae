use anyhow::Result;
use dbadmin::{run, AppConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dbadmin=info,warn")),
        )
        .init();
    let config = AppConfig::from_env()?;
    run(config).await
}
