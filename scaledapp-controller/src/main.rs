use kube::Client;
use scaledapp_controller::{run, Config, Result};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,kube=warn")),
        )
        .init();

    let config = Config::from_env()?;
    let client = Client::try_default().await?;
    run(client, config).await
}
