use anyhow::Result;
use dayrate_cli::app;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
