use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    grid_quant::app_init().await?;
    grid_quant::run().await
}
