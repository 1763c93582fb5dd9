use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cmdstream_gateway::run().await?;
    Ok(())
}
