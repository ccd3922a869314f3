use anyhow::Result;
use clap::Parser;
use mrlease::cmd::coordinator::Args;
use mrlease::coordinator::Coordinator;
use mrlease::utils;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_tracing();
    let args = Args::parse();

    let coordinator = Coordinator::new(&args.inputs, args.config())?;
    let server = coordinator.serve(&args.listen).await?;
    coordinator.run().await?;

    // idle workers learn the job is over when their next request fails
    info!("job complete, shutting down in {:?}", args.grace());
    tokio::time::sleep(args.grace()).await;
    server.shutdown().await
}
