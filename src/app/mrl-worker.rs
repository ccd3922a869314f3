use anyhow::Result;
use clap::Parser;
use mrlease::cmd::worker::Args;
use mrlease::worker::Worker;
use mrlease::{utils, workload};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    utils::init_tracing();
    let args = Args::parse();
    let workload = workload::named(&args.job)?;

    let id = std::process::id();
    let worker = Worker::new(id, workload, args.config());
    let summary = worker.run(&args.coordinator).await?;
    info!(
        "worker {} finished: {} map tasks, {} reduce tasks, {} failures",
        id, summary.map_tasks, summary.reduce_tasks, summary.failures
    );
    Ok(())
}
