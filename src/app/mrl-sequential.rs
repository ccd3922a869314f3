use anyhow::Result;
use clap::Parser;
use mrlease::cmd::sequential::Args;
use mrlease::{sequential, utils, workload};
use tracing::info;

fn main() -> Result<()> {
    utils::init_tracing();
    let args = Args::parse();
    let workload = workload::named(&args.job)?;

    let output = sequential::run(&args.inputs, &workload)?;
    sequential::write_output(&args.output, &output)?;
    info!("wrote {} keys to {}", output.len(), args.output.display());
    Ok(())
}
