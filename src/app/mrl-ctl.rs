use anyhow::Result;
use clap::Parser;
use mrlease::cmd::ctl::{Args, Commands};
use mrlease::rpc::{self, proto};
use tonic::Request;

fn display_status(status: &proto::JobStatusReply) {
    let phase = match status.phase() {
        proto::Phase::Map => "map",
        proto::Phase::Reduce => "reduce",
        proto::Phase::Unspecified => "unknown",
    };
    println!("---------- JOB STATUS ----------");
    println!("Phase:      {}", phase);
    println!("Tasks:      {}", status.total);
    println!("Unassigned: {}", status.unassigned);
    println!("Assigned:   {}", status.assigned);
    println!("Finished:   {}", status.finished);
    println!("Done:       {}", status.done);
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut client = rpc::connect(&args.coordinator).await?;

    match args.command {
        Commands::Status {} => {
            let status = client
                .job_status(Request::new(proto::JobStatusRequest {}))
                .await?
                .into_inner();
            display_status(&status);
        }
    }
    Ok(())
}
