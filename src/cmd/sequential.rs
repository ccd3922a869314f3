use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Runs a job in a single process", long_about = None)]
pub struct Args {
    /// Name of the workload, e.g. wc or indexer
    pub job: String,
    /// Input files; glob patterns are expanded
    #[clap(required = true)]
    pub inputs: Vec<String>,
    /// Where to write the output
    #[clap(short, long, default_value = "mapreduce-out-0")]
    pub output: PathBuf,
}
