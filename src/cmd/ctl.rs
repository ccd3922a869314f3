use clap::{Parser, Subcommand};

use crate::rpc::{Endpoint, DEFAULT_SOCKET};

#[derive(Parser, Debug)]
#[command(version, about = "Inspects a running job", long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
    /// Coordinator endpoint: a unix socket path or tcp://host:port
    #[clap(short, long, env = "MR_SOCKET", default_value = DEFAULT_SOCKET)]
    pub coordinator: Endpoint,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Shows the current phase and how many of its tasks are unassigned,
    /// assigned and finished.
    Status {},
}
