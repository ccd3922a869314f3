//! Command line arguments of the binaries under `src/app`.

pub mod coordinator;
pub mod ctl;
pub mod sequential;
pub mod worker;
