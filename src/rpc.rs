//! The request/reply protocol between coordinator and workers.
//!
//! Messages and the service are generated from `proto/mapreduce.proto`.
//! This module adds the rendezvous [`Endpoint`], client dialing, and the
//! conversions between wire messages and the scheduler's types.

use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::net::UnixStream;
use tonic::transport::{Channel, Uri};
use tower::service_fn;

use crate::task::{Ack, MapSplit, Outcome, Payload, Phase, ReduceInput, Task, TaskId};

pub mod proto {
    tonic::include_proto!("mapreduce");
}

pub type CoordinatorClient = proto::coordinator_client::CoordinatorClient<Channel>;

/// Socket every process of a job uses unless told otherwise.
pub const DEFAULT_SOCKET: &str = "socket/mr-coordinator.sock";

/// Where the coordinator listens and workers dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// A unix domain socket on the local machine.
    Unix(PathBuf),
    /// A TCP address.
    Tcp(SocketAddr),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(PathBuf::from(DEFAULT_SOCKET))
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    /// `tcp://host:port` selects TCP; `unix:path` or a bare path selects a
    /// unix socket.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(addr) = s.strip_prefix("tcp://") {
            let addr = addr
                .parse()
                .with_context(|| format!("invalid TCP address `{addr}`"))?;
            return Ok(Endpoint::Tcp(addr));
        }
        let path = s.strip_prefix("unix:").unwrap_or(s);
        if path.is_empty() {
            bail!("empty socket path");
        }
        Ok(Endpoint::Unix(PathBuf::from(path)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
        }
    }
}

/// Opens a client connection to the coordinator at `endpoint`.
pub async fn connect(endpoint: &Endpoint) -> Result<CoordinatorClient> {
    let channel = match endpoint {
        Endpoint::Unix(path) => {
            let path = path.clone();
            // the URI is ignored by the connector, tonic only needs a valid one
            tonic::transport::Endpoint::try_from("http://[::]:50051")?
                .connect_with_connector(service_fn(move |_: Uri| {
                    UnixStream::connect(path.clone())
                }))
                .await
        }
        Endpoint::Tcp(addr) => {
            tonic::transport::Endpoint::from_shared(format!("http://{addr}"))?
                .connect()
                .await
        }
    }
    .with_context(|| format!("failed to dial coordinator at {endpoint}"))?;
    Ok(CoordinatorClient::new(channel))
}

/////////////////////////////////////////////////////////////////////////////
// Conversions
/////////////////////////////////////////////////////////////////////////////

impl From<Phase> for proto::Phase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Map => proto::Phase::Map,
            Phase::Reduce => proto::Phase::Reduce,
        }
    }
}

impl TryFrom<proto::Phase> for Phase {
    type Error = anyhow::Error;

    fn try_from(phase: proto::Phase) -> Result<Self> {
        match phase {
            proto::Phase::Map => Ok(Phase::Map),
            proto::Phase::Reduce => Ok(Phase::Reduce),
            proto::Phase::Unspecified => Err(anyhow!("phase not specified")),
        }
    }
}

impl From<Outcome> for proto::Outcome {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => proto::Outcome::Success,
            Outcome::Failure => proto::Outcome::Failure,
        }
    }
}

impl TryFrom<proto::Outcome> for Outcome {
    type Error = anyhow::Error;

    fn try_from(outcome: proto::Outcome) -> Result<Self> {
        match outcome {
            proto::Outcome::Success => Ok(Outcome::Success),
            proto::Outcome::Failure => Ok(Outcome::Failure),
            proto::Outcome::Unspecified => Err(anyhow!("outcome not specified")),
        }
    }
}

impl From<Ack> for proto::AckStatus {
    fn from(ack: Ack) -> Self {
        match ack {
            Ack::Accepted => proto::AckStatus::Accepted,
            Ack::Requeued => proto::AckStatus::Requeued,
            Ack::Duplicate => proto::AckStatus::Duplicate,
            Ack::UnknownTask => proto::AckStatus::UnknownTask,
        }
    }
}

impl From<proto::AckStatus> for Ack {
    fn from(status: proto::AckStatus) -> Self {
        match status {
            proto::AckStatus::Accepted => Ack::Accepted,
            proto::AckStatus::Requeued => Ack::Requeued,
            proto::AckStatus::Duplicate => Ack::Duplicate,
            proto::AckStatus::UnknownTask => Ack::UnknownTask,
        }
    }
}

/// Decodes a raw enum field, rejecting values this build does not know.
pub fn decode_enum<E>(raw: i32, what: &str) -> Result<E>
where
    E: TryFrom<i32>,
{
    E::try_from(raw).map_err(|_| anyhow!("unknown {what} value {raw}"))
}

/// Builds the reply that hands `task` to a worker.
pub fn task_reply(task: &Task, n_reduce: u32) -> proto::TaskReply {
    let mut reply = proto::TaskReply {
        task_id: task.id,
        n_reduce,
        ..Default::default()
    };
    match &task.payload {
        Payload::Map(split) => {
            reply.set_kind(proto::TaskKind::Map);
            reply.file = split.file.clone();
            reply.offset = split.offset;
            reply.length = split.length;
        }
        Payload::Reduce(input) => {
            reply.set_kind(proto::TaskKind::Reduce);
            reply.bucket = input.bucket;
            reply.intermediate_files = input.files.clone();
        }
    }
    reply
}

/// A `TaskReply` as the worker understands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    /// Nothing to hand out right now; back off and ask again.
    NoTask,
    Map {
        task_id: TaskId,
        split: MapSplit,
        n_reduce: u32,
    },
    Reduce {
        task_id: TaskId,
        input: ReduceInput,
    },
}

impl TryFrom<proto::TaskReply> for Assignment {
    type Error = anyhow::Error;

    fn try_from(reply: proto::TaskReply) -> Result<Self> {
        let kind: proto::TaskKind = decode_enum(reply.kind, "task kind")?;
        Ok(match kind {
            proto::TaskKind::NoTask => Assignment::NoTask,
            proto::TaskKind::Map => {
                if reply.n_reduce == 0 {
                    bail!("map task {} carries no reduce count", reply.task_id);
                }
                Assignment::Map {
                    task_id: reply.task_id,
                    split: MapSplit {
                        file: reply.file,
                        offset: reply.offset,
                        length: reply.length,
                    },
                    n_reduce: reply.n_reduce,
                }
            }
            proto::TaskKind::Reduce => Assignment::Reduce {
                task_id: reply.task_id,
                input: ReduceInput {
                    bucket: reply.bucket,
                    files: reply.intermediate_files,
                },
            },
        })
    }
}
