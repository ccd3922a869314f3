use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::{TcpListenerStream, UnixListenerStream};
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

use super::state::JobState;
use crate::rpc::proto::coordinator_server::{Coordinator as CoordinatorRpc, CoordinatorServer};
use crate::rpc::proto::{
    AssignTaskRequest, JobStatusReply, JobStatusRequest, ReportDoneReply, ReportDoneRequest,
    TaskReply,
};
use crate::rpc::{self, proto, Endpoint};
use crate::task::{Outcome, Phase};

/// The gRPC face of the coordinator. Holds the same state handle as the
/// polling loop.
#[derive(Clone)]
pub struct CoordinatorService {
    state: Arc<Mutex<JobState>>,
}

impl CoordinatorService {
    pub fn new(state: Arc<Mutex<JobState>>) -> Self {
        Self { state }
    }

    fn lock(&self) -> Result<MutexGuard<'_, JobState>, Status> {
        self.state
            .lock()
            .map_err(|_| Status::internal("coordinator state is poisoned"))
    }
}

#[tonic::async_trait]
impl CoordinatorRpc for CoordinatorService {
    async fn assign_task(
        &self,
        request: Request<AssignTaskRequest>,
    ) -> Result<Response<TaskReply>, Status> {
        let worker_id = request.into_inner().worker_id;
        let assigned = {
            let mut state = self.lock()?;
            let n_reduce = state.n_reduce();
            state
                .assign(worker_id)
                .map(|task| (task.phase(), rpc::task_reply(&task, n_reduce)))
        };
        // logged after the lock is released
        let reply = match assigned {
            Some((phase, reply)) => {
                info!(
                    "assigned {} task {} to worker {}",
                    phase, reply.task_id, worker_id
                );
                reply
            }
            None => {
                debug!("no task for worker {}", worker_id);
                TaskReply::default()
            }
        };
        Ok(Response::new(reply))
    }

    async fn report_done(
        &self,
        request: Request<ReportDoneRequest>,
    ) -> Result<Response<ReportDoneReply>, Status> {
        let req = request.into_inner();
        let phase = rpc::decode_enum::<proto::Phase>(req.phase, "phase")
            .and_then(Phase::try_from)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;
        let outcome = rpc::decode_enum::<proto::Outcome>(req.outcome, "outcome")
            .and_then(Outcome::try_from)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let ack = self.lock()?.report(req.task_id, phase, req.worker_id, outcome);
        info!(
            "worker {} reported {} task {} {:?}: {:?}",
            req.worker_id, phase, req.task_id, outcome, ack
        );

        let mut reply = ReportDoneReply::default();
        reply.set_status(ack.into());
        Ok(Response::new(reply))
    }

    async fn job_status(
        &self,
        _request: Request<JobStatusRequest>,
    ) -> Result<Response<JobStatusReply>, Status> {
        let state = self.lock()?;
        let counts = state.counts();
        let mut reply = JobStatusReply {
            total: counts.total as u32,
            unassigned: counts.unassigned as u32,
            assigned: counts.assigned as u32,
            finished: counts.finished as u32,
            done: state.is_done(),
            ..Default::default()
        };
        reply.set_phase(state.phase().into());
        Ok(Response::new(reply))
    }
}

/// A running RPC listener. Dropping the handle also stops the server.
pub struct ServerHandle {
    endpoint: Endpoint,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl ServerHandle {
    /// The address actually bound (a TCP port of 0 is resolved).
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Stops accepting calls, waits briefly for in-flight ones, and removes
    /// the socket file.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match tokio::time::timeout(Duration::from_secs(5), &mut self.task).await {
            Ok(joined) => joined
                .context("server task panicked")?
                .context("server failed")?,
            Err(_) => {
                warn!("server did not stop in time, aborting it");
                self.task.abort();
            }
        }
        if let Endpoint::Unix(path) = &self.endpoint {
            let _ = fs::remove_file(path);
        }
        Ok(())
    }
}

/// Binds `endpoint` and serves `service` on it in the background.
///
/// Binding happens before this returns, so a listener that cannot be
/// established is reported to the caller. For a unix socket the parent
/// directory is created and a stale socket file is removed first.
pub async fn serve(service: CoordinatorService, endpoint: &Endpoint) -> Result<ServerHandle> {
    let (tx, rx) = oneshot::channel::<()>();
    let signal = async move {
        let _ = rx.await;
    };
    let router = Server::builder().add_service(CoordinatorServer::new(service));

    let (endpoint, task) = match endpoint {
        Endpoint::Unix(path) => {
            if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create socket directory {}", dir.display()))?;
            }
            match fs::remove_file(path) {
                Ok(()) => debug!("removed stale socket {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to remove stale socket {}", path.display()))
                }
            }
            let listener = UnixListener::bind(path)
                .with_context(|| format!("failed to listen on {}", path.display()))?;
            let incoming = UnixListenerStream::new(listener);
            (
                endpoint.clone(),
                tokio::spawn(router.serve_with_incoming_shutdown(incoming, signal)),
            )
        }
        Endpoint::Tcp(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to listen on {addr}"))?;
            let bound = Endpoint::Tcp(listener.local_addr()?);
            let incoming = TcpListenerStream::new(listener);
            (
                bound,
                tokio::spawn(router.serve_with_incoming_shutdown(incoming, signal)),
            )
        }
    };
    info!("coordinator listening on {}", endpoint);

    Ok(ServerHandle {
        endpoint,
        shutdown: Some(tx),
        task,
    })
}
