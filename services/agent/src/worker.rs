//! Agent Server
//!
//! Hosts the per-job handler. Each incoming [`JobRequest`] gets its room
//! connected, the registered handler spawned on its own task, and the room
//! disconnected once the handler returns. A handler that panics is logged and
//! counted as a finished job; it never takes the server down.
//!
//! On shutdown the server stops accepting jobs, cancels the running handlers
//! and still disconnects each of their rooms before [`AgentServer::run`]
//! returns.

use futures_util::future::{BoxFuture, FutureExt};
use proctor_core::{JobContext, Room, RoomError, RoomGuard};
use secrecy::{ExposeSecret, SecretString};
use std::future::{Future, pending};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::{error, info, warn};

type JobHandler = Arc<dyn Fn(JobContext) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("no job handler registered")]
    NoHandler,
    #[error("job {job_id} could not join its room: {source}")]
    Connect {
        job_id: String,
        #[source]
        source: RoomError,
    },
}

/// One dispatched unit of work, scoped to a single room.
pub struct JobRequest {
    pub job_id: String,
    pub room: Arc<dyn Room>,
    pub url: String,
    pub token: SecretString,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Panicked,
    /// The handler was aborted by a shutdown request.
    Cancelled,
}

pub struct AgentServer {
    agent_name: String,
    handler: Option<JobHandler>,
}

impl AgentServer {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            handler: None,
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Registers the handler invoked once per job.
    pub fn rtc_session<F, Fut>(&mut self, handler: F)
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |ctx| handler(ctx).boxed()));
    }

    /// Runs one job to completion, or until `shutdown` resolves.
    pub async fn run_job<S>(
        &self,
        request: JobRequest,
        shutdown: S,
    ) -> Result<JobStatus, WorkerError>
    where
        S: Future<Output = ()>,
    {
        let handler = self.handler.clone().ok_or(WorkerError::NoHandler)?;
        let JobRequest {
            job_id,
            room,
            url,
            token,
        } = request;

        let guard = RoomGuard::arm(room.clone());
        if let Err(source) = room.connect(&url, token.expose_secret()).await {
            if let Err(e) = guard.release().await {
                warn!(%job_id, error = %e, "Cleanup after failed connect also failed.");
            }
            return Err(WorkerError::Connect { job_id, source });
        }

        let ctx = JobContext {
            job_id: job_id.clone(),
            agent_name: self.agent_name.clone(),
            room,
        };
        let mut handle = tokio::spawn(handler(ctx));
        let joined = tokio::select! {
            joined = &mut handle => Some(joined),
            _ = shutdown => None,
        };
        let status = match joined {
            Some(Ok(())) => JobStatus::Completed,
            Some(Err(e)) => {
                error!(%job_id, error = %e, "Job handler crashed.");
                JobStatus::Panicked
            }
            None => {
                info!(%job_id, "Shutdown requested; cancelling job.");
                handle.abort();
                // The handler must drop its session before the room goes away.
                let _ = handle.await;
                JobStatus::Cancelled
            }
        };

        if let Err(e) = guard.release().await {
            warn!(%job_id, error = %e, "Failed to disconnect after job.");
        }
        info!(%job_id, ?status, "Job finished.");
        Ok(status)
    }

    /// Serves jobs until the channel closes or `shutdown` resolves, then
    /// waits for running jobs. Shutdown cancels the running jobs.
    pub async fn run<S>(self: Arc<Self>, mut jobs: mpsc::Receiver<JobRequest>, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::pin!(shutdown);

        let mut running = JoinSet::new();
        let mut accepting = true;
        let mut stopping = false;
        while accepting || !running.is_empty() {
            tokio::select! {
                request = jobs.recv(), if accepting => {
                    let Some(request) = request else {
                        accepting = false;
                        continue;
                    };
                    info!(job_id = %request.job_id, room = %request.room.name(), "Dispatching job.");
                    let server = self.clone();
                    let mut stop = stop_rx.clone();
                    running.spawn(async move {
                        let stopped = async move {
                            let signalled = stop.wait_for(|stop| *stop).await.is_ok();
                            if !signalled {
                                pending::<()>().await;
                            }
                        };
                        if let Err(e) = server.run_job(request, stopped).await {
                            error!(error = %e, "Job could not be started.");
                        }
                    });
                }
                Some(_) = running.join_next(), if !running.is_empty() => {}
                _ = &mut shutdown, if !stopping => {
                    info!(running = running.len(), "Shutdown requested; stopping jobs.");
                    stopping = true;
                    accepting = false;
                    stop_tx.send_replace(true);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::testing::{FakeRoom, RoomCall};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn request(job_id: &str, room: Arc<FakeRoom>) -> JobRequest {
        JobRequest {
            job_id: job_id.to_string(),
            room,
            url: "wss://example".to_string(),
            token: SecretString::from("test-token".to_string()),
        }
    }

    #[tokio::test]
    async fn job_runs_between_connect_and_disconnect() {
        let mut server = AgentServer::new("test-agent");
        server.rtc_session(|ctx: JobContext| async move {
            assert!(ctx.room.is_connected());
            assert_eq!(ctx.agent_name, "test-agent");
            ctx.room
                .publish_data("lk.agent.session", ctx.job_id.clone())
                .await
                .unwrap();
        });

        let room = Arc::new(FakeRoom::new("exam-room"));
        let status = server
            .run_job(request("job-1", room.clone()), pending())
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Completed);
        assert_eq!(
            room.calls(),
            vec![
                RoomCall::Connect {
                    url: "wss://example".to_string()
                },
                RoomCall::Publish {
                    topic: "lk.agent.session".to_string(),
                    payload: "job-1".to_string()
                },
                RoomCall::Disconnect,
            ]
        );
    }

    #[tokio::test]
    async fn panicking_handler_does_not_escape() {
        let mut server = AgentServer::new("test-agent");
        server.rtc_session(|ctx: JobContext| async move {
            if !ctx.job_id.is_empty() {
                panic!("handler blew up");
            }
        });

        let room = Arc::new(FakeRoom::new("exam-room"));
        let status = server
            .run_job(request("job-1", room.clone()), pending())
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Panicked);
        assert_eq!(room.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn failed_connect_skips_handler_and_cleans_up() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let mut server = AgentServer::new("test-agent");
        server.rtc_session(move |_ctx: JobContext| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        let room = Arc::new(FakeRoom::failing_connect("exam-room", true));
        let err = server
            .run_job(request("job-1", room.clone()), pending())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Connect { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(room.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_handler_and_disconnects() {
        let mut server = AgentServer::new("test-agent");
        server.rtc_session(|ctx: JobContext| async move {
            ctx.room
                .publish_data("lk.agent.session", ctx.job_id.clone())
                .await
                .unwrap();
            pending::<()>().await;
        });

        let room = Arc::new(FakeRoom::new("exam-room"));
        let shutdown = tokio::time::sleep(Duration::from_secs(1));
        let status = server
            .run_job(request("job-1", room.clone()), shutdown)
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Cancelled);
        assert_eq!(room.disconnect_count(), 1);
        assert!(!room.is_connected());
    }

    #[tokio::test]
    async fn missing_handler_is_an_error() {
        let server = AgentServer::new("test-agent");
        let room = Arc::new(FakeRoom::new("exam-room"));
        assert!(matches!(
            server.run_job(request("job-1", room.clone()), pending()).await,
            Err(WorkerError::NoHandler)
        ));
        assert!(room.calls().is_empty());
    }

    #[tokio::test]
    async fn run_serves_every_job_until_channel_closes() {
        let handled = Arc::new(AtomicUsize::new(0));
        let counter = handled.clone();
        let mut server = AgentServer::new("test-agent");
        server.rtc_session(move |_ctx: JobContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let (tx, rx) = mpsc::channel(4);
        let rooms: Vec<_> = (0..3)
            .map(|i| Arc::new(FakeRoom::new(&format!("room-{i}"))))
            .collect();
        for (i, room) in rooms.iter().enumerate() {
            tx.send(request(&format!("job-{i}"), room.clone()))
                .await
                .unwrap();
        }
        drop(tx);

        Arc::new(server).run(rx, pending()).await;
        assert_eq!(handled.load(Ordering::SeqCst), 3);
        assert!(rooms.iter().all(|room| room.disconnect_count() == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_disconnects_every_running_job() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let mut server = AgentServer::new("test-agent");
        server.rtc_session(move |_ctx: JobContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                pending::<()>().await;
            }
        });

        let (tx, rx) = mpsc::channel(4);
        let rooms: Vec<_> = (0..2)
            .map(|i| Arc::new(FakeRoom::new(&format!("room-{i}"))))
            .collect();
        for (i, room) in rooms.iter().enumerate() {
            tx.send(request(&format!("job-{i}"), room.clone()))
                .await
                .unwrap();
        }

        let shutdown = tokio::time::sleep(Duration::from_secs(1));
        Arc::new(server).run(rx, shutdown).await;

        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert!(rooms.iter().all(|room| room.disconnect_count() == 1));
        assert!(tx.is_closed());
    }
}
