//! Blocking-work bridge between tool bodies and the session event loop
//!
//! Tool dispatch runs off the event loop because tool bodies may block on
//! arbitrary I/O. The worker still needs results from event-loop-owned
//! state, so the bridge is a rendezvous: the worker sends the call over a
//! channel to the session's dispatch task and blocks on a oneshot reply.
//! The worker never blocks on the loop itself, so a loop that is busy
//! queueing more work cannot deadlock against its own workers.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot};

use crate::session::Session;
use crate::tools::handler::{FunctionCallPayload, UnifiedToolHandler};
use crate::tools::types::ActionResponse;
use crate::{Error, Result};

/// Bounded pool for blocking dispatch-and-branch work
///
/// Jobs run on the tokio blocking pool; the semaphore caps how many are in
/// flight at once. `submit` applies backpressure by waiting for a permit.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool allowing `capacity` concurrent jobs
    #[must_use]
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Maximum number of concurrent jobs
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run a blocking job once a permit is available
    ///
    /// # Errors
    ///
    /// Returns an error if the pool has been shut down.
    pub async fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| Error::Dispatch("worker pool closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job();
        });

        Ok(())
    }
}

/// A function call waiting for the session's dispatch task
pub struct DispatchJob {
    /// The call to execute
    pub call: FunctionCallPayload,
    /// Where the result goes; dropped if the worker gave up
    pub reply: oneshot::Sender<ActionResponse>,
}

/// Worker-side handle for the rendezvous
#[derive(Clone)]
pub struct DispatchBridge {
    tx: mpsc::Sender<DispatchJob>,
}

impl DispatchBridge {
    /// Create a bridge and the job receiver its dispatch task drains
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<DispatchJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Send a call to the dispatch task and block until it completes
    ///
    /// Exactly one round trip per call. Must be called from a blocking
    /// context (a [`WorkerPool`] job), never from the event loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatch task is gone.
    pub fn dispatch_blocking(&self, call: FunctionCallPayload) -> Result<ActionResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .blocking_send(DispatchJob { call, reply })
            .map_err(|_| Error::Dispatch("dispatch task stopped".to_string()))?;
        rx.blocking_recv()
            .map_err(|_| Error::Dispatch("dispatch task dropped the reply".to_string()))
    }
}

/// Drive a session's dispatch task until the bridge side closes
///
/// Runs on the session event loop; each job is executed to completion
/// before the next is taken, preserving dialogue ordering within a session.
pub async fn run_dispatch_loop(
    session: Arc<Session>,
    handler: Arc<UnifiedToolHandler>,
    mut jobs: mpsc::Receiver<DispatchJob>,
) {
    while let Some(job) = jobs.recv().await {
        let response = handler.handle_llm_function_call(&session, job.call).await;
        if job.reply.send(response).is_err() {
            tracing::debug!(session_id = %session.id(), "dispatch reply receiver dropped");
        }
    }
    tracing::debug!(session_id = %session.id(), "dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::handler::FunctionCallItem;
    use crate::tools::types::Action;

    fn call(name: &str) -> FunctionCallPayload {
        FunctionCallPayload::Single(FunctionCallItem {
            name: name.to_string(),
            id: Some("call_1".to_string()),
            arguments: None,
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rendezvous_round_trip() {
        let (bridge, mut jobs) = DispatchBridge::channel(4);

        // Stand-in dispatch task replying with a canned response
        tokio::spawn(async move {
            while let Some(job) = jobs.recv().await {
                let _ = job.reply.send(ActionResponse::respond("done"));
            }
        });

        let result = tokio::task::spawn_blocking(move || {
            bridge.dispatch_blocking(call("get_time")).unwrap()
        })
        .await
        .unwrap();

        assert_eq!(result.action, Action::Response);
        assert_eq!(result.response.as_deref(), Some("done"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dispatch_fails_when_task_gone() {
        let (bridge, jobs) = DispatchBridge::channel(1);
        drop(jobs);

        let err = tokio::task::spawn_blocking(move || bridge.dispatch_blocking(call("x")))
            .await
            .unwrap();
        assert!(err.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_worker_pool_runs_jobs() {
        let pool = WorkerPool::new(2);
        assert_eq!(pool.capacity(), 2);

        let (tx, mut rx) = mpsc::unbounded_channel();
        for i in 0..4 {
            let tx = tx.clone();
            pool.submit(move || {
                let _ = tx.send(i);
            })
            .await
            .unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(rx.recv().await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }
}
