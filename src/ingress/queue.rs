use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::ViewOutcome;
use crate::error::{Error, Result};
use crate::state::AppState;

use super::{process_view, IngestRequest};

#[derive(Debug)]
pub struct IngestJob {
    pub request: IngestRequest,
    pub received_at: DateTime<Utc>,
}

/// Receiving half of the queue, handed to `IngestQueue::spawn_workers`.
pub struct IngestJobs(mpsc::Receiver<IngestJob>);

/// Bounded hand-off between the HTTP boundary and the ingestion workers.
///
/// Clones share one channel. `shutdown` closes it for every clone.
#[derive(Clone)]
pub struct IngestQueue {
    sender: Arc<RwLock<Option<mpsc::Sender<IngestJob>>>>,
    workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl IngestQueue {
    pub fn bounded(capacity: usize) -> (Self, IngestJobs) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender: Arc::new(RwLock::new(Some(sender))),
            workers: Arc::new(Mutex::new(Vec::new())),
        };
        (queue, IngestJobs(receiver))
    }

    /// Starts `state.settings.ingest_workers` workers (at least one) draining `jobs`.
    pub async fn spawn_workers(&self, state: AppState, jobs: IngestJobs) {
        let count = state.settings.ingest_workers.max(1);
        let receiver = Arc::new(Mutex::new(jobs.0));

        let mut workers = self.workers.lock().await;
        for worker in 0..count {
            workers.push(tokio::spawn(run_worker(
                worker,
                state.clone(),
                receiver.clone(),
            )));
        }

        info!("Started {} ingest workers", count);
    }

    /// Enqueues a job without waiting. Returns `Ok(false)` when the queue is
    /// full and the job was dropped.
    pub async fn submit(&self, request: IngestRequest, received_at: DateTime<Utc>) -> Result<bool> {
        let guard = self.sender.read().await;
        let sender = guard.as_ref().ok_or(Error::QueueClosed)?;

        match sender.try_send(IngestJob {
            request,
            received_at,
        }) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(job)) => {
                warn!(
                    "Ingest queue full, dropping view for {:?} {:?}",
                    job.request.page_type, job.request.resource_id
                );
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => Err(Error::QueueClosed),
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.sender.read().await.is_none()
    }

    /// Closes the queue and waits until the workers have drained it.
    pub async fn shutdown(&self) {
        self.sender.write().await.take();

        let handles = std::mem::take(&mut *self.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Ingest worker ended abnormally: {}", e);
            }
        }

        info!("Ingest queue drained");
    }
}

async fn run_worker(worker: usize, state: AppState, jobs: Arc<Mutex<mpsc::Receiver<IngestJob>>>) {
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        // Each job runs in its own task so a panic only loses that job.
        let task_state = state.clone();
        let handle = tokio::spawn(async move {
            process_view(&task_state, job.request, job.received_at).await
        });

        match handle.await {
            Ok(Ok(ViewOutcome::Recorded(id))) => debug!("Worker {} recorded view {}", worker, id),
            Ok(Ok(ViewOutcome::Duplicate)) => debug!("Worker {} skipped duplicate view", worker),
            Ok(Err(e)) => error!("Ingest job failed: {}", e),
            Err(e) => error!("Ingest job panicked: {}", e),
        }
    }

    debug!("Ingest worker {} stopped", worker);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_queue_drops_job() {
        let (queue, _jobs) = IngestQueue::bounded(1);

        assert!(queue
            .submit(IngestRequest::default(), Utc::now())
            .await
            .unwrap());
        assert!(!queue
            .submit(IngestRequest::default(), Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let (queue, _jobs) = IngestQueue::bounded(4);
        queue.shutdown().await;

        assert!(queue.is_closed().await);
        let result = queue.submit(IngestRequest::default(), Utc::now()).await;
        assert!(matches!(result, Err(Error::QueueClosed)));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (queue, _jobs) = IngestQueue::bounded(0);
        assert!(queue
            .submit(IngestRequest::default(), Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let (queue, mut jobs) = IngestQueue::bounded(4);
        let clone = queue.clone();

        clone
            .submit(
                IngestRequest {
                    resource_id: Some(3),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let job = jobs.0.recv().await.unwrap();
        assert_eq!(job.request.resource_id, Some(3));

        queue.shutdown().await;
        assert!(clone.is_closed().await);
    }
}
