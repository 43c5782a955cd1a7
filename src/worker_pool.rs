// Fixed-size pool for heavy inference jobs. Admission is bounded so a burst
// of clients cannot queue unbounded work: `workers + queue_depth` requests
// may be in flight or waiting, anything beyond that is rejected immediately.

use crate::error::InferError;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct InferencePool {
    // workers + queue_depth permits; try_acquire at the door.
    admission: Arc<Semaphore>,
    // workers permits; acquired (FIFO) before the job runs.
    execution: Arc<Semaphore>,
}

impl InferencePool {
    pub fn new(workers: usize, queue_depth: usize) -> Self {
        Self {
            admission: Arc::new(Semaphore::new(workers + queue_depth)),
            execution: Arc::new(Semaphore::new(workers)),
        }
    }

    /// Run `job` on one of the pool's slots. Returns `InferError::Busy`
    /// without waiting when the admission queue is full; otherwise waits for
    /// a worker slot in submission order. Once started, a job runs to
    /// completion.
    pub async fn run<F, T>(&self, job: F) -> Result<T, InferError>
    where
        F: Future<Output = Result<T, InferError>>,
    {
        let _admitted = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| InferError::Busy)?;

        let _slot = self
            .execution
            .acquire()
            .await
            .map_err(|_| InferError::Inference("worker pool closed".to_string()))?;

        job.await
    }
}
