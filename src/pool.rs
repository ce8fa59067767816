//! Off-thread diff computation.
//!
//! Requests carry a caller-chosen `id`; each accepted request produces exactly
//! one [`DiffResponse`] with the same `id` on the pool's result channel.
//! Responses arrive in completion order, not submission order.

use crate::diff::{DiffOptions, DiffResult, compute_diff};
use crate::error::DiffError;
use crate::streaming::StreamingProcessor;
use log::{debug, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::num::NonZeroUsize;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRequest {
    pub id: u64,
    pub old_text: String,
    pub new_text: String,
    pub options: DiffOptions,
}

impl DiffRequest {
    fn run(self) -> DiffResponse {
        DiffResponse {
            id: self.id,
            result: compute_diff(&self.old_text, &self.new_text, &self.options),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffResponse {
    pub id: u64,
    pub result: Result<DiffResult, DiffError>,
}

/// A fixed-size set of worker threads with a shared result channel.
pub struct DiffPool {
    pool: Option<ThreadPool>,
    size: usize,
    pending: usize,
    tx: Sender<DiffResponse>,
    rx: Receiver<DiffResponse>,
}

fn available_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

impl DiffPool {
    /// Spawns `requested` workers, capped at the machine's available
    /// parallelism. `None` uses all of it.
    pub fn new(requested: Option<usize>) -> Result<Self, DiffError> {
        let available = available_workers();
        let size = requested.unwrap_or(available).clamp(1, available);
        let pool = ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|i| format!("diff-worker-{i}"))
            .build()
            .map_err(|e| DiffError::Pool(e.to_string()))?;
        let (tx, rx) = mpsc::channel();
        debug!("diff pool started with {size} workers");

        Ok(Self {
            pool: Some(pool),
            size,
            pending: 0,
            tx,
            rx,
        })
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Responses submitted but not yet collected by `poll` or `wait`.
    #[inline]
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
    }

    #[inline]
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.pool.is_none()
    }

    fn workers(&self) -> Result<&ThreadPool, DiffError> {
        self.pool
            .as_ref()
            .ok_or_else(|| DiffError::invalid_state("pool has been shut down"))
    }

    /// Queues a request; its response is collected with [`Self::poll`] or [`Self::wait`].
    pub fn submit(&mut self, request: DiffRequest) -> Result<(), DiffError> {
        let tx = self.tx.clone();
        self.workers()?.spawn(move || {
            let response = request.run();
            if tx.send(response).is_err() {
                warn!("diff pool dropped before a response could be delivered");
            }
        });
        self.pending += 1;
        Ok(())
    }

    /// Finalizes an accumulated stream on a worker, answering under `id`.
    pub fn submit_streaming(
        &mut self,
        id: u64,
        mut processor: StreamingProcessor,
    ) -> Result<(), DiffError> {
        let tx = self.tx.clone();
        self.workers()?.spawn(move || {
            let result = processor.finalize();
            if tx.send(DiffResponse { id, result }).is_err() {
                warn!("diff pool dropped before a response could be delivered");
            }
        });
        self.pending += 1;
        Ok(())
    }

    /// Drains every response that is ready without blocking.
    pub fn poll(&mut self) -> Vec<DiffResponse> {
        let mut ready = Vec::new();
        while let Ok(response) = self.rx.try_recv() {
            ready.push(response);
        }
        self.pending -= ready.len();
        ready
    }

    /// Blocks until the next response arrives.
    ///
    /// Fails instead of blocking forever when nothing is in flight.
    pub fn wait(&mut self) -> Result<DiffResponse, DiffError> {
        if self.pending == 0 {
            return Err(DiffError::invalid_state("no requests in flight"));
        }
        let response = self
            .rx
            .recv()
            .map_err(|e| DiffError::Pool(e.to_string()))?;
        self.pending -= 1;
        Ok(response)
    }

    /// Runs `requests` across the workers and returns responses in request order.
    ///
    /// Bypasses the result channel, so it does not affect [`Self::pending`].
    pub fn compute_batch(&self, requests: Vec<DiffRequest>) -> Result<Vec<DiffResponse>, DiffError> {
        let workers = self.workers()?;
        let count = requests.len();
        let responses = workers.install(|| {
            requests
                .into_par_iter()
                .map(DiffRequest::run)
                .collect::<Vec<_>>()
        });
        debug!("diff pool computed a batch of {count}");
        Ok(responses)
    }

    /// Stops accepting work. Requests already queued still complete and can
    /// be collected.
    pub fn shutdown(&mut self) {
        if self.pool.take().is_some() {
            debug!("diff pool shut down with {} pending", self.pending);
        }
    }
}
