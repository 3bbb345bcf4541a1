use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, instrument};

use crate::{PoolError, PoolResult};

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 15;

/// Configuration for a worker pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of items processed at the same time
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn validate(&self) -> PoolResult<()> {
        if self.workers == 0 {
            return Err(PoolError::invalid_config("workers must be at least 1"));
        }
        Ok(())
    }
}

/// Bounded pool of workers draining a shared FIFO queue.
///
/// Each worker pops the next item, runs the handler to completion and only
/// then pops again, so at most `workers` items are in flight. Items start in
/// submission order; completion order is whatever the handlers make it.
/// Results come back indexed by submission position.
pub struct WorkerPool {
    config: PoolConfig,
    in_flight: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Create a new pool
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Create a pool with `workers` workers and defaults otherwise
    pub fn with_workers(workers: usize) -> PoolResult<Self> {
        Self::new(PoolConfig::new().with_workers(workers))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of items currently being handled
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run `handler` over every item and collect the outputs in input order.
    ///
    /// A failing item is the handler's business: the handler's output is
    /// returned as-is and sibling items keep running. The first item whose
    /// handler panicked surfaces as a `PoolError`; use `run_each` to keep
    /// the other outputs.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, handler: F) -> PoolResult<Vec<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        self.run_each(items, handler).await.into_iter().collect()
    }

    /// Like `run`, but with one outcome per item.
    ///
    /// Each handler runs in its own task, so a panic is reported on that
    /// item only and every sibling output is kept.
    #[instrument(skip(self, items, handler), fields(items = items.len(), workers = self.config.workers))]
    pub async fn run_each<I, T, F, Fut>(&self, items: Vec<I>, handler: F) -> Vec<PoolResult<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Vec::new();
        }

        let queue: Arc<Mutex<VecDeque<(usize, I)>>> =
            Arc::new(Mutex::new(items.into_iter().enumerate().collect()));
        let handler = Arc::new(handler);
        let worker_count = self.config.workers.min(total);

        info!("Starting {} workers for {} items", worker_count, total);

        let mut handles: Vec<JoinHandle<Vec<(usize, PoolResult<T>)>>> = Vec::with_capacity(worker_count);
        for worker in 0..worker_count {
            let queue = queue.clone();
            let handler = handler.clone();
            let in_flight = self.in_flight.clone();

            handles.push(tokio::spawn(async move {
                let mut done = Vec::new();
                loop {
                    // The lock is released before the handler is awaited.
                    let next = queue.lock().pop_front();
                    let Some((index, item)) = next else {
                        break;
                    };

                    debug!(worker, index, "Worker picked up item");
                    in_flight.fetch_add(1, Ordering::SeqCst);
                    let output = tokio::spawn(handler(item))
                        .await
                        .map_err(|e| item_failure(index, e));
                    in_flight.fetch_sub(1, Ordering::SeqCst);

                    if let Err(e) = &output {
                        error!(worker, index, "Item handler failed: {}", e);
                    }
                    done.push((index, output));
                }
                debug!(worker, handled = done.len(), "Worker drained queue");
                done
            }));
        }

        let mut slots: Vec<Option<PoolResult<T>>> = (0..total).map(|_| None).collect();
        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(done) => {
                    for (index, output) in done {
                        slots[index] = Some(output);
                    }
                }
                Err(e) => {
                    error!("Worker pool failure: {}", worker_failure(worker, e));
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or(Err(PoolError::MissingResult { index })))
            .collect()
    }
}

fn panic_reason(err: JoinError) -> String {
    let payload = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn item_failure(index: usize, err: JoinError) -> PoolError {
    if err.is_cancelled() {
        return PoolError::ItemCancelled { index };
    }
    PoolError::ItemPanicked {
        index,
        reason: panic_reason(err),
    }
}

fn worker_failure(worker: usize, err: JoinError) -> PoolError {
    if err.is_cancelled() {
        return PoolError::WorkerCancelled { worker };
    }
    PoolError::WorkerPanicked {
        worker,
        reason: panic_reason(err),
    }
}
