//! Bounded worker pool for search requests.
//!
//! A fixed set of worker threads serves queries end to end; requests queue
//! on a bounded channel. A full queue surfaces `Overloaded` immediately,
//! and a reply that misses the hard time budget surfaces `Timeout`; the
//! in-flight scan is bounded and allowed to finish, its reply simply lands
//! in a dropped receiver.

use super::{SearchEngine, SearchResponse};
use crate::config::RuntimeConfig;
use crate::error::SearchError;
use crate::filters::FilterSpec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

struct Job {
    query: String,
    filters: FilterSpec,
    limit: usize,
    offset: usize,
    reply: SyncSender<Result<SearchResponse, SearchError>>,
}

/// Pool statistics counters.
#[derive(Debug, Default)]
pub struct PoolStats {
    pub completed: AtomicU64,
    pub rejected: AtomicU64,
    pub timed_out: AtomicU64,
}

/// Fixed worker pool in front of a [`SearchEngine`].
pub struct SearchPool {
    tx: Option<SyncSender<Job>>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
    hard_timeout: Duration,
}

impl SearchPool {
    pub fn new(engine: Arc<SearchEngine>, runtime: &RuntimeConfig) -> Self {
        let (tx, rx) = mpsc::sync_channel::<Job>(runtime.max_queued_requests.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let stats = Arc::new(PoolStats::default());

        let worker_count = runtime.search_workers.max(1);
        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let engine = engine.clone();
            let rx = rx.clone();
            let stats = stats.clone();
            workers.push(thread::spawn(move || {
                worker_loop(worker_id, engine, rx, stats)
            }));
        }

        info!(workers = worker_count, queue = runtime.max_queued_requests, "search pool started");
        Self {
            tx: Some(tx),
            workers,
            stats,
            hard_timeout: Duration::from_millis(runtime.hard_timeout_ms),
        }
    }

    /// Queues a search and waits for the reply within the hard budget.
    pub fn search(
        &self,
        query: &str,
        filters: &FilterSpec,
        limit: usize,
        offset: usize,
    ) -> Result<SearchResponse, SearchError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job = Job {
            query: query.to_string(),
            filters: filters.clone(),
            limit,
            offset,
            reply: reply_tx,
        };

        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| SearchError::IndexUnavailable("search pool stopped".into()))?;
        match tx.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(SearchError::Overloaded);
            }
            Err(TrySendError::Disconnected(_)) => {
                return Err(SearchError::IndexUnavailable("search pool stopped".into()));
            }
        }

        match reply_rx.recv_timeout(self.hard_timeout) {
            Ok(result) => result,
            Err(_) => {
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                Err(SearchError::Timeout {
                    budget_ms: self.hard_timeout.as_millis() as u64,
                })
            }
        }
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }
}

impl Drop for SearchPool {
    fn drop(&mut self) {
        // Closing the channel ends the worker loops
        self.tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    worker_id: usize,
    engine: Arc<SearchEngine>,
    rx: Arc<Mutex<Receiver<Job>>>,
    stats: Arc<PoolStats>,
) {
    loop {
        let job = {
            let guard = match rx.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.recv()
        };
        let Ok(job) = job else {
            debug!(worker_id, "search worker stopping");
            return;
        };

        let result = engine.search(&job.query, &job.filters, job.limit, job.offset);
        stats.completed.fetch_add(1, Ordering::Relaxed);
        // The caller may have timed out and dropped the receiver
        let _ = job.reply.send(result);
    }
}
