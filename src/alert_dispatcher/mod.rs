//! AlertDispatcher - Asynchronous Alert Fan-out
//!
//! ## Responsibilities
//!
//! - Bounded queue of admitted events (drop newest on overflow)
//! - Worker pool; events sharing a tracking key keep their order
//! - Fan-out of each job to every sink with per-sink timeout and retry
//! - Drain on shutdown
//!
//! ## Design
//!
//! Each worker owns one lane. A job's lane is chosen by hashing its tracking
//! key, so same-key jobs are processed in submission order while different
//! keys proceed in parallel. The capacity bound is global across lanes.

pub mod sinks;
mod types;

pub use sinks::AlertSink;
pub use types::*;

use crate::error::{Error, Result};
use crate::models::{ConfirmedEvent, TrackingKey};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Default)]
struct DispatchCounters {
    depth: AtomicUsize,
    submitted: AtomicU64,
    dropped: AtomicU64,
    processed: AtomicU64,
    sink_failures: AtomicU64,
}

/// AlertDispatcher instance
pub struct AlertDispatcher {
    config: DispatcherConfig,
    /// `None` once shutdown has begun
    lanes: RwLock<Option<Vec<mpsc::UnboundedSender<DispatchJob>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<DispatchCounters>,
    sink_names: Vec<String>,
}

impl AlertDispatcher {
    /// Spawn the worker pool. Must be called within a tokio runtime.
    pub fn start(config: DispatcherConfig, sinks: Vec<Arc<dyn AlertSink>>) -> Arc<Self> {
        let worker_count = config.worker_count.max(1);
        let sinks = Arc::new(sinks);
        let counters = Arc::new(DispatchCounters::default());
        let sink_names = sinks.iter().map(|s| s.name().to_string()).collect::<Vec<_>>();

        let mut lanes = Vec::with_capacity(worker_count);
        let mut workers = Vec::with_capacity(worker_count);
        for lane in 0..worker_count {
            let (tx, rx) = mpsc::unbounded_channel();
            lanes.push(tx);
            workers.push(tokio::spawn(run_worker(
                lane,
                rx,
                sinks.clone(),
                counters.clone(),
                config.sink_timeout,
            )));
        }

        tracing::info!(
            workers = worker_count,
            queue_capacity = config.queue_capacity,
            sinks = ?sink_names,
            "AlertDispatcher started"
        );

        Arc::new(Self {
            config,
            lanes: RwLock::new(Some(lanes)),
            workers: Mutex::new(workers),
            counters,
            sink_names,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn sink_names(&self) -> &[String] {
        &self.sink_names
    }

    /// Enqueue an event without blocking. Returns false if it was dropped.
    pub fn submit(&self, event: ConfirmedEvent) -> bool {
        match self.try_submit(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Alert dropped");
                false
            }
        }
    }

    /// Enqueue an event, reporting why it was not accepted
    pub fn try_submit(&self, event: ConfirmedEvent) -> Result<()> {
        let guard = self.lanes.read();
        let Some(lanes) = guard.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(Error::ShuttingDown(format!("event {}", event.event_id)));
        };

        let capacity = self.config.queue_capacity;
        let reserved = self
            .counters
            .depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
                (depth < capacity).then_some(depth + 1)
            });
        if reserved.is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(Error::QueueFull(format!(
                "capacity {} reached, dropping {} ({})",
                capacity, event.kind, event.event_id
            )));
        }

        let lane = lane_for(&event.kind, lanes.len());
        let event_id = event.event_id;
        if lanes[lane].send(DispatchJob::new(event)).is_err() {
            self.counters.depth.fetch_sub(1, Ordering::SeqCst);
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return Err(Error::Internal(format!("dispatch lane {} closed", lane)));
        }

        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(event_id = %event_id, lane = lane, "Alert queued");
        Ok(())
    }

    /// Jobs waiting to be picked up by a worker
    pub fn depth(&self) -> usize {
        self.counters.depth.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            processed: self.counters.processed.load(Ordering::Relaxed),
            sink_failures: self.counters.sink_failures.load(Ordering::Relaxed),
            depth: self.depth(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.lanes.read().is_some()
    }

    /// Stop accepting jobs and wait for queued jobs to finish
    pub async fn shutdown(&self) {
        let lanes = self.lanes.write().take();
        if lanes.is_none() {
            return;
        }
        // closing the senders lets each worker drain and exit
        drop(lanes);

        let workers = std::mem::take(&mut *self.workers.lock());
        tracing::info!(pending = self.depth(), "AlertDispatcher draining");
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Dispatch worker panicked");
            }
        }

        let stats = self.stats();
        tracing::info!(
            processed = stats.processed,
            dropped = stats.dropped,
            sink_failures = stats.sink_failures,
            "AlertDispatcher stopped"
        );
    }
}

fn lane_for(key: &TrackingKey, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % lanes as u64) as usize
}

async fn run_worker(
    lane: usize,
    mut rx: mpsc::UnboundedReceiver<DispatchJob>,
    sinks: Arc<Vec<Arc<dyn AlertSink>>>,
    counters: Arc<DispatchCounters>,
    sink_timeout: Duration,
) {
    while let Some(job) = rx.recv().await {
        counters.depth.fetch_sub(1, Ordering::SeqCst);
        process_job(job, &sinks, &counters, sink_timeout).await;
        counters.processed.fetch_add(1, Ordering::Relaxed);
    }
    tracing::debug!(lane = lane, "Dispatch worker stopped");
}

async fn process_job(
    mut job: DispatchJob,
    sinks: &[Arc<dyn AlertSink>],
    counters: &DispatchCounters,
    sink_timeout: Duration,
) {
    let started = Instant::now();

    // Enrich sinks run in order; a stored image is visible to deliver sinks
    for sink in sinks.iter().filter(|s| s.phase() == SinkPhase::Enrich) {
        let (result, attempts) = run_sink(sink.as_ref(), &job, sink_timeout).await;
        job.attempts.insert(sink.name().to_string(), attempts);
        match result {
            Ok(SinkOutcome::Stored { reference }) => job.image = Some(reference),
            Ok(_) => {}
            Err(e) => record_failure(counters, sink.name(), &job, attempts, &e),
        }
    }

    let deliver: Vec<&dyn AlertSink> = sinks
        .iter()
        .filter(|s| s.phase() == SinkPhase::Deliver)
        .map(|s| s.as_ref())
        .collect();
    let results = futures::future::join_all(
        deliver
            .iter()
            .map(|sink| run_sink(*sink, &job, sink_timeout)),
    )
    .await;

    for (sink, (result, attempts)) in deliver.iter().zip(results) {
        job.attempts.insert(sink.name().to_string(), attempts);
        if let Err(e) = result {
            record_failure(counters, sink.name(), &job, attempts, &e);
        }
    }

    tracing::debug!(
        event_id = %job.event.event_id,
        key = %job.event.kind,
        image = ?job.image,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Alert dispatched"
    );
}

fn record_failure(
    counters: &DispatchCounters,
    sink: &str,
    job: &DispatchJob,
    attempts: u32,
    error: &Error,
) {
    counters.sink_failures.fetch_add(1, Ordering::Relaxed);
    tracing::error!(
        sink = %sink,
        event_id = %job.event.event_id,
        attempts = attempts,
        error = %error,
        "Sink delivery failed"
    );
}

/// Run one sink with its timeout and retry policy; returns the final result and attempt count
async fn run_sink(
    sink: &dyn AlertSink,
    job: &DispatchJob,
    default_timeout: Duration,
) -> (Result<SinkOutcome>, u32) {
    let policy = sink.retry_policy();
    let timeout = sink.timeout().unwrap_or(default_timeout);
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let result = match tokio::time::timeout(timeout, sink.deliver(job)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} exceeded {}ms",
                sink.name(),
                timeout.as_millis()
            ))),
        };

        match result {
            Ok(outcome) => return (Ok(outcome), attempt),
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    sink = %sink.name(),
                    event_id = %job.event.event_id,
                    attempt = attempt,
                    retry_in_ms = delay.as_millis() as u64,
                    error = %e,
                    "Sink attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}
