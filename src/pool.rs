//! Bounded worker pool that probes every target exactly once.

use crate::aggregator::{Aggregator, Tally};
use crate::config::{ProbeConfig, ProbeTarget};
use crate::error::{Error, Result};
use crate::probe::Probe;
use crate::report::Report;
use crate::result::ProbeResult;

use futures::future;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Targets not yet claimed by a worker.
type WorkQueue = Arc<Mutex<VecDeque<ProbeTarget>>>;

/// A fixed-size pool of probe workers.
///
/// Each worker repeatedly waits out its own inter-probe delay, claims the
/// next target from a shared queue, probes, and sends the result down a
/// channel. The channel closes once every worker has finished.
pub struct WorkerPool<P> {
    prober: Arc<P>,
    concurrency: usize,
    delay: Duration,
    cancel: CancellationToken,
}

impl<P: Probe + 'static> WorkerPool<P> {
    /// Create a pool with `concurrency` workers.
    pub fn new(prober: P, concurrency: usize, delay: Duration) -> Result<Self> {
        if concurrency < 1 {
            return Err(Error::InvalidConfiguration("concurrency must be at least 1".into()));
        }
        Ok(Self {
            prober: Arc::new(prober),
            concurrency,
            delay,
            cancel: CancellationToken::new(),
        })
    }

    /// Create a pool sized and throttled by a run configuration.
    pub fn from_config(prober: P, config: &ProbeConfig) -> Result<Self> {
        Self::new(prober, config.concurrency, config.delay)
    }

    /// Stop workers from claiming further targets once `cancel` fires.
    ///
    /// Probes already in flight still finish and report.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Start probing and stream results as they complete.
    ///
    /// The receiver yields `None` only after every worker has exited.
    pub fn spawn(&self, targets: Vec<ProbeTarget>) -> mpsc::UnboundedReceiver<ProbeResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        let workers = self.concurrency.min(targets.len());
        info!(
            "Probing {} proxies with {} workers, {:?} delay per worker",
            targets.len(),
            workers,
            self.delay
        );

        let queue: WorkQueue = Arc::new(Mutex::new(targets.into()));
        let mut handles = Vec::with_capacity(workers);

        for id in 0..workers {
            let worker = Worker {
                id,
                prober: Arc::clone(&self.prober),
                queue: Arc::clone(&queue),
                limiter: per_worker_limiter(self.delay),
                cancel: self.cancel.clone(),
                results: tx.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        drop(tx);

        tokio::spawn(async move {
            for joined in future::join_all(handles).await {
                if let Err(e) = joined {
                    warn!("Probe worker terminated abnormally: {}", e);
                }
            }
            debug!("All probe workers finished");
        });

        rx
    }

    /// Probe every target and return the results in completion order.
    pub async fn run(&self, targets: Vec<ProbeTarget>) -> Vec<ProbeResult> {
        let mut rx = self.spawn(targets);
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }

    /// Probe every target, folding results into a [`Report`] as they arrive.
    ///
    /// `observer` sees each result together with the running tally, which
    /// is enough to drive a progress indicator.
    pub async fn run_report<F>(&self, targets: Vec<ProbeTarget>, mut observer: F) -> Report
    where
        F: FnMut(&ProbeResult, &Tally),
    {
        let started = Instant::now();
        let mut aggregator = Aggregator::new();
        let mut rx = self.spawn(targets);

        while let Some(result) = rx.recv().await {
            aggregator.record(result);
            if let Some(last) = aggregator.last() {
                observer(last, &aggregator.tally());
            }
        }

        let report = aggregator.finish();
        info!(
            "Probe run completed in {:?}: {}/{} succeeded, average TTFB {}ms",
            started.elapsed(),
            report.success,
            report.total(),
            report.average_ttfb
        );
        report
    }
}

/// Paces a single worker; `None` when there is no delay.
fn per_worker_limiter(delay: Duration) -> Option<DefaultDirectRateLimiter> {
    Quota::with_period(delay).map(RateLimiter::direct)
}

struct Worker<P> {
    id: usize,
    prober: Arc<P>,
    queue: WorkQueue,
    limiter: Option<DefaultDirectRateLimiter>,
    cancel: CancellationToken,
    results: mpsc::UnboundedSender<ProbeResult>,
}

impl<P: Probe> Worker<P> {
    async fn run(self) {
        let mut probed = 0usize;
        loop {
            if self.cancel.is_cancelled() {
                debug!("Worker {} cancelled after {} probes", self.id, probed);
                break;
            }

            if self.queue.lock().is_empty() {
                break;
            }

            // Pace before claiming so a target never waits on a busy worker.
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
                if self.cancel.is_cancelled() {
                    debug!("Worker {} cancelled after {} probes", self.id, probed);
                    break;
                }
            }

            // The guard is dropped before any await.
            let next = self.queue.lock().pop_front();
            let Some(target) = next else { break };

            let result = self.prober.probe(&target).await;
            probed += 1;
            if self.results.send(result).is_err() {
                warn!("Worker {}: result receiver dropped, stopping", self.id);
                break;
            }
        }
        debug!("Worker {} done after {} probes", self.id, probed);
    }
}
