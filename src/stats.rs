//! Run counters and progress reporting.
//!
//! Counters are observational only: nothing in the pipeline branches on them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters for one localization run, shared by all workers.
#[derive(Debug)]
pub struct RunStats {
    started: Instant,
    total: usize,

    /// Documents fully handled (updated, skipped or failed)
    processed: AtomicUsize,
    /// Documents rewritten with a new entry
    updated: AtomicUsize,
    /// Documents whose pipeline returned an error
    failed: AtomicUsize,

    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    backend_calls: AtomicUsize,
    backend_failures: AtomicUsize,
}

impl RunStats {
    pub fn new(total: usize) -> Self {
        Self {
            started: Instant::now(),
            total,
            processed: AtomicUsize::new(0),
            updated: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            cache_misses: AtomicUsize::new(0),
            backend_calls: AtomicUsize::new(0),
            backend_failures: AtomicUsize::new(0),
        }
    }

    /// Record one finished document.
    pub fn record_document(&self, updated: bool) {
        if updated {
            self.updated.fetch_add(1, Ordering::Relaxed);
        }
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_call(&self) {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_failure(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn updated(&self) -> usize {
        self.updated.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> usize {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn backend_calls(&self) -> usize {
        self.backend_calls.load(Ordering::Relaxed)
    }

    pub fn backend_failures(&self) -> usize {
        self.backend_failures.load(Ordering::Relaxed)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Snapshot of progress with throughput and ETA.
    pub fn progress(&self) -> ProgressReport {
        ProgressReport::compute(self.processed(), self.total, self.updated(), self.elapsed())
    }
}

/// Point-in-time progress of a run.
#[derive(Debug, Clone)]
pub struct ProgressReport {
    pub processed: usize,
    pub total: usize,
    pub updated: usize,
    /// Percentage done (0-100)
    pub percent: f64,
    pub elapsed_secs: f64,
    /// Documents per second
    pub rate: f64,
    /// Estimated seconds remaining (0 when the rate is unknown)
    pub eta_secs: f64,
}

impl ProgressReport {
    fn compute(processed: usize, total: usize, updated: usize, elapsed: Duration) -> Self {
        let elapsed_secs = elapsed.as_secs_f64();
        let rate = if elapsed_secs > 0.0 {
            processed as f64 / elapsed_secs
        } else {
            0.0
        };
        let remaining = total.saturating_sub(processed);
        let eta_secs = if rate > 0.0 {
            remaining as f64 / rate
        } else {
            0.0
        };
        let percent = if total > 0 {
            (processed as f64 / total as f64) * 100.0
        } else {
            100.0
        };

        Self {
            processed,
            total,
            updated,
            percent,
            elapsed_secs,
            rate,
            eta_secs,
        }
    }
}

impl std::fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.1}% ({}/{}) Updated: {} | Speed: {:.1} files/s | ETA: {:.0}s",
            self.percent, self.processed, self.total, self.updated, self.rate, self.eta_secs
        )
    }
}
