use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// HTTP 200.
    Accepted,
    /// Any other status.
    Rejected,
    /// No response at all.
    Failed,
}

#[derive(Debug, Default)]
pub struct Tally {
    attempted: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    per_file: DashMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub attempted: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
    pub per_file: BTreeMap<String, u64>,
    /// Requests per user that finished normally.
    pub per_user: BTreeMap<String, u64>,
    pub workers: usize,
    pub faulted_workers: usize,
    pub elapsed: Duration,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, file: &str, outcome: Outcome) {
        self.attempted.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Accepted => &self.accepted,
            Outcome::Rejected => &self.rejected,
            Outcome::Failed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        *self.per_file.entry(file.to_string()).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> Report {
        Report {
            attempted: self.attempted.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            per_file: self
                .per_file
                .iter()
                .map(|entry| (entry.key().clone(), *entry.value()))
                .collect(),
            ..Report::default()
        }
    }
}

impl Report {
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            return 0.0;
        }
        self.accepted as f64 / self.attempted as f64 * 100.0
    }

    pub fn log_summary(&self) {
        info!("=== Simulation results ===");
        info!("Users: {} ({} ended early on errors)", self.workers, self.faulted_workers);
        info!("Total requests: {}", self.attempted);
        info!("Accepted: {}", self.accepted);
        info!("Rejected: {}", self.rejected);
        info!("Failed: {}", self.failed);
        info!("Duration: {:.2}s", self.elapsed.as_secs_f64());
        info!("Success rate: {:.2}%", self.success_rate());
        for (file, hits) in &self.per_file {
            info!("  {}: {} requests", file, hits);
        }
    }
}

pub type SharedTally = Arc<Tally>;
