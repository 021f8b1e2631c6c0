//! Rolling-window timing stats per module, in the same spirit as the
//! teacher's command-timing metrics: keep a bounded window of recent
//! samples and derive mean/percentiles from it on demand rather than
//! maintaining running percentile estimators.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const WINDOW: usize = 256;

#[derive(Debug, Default, Clone, Copy)]
pub struct ModuleStats {
    pub count: u64,
    pub mean_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub max_ms: f64,
}

#[derive(Default)]
pub struct ModuleMetrics {
    samples: Mutex<VecDeque<f64>>,
    total_count: AtomicU64,
}

impl ModuleMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, duration: Duration) {
        let ms = duration.as_secs_f64() * 1000.0;
        let mut samples = self.samples.lock();
        if samples.len() == WINDOW {
            samples.pop_front();
        }
        samples.push_back(ms);
        self.total_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ModuleStats {
        let samples = self.samples.lock();
        if samples.is_empty() {
            return ModuleStats::default();
        }
        let mut sorted: Vec<f64> = samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
        ModuleStats {
            count: self.total_count.load(Ordering::Relaxed),
            mean_ms: mean,
            p50_ms: percentile(&sorted, 0.50),
            p95_ms: percentile(&sorted, 0.95),
            p99_ms: percentile(&sorted, 0.99),
            max_ms: *sorted.last().unwrap(),
        }
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
