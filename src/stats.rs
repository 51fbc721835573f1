use crate::config::StatsConfig;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::{self, Duration};
use tracing::info;

/// Counters the popup polls. They never decrease while the coordinator runs and
/// start from zero on every launch; nothing here is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockStats {
    pub blocked_today: u64,
    pub total_blocked: u64,
}

#[derive(Debug)]
pub struct StatsCollector {
    blocked_today: AtomicU64,
    total_blocked: AtomicU64,
    reports: AtomicU64,

    log_interval: Duration,
}

impl StatsCollector {
    /// Starts at zero and spawns the periodic dump when enabled.
    pub fn new(config: &StatsConfig) -> Arc<Self> {
        let stats = Arc::new(Self {
            blocked_today: AtomicU64::new(0),
            total_blocked: AtomicU64::new(0),
            reports: AtomicU64::new(0),
            log_interval: Duration::from_secs(config.log_interval_seconds.max(1)),
        });

        if config.enable {
            // Ends once the collector is dropped
            let weak = Arc::downgrade(&stats);
            let log_interval = stats.log_interval;
            tokio::spawn(async move {
                let mut interval = time::interval(log_interval);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    match weak.upgrade() {
                        Some(stats) => stats.dump_stats(),
                        None => break,
                    }
                }
            });
        }

        stats
    }

    pub fn record_blocked(&self, count: u64) {
        self.blocked_today.fetch_add(count, Ordering::Relaxed);
        self.total_blocked.fetch_add(count, Ordering::Relaxed);
        self.reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BlockStats {
        BlockStats {
            blocked_today: self.blocked_today.load(Ordering::Relaxed),
            total_blocked: self.total_blocked.load(Ordering::Relaxed),
        }
    }

    fn dump_stats(&self) {
        let snapshot = self.snapshot();
        let reports = self.reports.load(Ordering::Relaxed);
        info!(
            "STATS DUMP: BlockedToday: {}, TotalBlocked: {}, Reports: {}",
            snapshot.blocked_today, snapshot.total_blocked, reports
        );
    }
}
