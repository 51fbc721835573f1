use super::client::CoordinatorClient;
use super::view::SharedView;
use crate::config::HeartbeatConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct TickCounters {
    pings_ok: AtomicU64,
    pings_failed: AtomicU64,
    stats_ok: AtomicU64,
    stats_failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatTicks {
    pub pings_ok: u64,
    pub pings_failed: u64,
    pub stats_ok: u64,
    pub stats_failed: u64,
}

/// Keeps the popup session alive and the block counter fresh while the popup is open.
///
/// Failed ticks are logged and the next tick runs on schedule.
pub struct HeartbeatMonitor {
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    counters: Arc<TickCounters>,
}

impl HeartbeatMonitor {
    pub fn start(client: CoordinatorClient, view: SharedView, config: &HeartbeatConfig) -> Self {
        let shutdown = CancellationToken::new();
        let counters = Arc::new(TickCounters::default());

        let ping = {
            let client = client.clone();
            let counters = counters.clone();
            spawn_ticker(shutdown.clone(), config.ping_interval(), move || {
                let client = client.clone();
                let counters = counters.clone();
                async move {
                    match client.heartbeat().await {
                        Ok(()) => {
                            counters.pings_ok.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            counters.pings_failed.fetch_add(1, Ordering::Relaxed);
                            warn!("Heartbeat for session {} failed: {}", client.session().0, e);
                        }
                    }
                }
            })
        };

        let stats = {
            let counters = counters.clone();
            spawn_ticker(shutdown.clone(), config.stats_interval(), move || {
                let client = client.clone();
                let view = view.clone();
                let counters = counters.clone();
                async move {
                    match client.block_stats().await {
                        Ok(stats) => {
                            counters.stats_ok.fetch_add(1, Ordering::Relaxed);
                            view.write().await.merge_stats(stats);
                        }
                        Err(e) => {
                            counters.stats_failed.fetch_add(1, Ordering::Relaxed);
                            warn!("Stats refresh failed: {}", e);
                        }
                    }
                }
            })
        };

        Self {
            shutdown,
            tasks: vec![ping, stats],
            counters,
        }
    }

    pub fn ticks(&self) -> HeartbeatTicks {
        HeartbeatTicks {
            pings_ok: self.counters.pings_ok.load(Ordering::Relaxed),
            pings_failed: self.counters.pings_failed.load(Ordering::Relaxed),
            stats_ok: self.counters.stats_ok.load(Ordering::Relaxed),
            stats_failed: self.counters.stats_failed.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Cancels both tasks and waits for them to finish.
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
        debug!("Heartbeat stopped");
    }
}

impl Drop for HeartbeatMonitor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn spawn_ticker<F, Fut>(token: CancellationToken, period: Duration, mut tick: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = time::interval(period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tick() => {}
                    }
                }
            }
        }
    })
}
