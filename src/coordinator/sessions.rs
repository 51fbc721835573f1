use crate::bus::SessionId;
use rustc_hash::FxHashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    opened_at: Instant,
    last_seen: Instant,
    heartbeats: u64,
}

/// Popup instances the coordinator currently holds resources for.
///
/// A popup that stops heart-beating for longer than the idle timeout is treated as
/// gone, whether or not it said goodbye.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<FxHashMap<SessionId, SessionEntry>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(FxHashMap::default()),
            idle_timeout,
        }
    }

    pub async fn open(&self, id: SessionId) {
        let now = Instant::now();
        self.sessions.lock().await.insert(
            id,
            SessionEntry {
                opened_at: now,
                last_seen: now,
                heartbeats: 0,
            },
        );
        info!("Popup session {} opened", id.0);
    }

    /// Records a heartbeat. A session reaped earlier comes back to life.
    pub async fn touch(&self, id: SessionId) {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(&id) {
            Some(entry) => {
                entry.last_seen = now;
                entry.heartbeats += 1;
            }
            None => {
                debug!("Heartbeat from unknown popup session {}; re-registering", id.0);
                sessions.insert(
                    id,
                    SessionEntry {
                        opened_at: now,
                        last_seen: now,
                        heartbeats: 1,
                    },
                );
            }
        }
    }

    pub async fn close(&self, id: SessionId) -> bool {
        let removed = self.sessions.lock().await.remove(&id);
        if let Some(entry) = removed {
            info!(
                "Popup session {} closed after {:?} ({} heartbeats)",
                id.0,
                entry.opened_at.elapsed(),
                entry.heartbeats
            );
        }
        removed.is_some()
    }

    /// Drops sessions idle for longer than the timeout as of `now`.
    pub async fn reap(&self, now: Instant) -> Vec<SessionId> {
        let mut sessions = self.sessions.lock().await;
        let stale: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, e)| now.saturating_duration_since(e.last_seen) > self.idle_timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            sessions.remove(id);
            info!("Popup session {} vanished without closing; released", id.0);
        }
        stale
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
