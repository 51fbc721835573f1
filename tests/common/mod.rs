#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use filter_sync::bus::TabId;
use filter_sync::config::Config;
use filter_sync::coordinator::BackgroundCoordinator;
use filter_sync::engine::Profile;
use filter_sync::gateway::{
    MemoryGateway, PersistenceGateway, PROFILES_KEY, SESSION_KEY, USER_KEY,
};
use filter_sync::init::Runtime;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.coordinator.request_timeout_ms = 500;
    config.coordinator.agent_timeout_ms = 100;
    config.coordinator.popup_idle_timeout_ms = 5000;
    config.coordinator.reap_interval_ms = 50;
    config.heartbeat.ping_interval_ms = 20;
    config.heartbeat.stats_interval_ms = 30;
    config.stats.enable = false;
    config
}

pub fn profile(name: &str, websites: &[&str], is_default: bool, is_enabled: bool) -> Profile {
    Profile {
        name: name.to_string(),
        colour: "#ff9823".to_string(),
        whitelist_tags: BTreeSet::new(),
        blacklist_tags: BTreeSet::new(),
        allowed_websites: websites.iter().map(|w| w.to_string()).collect(),
        is_enabled,
        is_default,
    }
}

pub fn seeded_gateway(profiles: &[Profile]) -> Arc<MemoryGateway> {
    let mut items = Map::new();
    items.insert(PROFILES_KEY.to_string(), json!(profiles));
    Arc::new(MemoryGateway::with_data(items))
}

/// Storage with a signed-in user of the given tier ("free" or "premium").
pub fn signed_in_gateway(tier: &str) -> Arc<MemoryGateway> {
    let mut items = Map::new();
    items.insert(SESSION_KEY.to_string(), json!("token"));
    items.insert(
        USER_KEY.to_string(),
        json!({"id": "u1", "email": "a@example.com", "tier": tier}),
    );
    Arc::new(MemoryGateway::with_data(items))
}

/// In-memory storage whose writes take `delay` to land.
pub struct SlowGateway {
    inner: MemoryGateway,
    delay: Duration,
}

impl SlowGateway {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryGateway::new(),
            delay,
        })
    }
}

#[async_trait]
impl PersistenceGateway for SlowGateway {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        self.inner.get(keys).await
    }

    async fn set(&self, items: Map<String, Value>) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.set(items).await
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        self.inner.remove(keys).await
    }
}

pub async fn launch(config: Config, gateway: Arc<MemoryGateway>) -> Runtime {
    Runtime::launch(config, gateway).await.unwrap()
}

pub async fn persisted_profiles(gateway: &MemoryGateway) -> Vec<Profile> {
    match gateway.value(PROFILES_KEY).await {
        Some(value) => serde_json::from_value::<Vec<Profile>>(value).unwrap(),
        None => Vec::new(),
    }
}

pub fn find<'a>(profiles: &'a [Profile], name: &str) -> &'a Profile {
    profiles.iter().find(|p| p.name == name).unwrap()
}

/// Waits until the coordinator has heard `AgentReady` from `tab`.
pub async fn wait_for_agent(coordinator: &BackgroundCoordinator, tab: TabId) {
    for _ in 0..100 {
        if coordinator.known_agents().await.contains(&tab) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("agent in tab {} never registered", tab.0);
}
