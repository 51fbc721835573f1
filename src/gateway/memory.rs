use super::source::PersistenceGateway;
use anyhow::{bail, Result};
use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

/// In-memory gateway for embedding and tests. Writes can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    data: RwLock<FxHashMap<String, Value>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(items: Map<String, Value>) -> Self {
        Self {
            data: RwLock::new(items.into_iter().collect()),
            ..Self::default()
        }
    }

    /// While set, every `set`/`remove` fails and leaves the data untouched.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn value(&self, key: &str) -> Option<Value> {
        self.data.read().await.get(key).cloned()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>> {
        let data = self.data.read().await;
        Ok(keys
            .iter()
            .filter_map(|k| data.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, items: Map<String, Value>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("storage write rejected");
        }
        let mut data = self.data.write().await;
        data.extend(items);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("storage write rejected");
        }
        let mut data = self.data.write().await;
        for key in keys {
            data.remove(*key);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_set_remove() {
        let gateway = MemoryGateway::new();
        let mut items = Map::new();
        items.insert("a".to_string(), json!(1));
        items.insert("b".to_string(), json!({"x": true}));
        gateway.set(items).await.unwrap();

        let got = gateway.get(&["a", "missing"]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got["a"], json!(1));

        gateway.remove(&["a"]).await.unwrap();
        assert!(gateway.value("a").await.is_none());
        assert_eq!(gateway.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_data() {
        let mut items = Map::new();
        items.insert("a".to_string(), json!(1));
        let gateway = MemoryGateway::with_data(items);
        gateway.fail_writes(true);

        let mut update = Map::new();
        update.insert("a".to_string(), json!(2));
        assert!(gateway.set(update).await.is_err());
        assert!(gateway.remove(&["a"]).await.is_err());
        assert_eq!(gateway.value("a").await, Some(json!(1)));
        assert_eq!(gateway.write_count(), 0);
    }
}
