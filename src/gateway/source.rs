use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Persisted keys.
pub const PROFILES_KEY: &str = "profiles";
pub const SETTINGS_KEY: &str = "settings";
pub const USER_KEY: &str = "user";
pub const SESSION_KEY: &str = "session";

/// Durable key/value storage shared across restarts.
///
/// No multi-key transactions: callers that need several keys to agree write
/// them in a single `set`.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Values for the keys that exist; absent keys are simply missing from the map.
    async fn get(&self, keys: &[&str]) -> Result<Map<String, Value>>;
    async fn set(&self, items: Map<String, Value>) -> Result<()>;
    async fn remove(&self, keys: &[&str]) -> Result<()>;
}
