use super::source::{PersistenceGateway, SESSION_KEY, USER_KEY};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
}

/// Signed-in user as stored under the `user` key. Extra fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub tier: Tier,
}

impl User {
    pub fn is_premium(&self) -> bool {
        self.tier == Tier::Premium
    }
}

/// Read-only view of the identity collaborator. Sign-in itself happens elsewhere.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self) -> Result<Option<User>>;
    async fn sign_out(&self) -> Result<()>;
}

/// Identity backed by the persisted `user` and `session` records.
///
/// A user without a session counts as signed out. A record that doesn't parse is
/// an error; no placeholder user is ever substituted.
pub struct StoredIdentity {
    gateway: Arc<dyn PersistenceGateway>,
}

impl StoredIdentity {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl IdentityProvider for StoredIdentity {
    async fn current_user(&self) -> Result<Option<User>> {
        let mut stored = self.gateway.get(&[USER_KEY, SESSION_KEY]).await?;
        if stored.get(SESSION_KEY).map_or(true, |s| s.is_null()) {
            return Ok(None);
        }
        match stored.remove(USER_KEY) {
            Some(value) if !value.is_null() => {
                let user = serde_json::from_value(value).context("Malformed user record")?;
                Ok(Some(user))
            }
            _ => Ok(None),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        self.gateway.remove(&[USER_KEY, SESSION_KEY]).await?;
        info!("Signed out; identity records removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use serde_json::{json, Map};

    fn gateway_with(user: serde_json::Value, session: Option<serde_json::Value>) -> Arc<MemoryGateway> {
        let mut items = Map::new();
        items.insert(USER_KEY.to_string(), user);
        if let Some(session) = session {
            items.insert(SESSION_KEY.to_string(), session);
        }
        Arc::new(MemoryGateway::with_data(items))
    }

    #[tokio::test]
    async fn test_reads_user_with_session() {
        let gateway = gateway_with(
            json!({"id": "u1", "email": "a@b.c", "tier": "premium", "name": "A"}),
            Some(json!({"access_token": "t"})),
        );
        let identity = StoredIdentity::new(gateway);
        let user = identity.current_user().await.unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.is_premium());
    }

    #[tokio::test]
    async fn test_missing_session_is_signed_out() {
        let gateway = gateway_with(json!({"id": "u1", "email": "a@b.c"}), None);
        let identity = StoredIdentity::new(gateway);
        assert!(identity.current_user().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_user_is_an_error() {
        let gateway = gateway_with(json!({"email": 42}), Some(json!({})));
        let identity = StoredIdentity::new(gateway);
        assert!(identity.current_user().await.is_err());
    }

    #[tokio::test]
    async fn test_sign_out_removes_records() {
        let gateway = gateway_with(json!({"id": "u1", "email": "a@b.c"}), Some(json!({})));
        let identity = StoredIdentity::new(gateway.clone());
        identity.sign_out().await.unwrap();
        assert!(gateway.value(USER_KEY).await.is_none());
        assert!(identity.current_user().await.unwrap().is_none());
    }
}
