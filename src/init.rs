//! Startup wiring: logging and the in-process set of contexts.

use crate::agent::PageAgent;
use crate::bus::{Endpoint, Listener, MessageBus, Request, SessionId, TabId};
use crate::config::Config;
use crate::coordinator::{BackgroundCoordinator, CoordinatorHandle};
use crate::error::{BusError, ClientError};
use crate::gateway::{PersistenceGateway, StoredIdentity};
use crate::popup::PopupSession;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Sets up the tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn setup_logging(config: &Config) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    // A subscriber may already be installed (tests, embedding); keep that one
    let _ = if config.logging.format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// The coordinator plus the bus every other context attaches to.
pub struct Runtime {
    config: Config,
    bus: MessageBus,
    handle: CoordinatorHandle,
}

impl Runtime {
    /// Loads persisted state and starts the coordinator.
    pub async fn launch(config: Config, gateway: Arc<dyn PersistenceGateway>) -> Result<Self> {
        let bus = MessageBus::new(config.coordinator.request_timeout());
        let identity = Arc::new(StoredIdentity::new(gateway.clone()));
        let coordinator = BackgroundCoordinator::load(config.clone(), bus.clone(), gateway, identity)
            .await
            .context("Failed to start background coordinator")?;
        let handle = coordinator.start();
        info!("Runtime ready");
        Ok(Self {
            config,
            bus,
            handle,
        })
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<BackgroundCoordinator> {
        self.handle.coordinator()
    }

    pub async fn open_popup(&self, session: SessionId) -> Result<PopupSession, ClientError> {
        PopupSession::open(self.bus.clone(), session, &self.config).await
    }

    /// Starts an agent for a page on `hostname`. Dropping the listener is navigation away.
    pub async fn attach_agent(&self, tab: TabId, hostname: &str) -> (Arc<PageAgent>, Listener) {
        let agent = PageAgent::new(tab, hostname, self.bus.clone());
        let listener = agent.start().await;
        (agent, listener)
    }

    /// Browser event: `tab` became the active tab showing `url`.
    pub async fn activate_tab(&self, tab: TabId, url: &str) -> Result<(), BusError> {
        self.bus
            .send(
                Endpoint::Browser,
                Endpoint::Coordinator,
                Request::TabActivated {
                    tab,
                    url: url.to_string(),
                },
            )
            .await
            .map(|_| ())
    }

    pub async fn close_tab(&self, tab: TabId) -> Result<(), BusError> {
        self.bus
            .send(Endpoint::Browser, Endpoint::Coordinator, Request::TabClosed { tab })
            .await
            .map(|_| ())
    }

    pub async fn shutdown(self) {
        self.handle.shutdown().await;
    }
}
