//! Per-tab page agent: owns the preview overlay for its page and applies
//! refilter broadcasts from the coordinator.

use crate::bus::{
    Endpoint, FailureKind, FailureReport, Listener, MessageBus, MessageHandler, Request, Response,
    TabId,
};
use crate::engine::{normalize_host, GlobalSettings, PreviewState, Profile, SiteMatcher};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct AgentState {
    preview: PreviewState,
    filtering_enabled: bool,
    active_profiles: Vec<String>,
    refilters: u64,
}

pub struct PageAgent {
    tab: TabId,
    hostname: String,
    bus: MessageBus,
    matcher: SiteMatcher,
    state: Mutex<AgentState>,
}

impl PageAgent {
    pub fn new(tab: TabId, hostname: &str, bus: MessageBus) -> Arc<Self> {
        Arc::new(Self {
            tab,
            hostname: normalize_host(hostname),
            bus,
            matcher: SiteMatcher,
            state: Mutex::new(AgentState {
                filtering_enabled: true,
                ..AgentState::default()
            }),
        })
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Registers on the bus, announces itself and adopts the filtering state the
    /// coordinator answers with. Dropping the listener is the page going away.
    pub async fn start(self: &Arc<Self>) -> Listener {
        let listener = self.bus.on_message(Endpoint::Agent(self.tab), self.clone());
        match self
            .bus
            .send(
                Endpoint::Agent(self.tab),
                Endpoint::Coordinator,
                Request::AgentReady { tab: self.tab },
            )
            .await
        {
            Ok(Response::FilterState {
                extension_enabled,
                profiles,
            }) => {
                let active = self.active_names(extension_enabled, &profiles);
                let mut state = self.state.lock().await;
                state.filtering_enabled = extension_enabled;
                state.active_profiles = active;
                debug!(
                    "Tab {} starts with {} profiles (filtering {})",
                    self.tab.0,
                    state.active_profiles.len(),
                    if extension_enabled { "on" } else { "off" }
                );
            }
            Ok(other) => debug!("Tab {} got {:?} to AgentReady", self.tab.0, other),
            Err(e) => debug!("Tab {} could not announce itself: {}", self.tab.0, e),
        }
        listener
    }

    /// Records `count` newly hidden elements and reports them to the coordinator.
    pub async fn hide(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.state.lock().await.preview.hidden_count += count;
        if let Err(e) = self.bus.post(
            Endpoint::Agent(self.tab),
            Endpoint::Coordinator,
            Request::ReportBlocked { count },
        ) {
            warn!("Block report from tab {} dropped: {}", self.tab.0, e);
        }
    }

    pub async fn preview(&self) -> PreviewState {
        self.state.lock().await.preview
    }

    pub async fn active_profiles(&self) -> Vec<String> {
        self.state.lock().await.active_profiles.clone()
    }

    pub async fn refilter_count(&self) -> u64 {
        self.state.lock().await.refilters
    }

    fn active_names(&self, extension_enabled: bool, profiles: &[Profile]) -> Vec<String> {
        let settings = GlobalSettings {
            extension_enabled,
            ..GlobalSettings::default()
        };
        self.matcher
            .effective_profiles(&self.hostname, &settings, profiles)
            .into_iter()
            .map(|p| p.name.clone())
            .collect()
    }

    async fn set_preview(&self, enabled: bool) -> Response {
        let mut state = self.state.lock().await;
        if enabled && !state.filtering_enabled {
            return Response::Failure(FailureReport::new(
                FailureKind::Unsupported,
                "filtering is disabled on this page",
            ));
        }
        state.preview.enabled = enabled;
        debug!("Tab {} preview overlay {}", self.tab.0, if enabled { "on" } else { "off" });
        Response::Preview {
            state: Some(state.preview),
        }
    }
}

#[async_trait]
impl MessageHandler for PageAgent {
    async fn handle(&self, from: Endpoint, request: Request) -> Option<Response> {
        match request {
            Request::QueryPreview => Some(Response::Preview {
                state: Some(self.preview().await),
            }),
            Request::SetPreview { enabled } => Some(self.set_preview(enabled).await),
            Request::Refilter {
                extension_enabled,
                profiles,
            } => {
                let active = self.active_names(extension_enabled, &profiles);
                let mut state = self.state.lock().await;
                state.filtering_enabled = extension_enabled;
                if !extension_enabled {
                    state.preview.enabled = false;
                }
                state.refilters += 1;
                info!(
                    "Tab {} refiltered on {} with {} profiles",
                    self.tab.0,
                    self.hostname,
                    active.len()
                );
                state.active_profiles = active;
                Some(Response::Ack)
            }
            other => {
                debug!("Tab {} ignoring {} from {}", self.tab.0, other.name(), from);
                None
            }
        }
    }
}
