//! Long-lived background coordinator: source of truth for global settings, the
//! profile list and block stats, and relay between the popup and page agents.

mod handler;
mod resolution;
mod sessions;

pub use resolution::{ResolutionOutcome, ResolutionPhase};
pub use sessions::SessionRegistry;

use crate::bus::{
    Endpoint, FailureKind, FailureReport, Listener, MessageBus, Request, Response, SessionId,
    SessionSnapshot, TabId,
};
use crate::config::Config;
use crate::engine::{
    host_from_url, Committed, DraftProfile, ExtensionState, GlobalSettings, PreviewState, Profile,
    ProfileStore, SiteMatcher, SiteResolver,
};
use crate::error::{BusError, CoreError};
use crate::gateway::{IdentityProvider, PersistenceGateway, PROFILES_KEY, SETTINGS_KEY};
use crate::stats::{BlockStats, StatsCollector};
use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use futures::{stream, StreamExt};
use handler::CoordinatorHandler;
use rustc_hash::FxHashSet;
use serde_json::Map;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The tab the user is looking at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTab {
    pub tab: TabId,
    pub url: String,
    /// None for restricted pages where no agent can run.
    pub hostname: Option<String>,
}

pub struct BackgroundCoordinator {
    config: Config,
    bus: MessageBus,
    gateway: Arc<dyn PersistenceGateway>,
    identity: Arc<dyn IdentityProvider>,
    matcher: SiteMatcher,
    // Held across persistence so read-modify-write cycles never interleave
    store: Mutex<ProfileStore>,
    settings: ExtensionState,
    settings_write: Mutex<()>,
    stats: Arc<StatsCollector>,
    active_tab: ArcSwapOption<ActiveTab>,
    agents: RwLock<FxHashSet<TabId>>,
    sessions: SessionRegistry,
    phase: watch::Sender<ResolutionPhase>,
}

/// Running coordinator. Shutting down unregisters it from the bus and stops the reaper.
pub struct CoordinatorHandle {
    coordinator: Arc<BackgroundCoordinator>,
    listener: Option<Listener>,
    shutdown: CancellationToken,
    reaper: JoinHandle<()>,
}

impl BackgroundCoordinator {
    /// Builds the coordinator from persisted `profiles` and `settings`.
    pub async fn load(
        config: Config,
        bus: MessageBus,
        gateway: Arc<dyn PersistenceGateway>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Arc<Self>> {
        let stored = gateway
            .get(&[PROFILES_KEY, SETTINGS_KEY])
            .await
            .context("Failed to read persisted state")?;

        let profiles: Vec<Profile> = match stored.get(PROFILES_KEY) {
            Some(value) => {
                serde_json::from_value(value.clone()).context("Malformed profiles record")?
            }
            None => Vec::new(),
        };
        let settings: GlobalSettings = match stored.get(SETTINGS_KEY) {
            Some(value) => {
                serde_json::from_value(value.clone()).context("Malformed settings record")?
            }
            None => GlobalSettings::default(),
        };

        let mut store = ProfileStore::new();
        let repaired = store.replace_all(profiles);
        if repaired > 0 {
            warn!("Repaired {} inconsistent persisted profile entries", repaired);
        }
        info!(
            "Coordinator loaded {} profiles (filtering {})",
            store.len(),
            if settings.extension_enabled { "enabled" } else { "disabled" }
        );

        let stats = StatsCollector::new(&config.stats);
        let sessions = SessionRegistry::new(config.coordinator.popup_idle_timeout());
        let (phase, _) = watch::channel(ResolutionPhase::Idle);

        Ok(Arc::new(Self {
            config,
            bus,
            gateway,
            identity,
            matcher: SiteMatcher,
            store: Mutex::new(store),
            settings: ExtensionState::new(settings),
            settings_write: Mutex::new(()),
            stats,
            active_tab: ArcSwapOption::empty(),
            agents: RwLock::new(FxHashSet::default()),
            sessions,
            phase,
        }))
    }

    /// Registers on the bus and spawns the popup-session reaper.
    pub fn start(self: &Arc<Self>) -> CoordinatorHandle {
        let handler = Arc::new(CoordinatorHandler::new(self.clone()));
        let listener = self.bus.on_message(Endpoint::Coordinator, handler);

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let coordinator = self.clone();
        let reap_interval = self.config.coordinator.reap_interval();
        let reaper = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(reap_interval.max(Duration::from_millis(1)));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        coordinator.sessions.reap(Instant::now()).await;
                    }
                }
            }
        });

        info!("Background coordinator started");
        CoordinatorHandle {
            coordinator: self.clone(),
            listener: Some(listener),
            shutdown,
            reaper,
        }
    }

    // --- Read side ---

    pub fn settings(&self) -> GlobalSettings {
        self.settings.snapshot()
    }

    pub async fn profiles(&self) -> Vec<Profile> {
        self.store.lock().await.profiles().to_vec()
    }

    pub fn stats(&self) -> BlockStats {
        self.stats.snapshot()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn active_tab(&self) -> Option<Arc<ActiveTab>> {
        self.active_tab.load_full()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ResolutionPhase> {
        self.phase.subscribe()
    }

    pub async fn known_agents(&self) -> Vec<TabId> {
        self.agents.read().await.iter().copied().collect()
    }

    fn active_hostname(&self) -> Option<String> {
        self.active_tab
            .load_full()
            .and_then(|t| t.hostname.clone())
    }

    pub async fn snapshot(&self, resolution: Option<ResolutionOutcome>) -> SessionSnapshot {
        let user = match self.identity.current_user().await {
            Ok(user) => user,
            Err(e) => {
                error!("Failed to read signed-in user: {:#}", e);
                None
            }
        };
        SessionSnapshot {
            settings: self.settings(),
            profiles: self.profiles().await,
            stats: self.stats(),
            user,
            resolution,
        }
    }

    // --- Popup lifecycle ---

    /// Registers the popup and, outside power-user mode, auto-selects the site's profile.
    pub async fn popup_opened(&self, session: SessionId) -> SessionSnapshot {
        self.sessions.open(session).await;
        let resolution = if self.settings.is_power_user_mode() {
            ResolutionOutcome::Skipped
        } else {
            self.auto_resolve().await
        };
        self.snapshot(Some(resolution)).await
    }

    pub async fn heartbeat(&self, session: SessionId) {
        self.sessions.touch(session).await;
    }

    pub async fn popup_closed(&self, session: SessionId) {
        self.sessions.close(session).await;
    }

    // --- Settings ---

    pub async fn save_settings(&self, settings: GlobalSettings) -> Result<GlobalSettings, CoreError> {
        self.update_settings(|_| settings).await
    }

    pub async fn toggle_extension(&self, enabled: bool) -> Result<bool, CoreError> {
        self.update_settings(|current| GlobalSettings {
            extension_enabled: enabled,
            ..current
        })
        .await
        .map(|s| s.extension_enabled)
    }

    /// Removes the identity records; premium-only settings switch off with them.
    pub async fn sign_out(&self) -> Result<GlobalSettings, CoreError> {
        self.identity.sign_out().await.map_err(|e| {
            warn!("Sign-out failed: {:#}", e);
            CoreError::Persistence(e.to_string())
        })?;
        info!("User signed out");
        if !self.settings().customization_toggle {
            return Ok(self.settings());
        }
        self.update_settings(|current| GlobalSettings {
            customization_toggle: false,
            ..current
        })
        .await
    }

    /// Read-modify-write under `settings_write`. Persists first; the in-memory
    /// snapshot only changes once the write succeeded.
    async fn update_settings<F>(&self, f: F) -> Result<GlobalSettings, CoreError>
    where
        F: FnOnce(GlobalSettings) -> GlobalSettings,
    {
        let (previous, settings) = {
            let _guard = self.settings_write.lock().await;
            let previous = self.settings.snapshot();
            let mut settings = f(previous);
            if settings.customization_toggle && !self.is_premium().await {
                debug!("Customization requires a premium account; keeping it off");
                settings.customization_toggle = false;
            }
            self.persist_settings(&settings).await.map_err(|e| {
                warn!("Settings not persisted: {:#}", e);
                CoreError::Persistence(e.to_string())
            })?;
            self.settings.store(settings);
            (previous, settings)
        };
        info!(
            "Settings saved (enabled={}, power_user={}, counter={}, customization={})",
            settings.extension_enabled,
            settings.is_power_user_mode,
            settings.show_block_counter,
            settings.customization_toggle
        );
        if previous.extension_enabled != settings.extension_enabled {
            self.broadcast_refilter().await;
        }
        Ok(settings)
    }

    async fn is_premium(&self) -> bool {
        match self.identity.current_user().await {
            Ok(user) => user.is_some_and(|u| u.is_premium()),
            Err(e) => {
                warn!("Could not read signed-in user: {:#}", e);
                false
            }
        }
    }

    // --- Profiles ---

    pub async fn create_profile(&self, draft: &DraftProfile) -> Result<Committed, CoreError> {
        let (profile, profiles) = self
            .commit_profiles("create", true, |store| {
                store.create(draft).map(|c| c.profile)
            })
            .await?;
        Ok(Committed { profile, profiles })
    }

    pub async fn update_profile(
        &self,
        name: &str,
        draft: &DraftProfile,
    ) -> Result<Committed, CoreError> {
        let (profile, profiles) = self
            .commit_profiles("update", true, |store| {
                store.update(name, draft).map(|c| c.profile)
            })
            .await?;
        Ok(Committed { profile, profiles })
    }

    pub async fn delete_profile(&self, name: &str) -> Result<Vec<Profile>, CoreError> {
        self.commit_profiles("delete", true, |store| store.delete(name).map(|_| ()))
            .await
            .map(|(_, profiles)| profiles)
    }

    /// Independent toggle. A default profile goes through the exclusive rule instead.
    pub async fn toggle_profile(&self, name: &str) -> Result<Vec<Profile>, CoreError> {
        self.commit_profiles("toggle", true, |store| store.toggle(name).map(|_| ()))
            .await
            .map(|(_, profiles)| profiles)
    }

    pub async fn toggle_default_profile(&self, name: &str) -> Result<Vec<Profile>, CoreError> {
        self.commit_profiles("toggle_default", true, |store| {
            store.toggle_default(name).map(|_| ())
        })
        .await
        .map(|(_, profiles)| profiles)
    }

    /// The "default profile" master switch: off if any default is on, otherwise the
    /// profile for the active site (or the first default when nothing matches).
    pub async fn toggle_default_group(&self) -> Result<Vec<Profile>, CoreError> {
        let hostname = self.active_hostname();
        let matcher = self.matcher;
        self.commit_profiles("toggle_default_group", true, move |store| {
            if store.any_default_enabled() {
                store.disable_defaults();
                return Ok(());
            }
            let target = {
                let profiles = store.profiles();
                let found = match hostname.as_deref() {
                    Some(host) => matcher.resolve(host, profiles),
                    None => profiles.iter().find(|p| p.is_default),
                };
                found.map(|p| p.name.clone())
            };
            match target {
                Some(name) => store.set_enabled(&name, true).map(|_| ()),
                None => Err(CoreError::NotFound("default profile".to_string())),
            }
        })
        .await
        .map(|(_, profiles)| profiles)
    }

    /// Applies `op` to a copy of the store, persists the copy and only then swaps it
    /// in. On any failure the live list is untouched.
    async fn commit_profiles<T, F>(
        &self,
        op: &'static str,
        trigger_instant: bool,
        f: F,
    ) -> Result<(T, Vec<Profile>), CoreError>
    where
        F: FnOnce(&mut ProfileStore) -> Result<T, CoreError>,
    {
        let profiles = {
            let mut store = self.store.lock().await;
            let mut next = store.clone();
            let out = f(&mut next)?;
            if let Err(e) = self.persist_profiles(next.profiles()).await {
                warn!("Profile {} not persisted; keeping last durable list: {:#}", op, e);
                return Err(CoreError::Persistence(e.to_string()));
            }
            *store = next;
            debug!("Profile {} committed ({} profiles)", op, store.len());
            (out, store.profiles().to_vec())
        };

        if trigger_instant {
            self.broadcast_refilter().await;
        }
        Ok(profiles)
    }

    async fn persist_profiles(&self, profiles: &[Profile]) -> Result<()> {
        let mut items = Map::new();
        items.insert(
            PROFILES_KEY.to_string(),
            serde_json::to_value(profiles).context("Failed to serialize profiles")?,
        );
        self.gateway.set(items).await
    }

    async fn persist_settings(&self, settings: &GlobalSettings) -> Result<()> {
        let mut items = Map::new();
        items.insert(
            SETTINGS_KEY.to_string(),
            serde_json::to_value(settings).context("Failed to serialize settings")?,
        );
        self.gateway.set(items).await
    }

    // --- Tabs and agents ---

    /// Tracks the newly active tab and resolves its profile.
    pub async fn tab_activated(&self, tab: TabId, url: &str) -> ResolutionOutcome {
        let hostname = host_from_url(url);
        debug!("Tab {} active ({:?})", tab.0, hostname);
        self.active_tab.store(Some(Arc::new(ActiveTab {
            tab,
            url: url.to_string(),
            hostname,
        })));
        self.auto_resolve().await
    }

    pub async fn tab_closed(&self, tab: TabId) {
        self.agents.write().await.remove(&tab);
        self.active_tab.rcu(|current| match current {
            Some(active) if active.tab == tab => None,
            other => other.clone(),
        });
    }

    /// Registers the agent and returns the filtering switch and profile list it
    /// should start from.
    pub async fn agent_ready(&self, tab: TabId) -> (bool, Vec<Profile>) {
        self.agents.write().await.insert(tab);
        debug!("Agent ready in tab {}", tab.0);
        (self.settings.is_filtering_active(), self.profiles().await)
    }

    pub fn record_blocked(&self, count: u64) {
        self.stats.record_blocked(count);
    }

    /// Sends the current settings and list to every known agent concurrently.
    /// Agents that are gone are forgotten.
    async fn broadcast_refilter(&self) {
        let tabs = self.known_agents().await;
        if tabs.is_empty() {
            return;
        }
        let extension_enabled = self.settings.is_filtering_active();
        let profiles = self.profiles().await;
        let timeout = self.config.coordinator.agent_timeout();

        let results: Vec<(TabId, bool)> = stream::iter(tabs)
            .map(|tab| {
                let request = Request::Refilter {
                    extension_enabled,
                    profiles: profiles.clone(),
                };
                async move {
                    let delivered = self
                        .bus
                        .send_with_timeout(Endpoint::Coordinator, Endpoint::Agent(tab), request, timeout)
                        .await;
                    (tab, !matches!(delivered, Err(BusError::NoListener(_))))
                }
            })
            .buffer_unordered(self.config.coordinator.broadcast_concurrency.max(1))
            .collect()
            .await;

        let gone: Vec<TabId> = results
            .into_iter()
            .filter(|(_, alive)| !alive)
            .map(|(tab, _)| tab)
            .collect();
        if !gone.is_empty() {
            let mut agents = self.agents.write().await;
            for tab in &gone {
                agents.remove(tab);
            }
            debug!("Forgot {} unreachable agents", gone.len());
        }
    }

    // --- Preview relay ---

    /// Asks the active tab's agent for its overlay state. None when it doesn't answer.
    pub async fn query_preview(&self) -> Option<PreviewState> {
        let tab = self.active_tab.load_full().map(|t| t.tab)?;
        match self
            .bus
            .send_with_timeout(
                Endpoint::Coordinator,
                Endpoint::Agent(tab),
                Request::QueryPreview,
                self.config.coordinator.agent_timeout(),
            )
            .await
        {
            Ok(Response::Preview { state }) => state,
            Ok(other) => {
                debug!("Unexpected preview reply from tab {}: {:?}", tab.0, other);
                None
            }
            Err(e) => {
                debug!("No preview state from tab {}: {}", tab.0, e);
                None
            }
        }
    }

    /// Forwards a toggle to the active tab's agent. `Ok(None)` means the agent
    /// acknowledged without reporting its resulting state.
    pub async fn toggle_preview(&self, enabled: bool) -> Result<Option<PreviewState>, FailureReport> {
        if !self.settings.is_filtering_active() {
            return Err(FailureReport::new(
                FailureKind::Unsupported,
                "filtering is disabled",
            ));
        }
        let tab = self
            .active_tab
            .load_full()
            .map(|t| t.tab)
            .ok_or_else(|| FailureReport::new(FailureKind::Unreachable, "no active tab"))?;

        let reply = self
            .bus
            .send_with_timeout(
                Endpoint::Coordinator,
                Endpoint::Agent(tab),
                Request::SetPreview { enabled },
                self.config.coordinator.agent_timeout(),
            )
            .await
            .map_err(|e| FailureReport::new(FailureKind::Unreachable, e.to_string()))?;

        match reply {
            Response::Preview { state } => Ok(state),
            Response::Ack => Ok(None),
            Response::Failure(report) => Err(report),
            other => {
                debug!("Unexpected toggle reply from tab {}: {:?}", tab.0, other);
                Ok(None)
            }
        }
    }
}

impl CoordinatorHandle {
    pub fn coordinator(&self) -> &Arc<BackgroundCoordinator> {
        &self.coordinator
    }

    pub async fn shutdown(mut self) {
        self.shutdown.cancel();
        self.listener.take();
        let _ = (&mut self.reaper).await;
        info!("Background coordinator stopped");
    }
}

impl Drop for CoordinatorHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
