//! The popup process: a short-lived control panel over coordinator state.

mod client;
mod heartbeat;
mod preview;
mod view;

pub use client::CoordinatorClient;
pub use heartbeat::{HeartbeatMonitor, HeartbeatTicks};
pub use preview::{PreviewSnapshot, PreviewSyncController};
pub use view::{ControlPanelState, Pending, PreviewView, ProfileEditor, SharedView};

use crate::bus::{FailureKind, FailureReport, MessageBus, SessionId};
use crate::config::{Config, ProfileDefaultsConfig};
use crate::engine::{DraftProfile, GlobalSettings, Profile};
use crate::error::ClientError;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One open popup. Every change goes through the coordinator; the local view is
/// updated from its replies.
pub struct PopupSession {
    client: CoordinatorClient,
    view: SharedView,
    preview: PreviewSyncController,
    heartbeat: Option<HeartbeatMonitor>,
    defaults: ProfileDefaultsConfig,
}

impl PopupSession {
    /// Announces the popup, loads the snapshot, starts the heartbeat and syncs the
    /// preview toggle.
    pub async fn open(
        bus: MessageBus,
        session: SessionId,
        config: &Config,
    ) -> Result<Self, ClientError> {
        let client = CoordinatorClient::new(bus, session, config.coordinator.request_timeout());
        let snapshot = client.popup_opened().await?;
        info!(
            "Popup session {} opened with {} profiles",
            session.0,
            snapshot.profiles.len()
        );

        let view: SharedView = Arc::new(RwLock::new(ControlPanelState::from_snapshot(snapshot)));
        let heartbeat = HeartbeatMonitor::start(client.clone(), view.clone(), &config.heartbeat);
        let preview = PreviewSyncController::new(client.clone(), view.clone());
        preview.sync().await;

        Ok(Self {
            client,
            view,
            preview,
            heartbeat: Some(heartbeat),
            defaults: config.profiles.clone(),
        })
    }

    pub fn session(&self) -> SessionId {
        self.client.session()
    }

    /// Copy of the current view model.
    pub async fn view(&self) -> ControlPanelState {
        self.view.read().await.clone()
    }

    pub fn heartbeat_ticks(&self) -> HeartbeatTicks {
        self.heartbeat
            .as_ref()
            .map(|h| h.ticks())
            .unwrap_or_default()
    }

    // --- Settings ---

    /// The local switch only flips once the coordinator has acknowledged.
    pub async fn toggle_extension(&self, enabled: bool) -> Result<bool, ClientError> {
        let result = self.client.toggle_extension(enabled).await;
        match &result {
            Ok(enabled) => {
                let mut view = self.view.write().await;
                view.settings.extension_enabled = *enabled;
                view.clear_error();
            }
            Err(e) => self.fail(e).await,
        }
        if result.is_ok() {
            self.preview.sync().await;
        }
        result
    }

    pub async fn save_settings(
        &self,
        settings: GlobalSettings,
    ) -> Result<GlobalSettings, ClientError> {
        let result = self.client.save_settings(settings).await;
        match &result {
            Ok(saved) => {
                let mut view = self.view.write().await;
                view.settings = *saved;
                view.preview.interactive = saved.extension_enabled;
                view.clear_error();
            }
            Err(e) => self.fail(e).await,
        }
        result
    }

    pub async fn sign_out(&self) -> Result<GlobalSettings, ClientError> {
        let result = self.client.sign_out().await;
        match &result {
            Ok(settings) => {
                let mut view = self.view.write().await;
                view.user = None;
                view.settings = *settings;
                view.clear_error();
            }
            Err(e) => self.fail(e).await,
        }
        result
    }

    // --- Profiles ---

    pub async fn refresh_profiles(&self) -> Result<Vec<Profile>, ClientError> {
        let profiles = self.client.profiles().await?;
        self.view.write().await.set_profiles(profiles.clone());
        Ok(profiles)
    }

    pub async fn toggle_profile(&self, name: &str) -> Result<Vec<Profile>, ClientError> {
        let result = self.client.toggle_profile(name).await;
        self.apply_profiles(result).await
    }

    pub async fn toggle_default_profile(&self, name: &str) -> Result<Vec<Profile>, ClientError> {
        let result = self.client.toggle_default_profile(name).await;
        self.apply_profiles(result).await
    }

    pub async fn toggle_default_group(&self) -> Result<Vec<Profile>, ClientError> {
        let result = self.client.toggle_default_group().await;
        self.apply_profiles(result).await
    }

    pub async fn delete_profile(&self, name: &str) -> Result<Vec<Profile>, ClientError> {
        let result = self.client.delete_profile(name).await;
        let editing_deleted = result.is_ok()
            && self
                .view
                .read()
                .await
                .editor
                .as_ref()
                .is_some_and(|e| e.editing.as_deref() == Some(name));
        if editing_deleted {
            self.view.write().await.editor = None;
        }
        self.apply_profiles(result).await
    }

    // --- Editor ---

    /// Opens the editor on `name`, or on a fresh draft when `None`. Returns false when
    /// the named profile isn't in the view.
    pub async fn begin_edit(&self, name: Option<&str>) -> bool {
        let mut view = self.view.write().await;
        let editor = match name {
            None => ProfileEditor::create(&self.defaults),
            Some(name) => match view.profile(name) {
                Some(profile) => ProfileEditor::edit(profile),
                None => return false,
            },
        };
        view.editor = Some(editor);
        true
    }

    /// Applies `edit` to the open draft. False when no editor is open.
    pub async fn edit_draft<F>(&self, edit: F) -> bool
    where
        F: FnOnce(&mut DraftProfile),
    {
        let mut view = self.view.write().await;
        match view.editor.as_mut() {
            Some(editor) => {
                edit(&mut editor.draft);
                true
            }
            None => false,
        }
    }

    pub async fn reset_draft(&self) {
        if let Some(editor) = self.view.write().await.editor.as_mut() {
            editor.reset();
        }
    }

    pub async fn cancel_edit(&self) {
        self.view.write().await.editor = None;
    }

    /// Sends the draft as a create or update. The editor closes on success; on any
    /// failure the draft stays as typed. Returns false when no editor is open.
    pub async fn save_draft(&self) -> Result<bool, ClientError> {
        let editor = self.view.read().await.editor.clone();
        let Some(editor) = editor else {
            return Ok(false);
        };

        let field_errors = editor.field_errors();
        if !field_errors.is_empty() {
            let err = ClientError::Rejected(FailureReport {
                kind: FailureKind::Validation,
                messages: field_errors.iter().map(|e| e.to_string()).collect(),
            });
            self.view.write().await.record_error(&err);
            return Err(err);
        }

        let result = match editor.editing.as_deref() {
            None => self.client.create_profile(editor.draft.clone()).await,
            Some(name) => self.client.update_profile(name, editor.draft.clone()).await,
        };
        if result.is_ok() {
            self.view.write().await.editor = None;
        }
        self.apply_profiles(result).await.map(|_| true)
    }

    // --- Preview ---

    pub async fn toggle_preview(&self, enabled: bool) -> PreviewSnapshot {
        self.preview.request_toggle(enabled).await
    }

    pub async fn sync_preview(&self) -> PreviewSnapshot {
        self.preview.sync().await
    }

    /// Stops the heartbeat and tells the coordinator the popup is gone.
    pub async fn close(mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }
        if let Err(e) = self.client.popup_closed().await {
            debug!("Popup close not delivered: {}", e);
        }
        info!("Popup session {} closed", self.client.session().0);
    }

    async fn apply_profiles(
        &self,
        result: Result<Vec<Profile>, ClientError>,
    ) -> Result<Vec<Profile>, ClientError> {
        match result {
            Ok(profiles) => {
                let mut view = self.view.write().await;
                view.set_profiles(profiles.clone());
                view.clear_error();
                Ok(profiles)
            }
            Err(e) => {
                self.fail(&e).await;
                if e.kind() == Some(FailureKind::NotFound) {
                    if let Err(resync) = self.refresh_profiles().await {
                        debug!("Profile resync failed: {}", resync);
                    }
                }
                Err(e)
            }
        }
    }

    async fn fail(&self, err: &ClientError) {
        warn!("Popup request failed: {}", err);
        self.view.write().await.record_error(err);
    }
}
