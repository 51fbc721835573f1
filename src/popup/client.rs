use crate::bus::{Endpoint, MessageBus, Request, Response, SessionId, SessionSnapshot};
use crate::engine::{DraftProfile, GlobalSettings, PreviewState, Profile};
use crate::error::ClientError;
use crate::stats::BlockStats;
use std::time::Duration;

/// Typed request/response calls from one popup session to the coordinator.
#[derive(Clone)]
pub struct CoordinatorClient {
    bus: MessageBus,
    session: SessionId,
    timeout: Duration,
}

impl CoordinatorClient {
    pub fn new(bus: MessageBus, session: SessionId, timeout: Duration) -> Self {
        Self {
            bus,
            session,
            timeout,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    async fn call(&self, request: Request) -> Result<Response, ClientError> {
        let response = self
            .bus
            .send_with_timeout(
                Endpoint::Popup(self.session),
                Endpoint::Coordinator,
                request,
                self.timeout,
            )
            .await?;
        match response {
            Response::Failure(report) => Err(ClientError::Rejected(report)),
            other => Ok(other),
        }
    }

    async fn ack(&self, request: Request) -> Result<(), ClientError> {
        let name = request.name();
        match self.call(request).await? {
            Response::Ack => Ok(()),
            _ => Err(ClientError::UnexpectedResponse(name)),
        }
    }

    async fn profiles_from(&self, request: Request) -> Result<Vec<Profile>, ClientError> {
        let name = request.name();
        match self.call(request).await? {
            Response::Profiles { profiles } => Ok(profiles),
            _ => Err(ClientError::UnexpectedResponse(name)),
        }
    }

    pub async fn popup_opened(&self) -> Result<SessionSnapshot, ClientError> {
        match self
            .call(Request::PopupOpened {
                session: self.session,
            })
            .await?
        {
            Response::Session(snapshot) => Ok(snapshot),
            _ => Err(ClientError::UnexpectedResponse("PopupOpened")),
        }
    }

    pub async fn popup_closed(&self) -> Result<(), ClientError> {
        self.ack(Request::PopupClosed {
            session: self.session,
        })
        .await
    }

    pub async fn heartbeat(&self) -> Result<(), ClientError> {
        self.ack(Request::Heartbeat {
            session: self.session,
        })
        .await
    }

    pub async fn load_user_settings(&self) -> Result<SessionSnapshot, ClientError> {
        match self.call(Request::LoadUserSettings).await? {
            Response::Session(snapshot) => Ok(snapshot),
            _ => Err(ClientError::UnexpectedResponse("LoadUserSettings")),
        }
    }

    pub async fn save_settings(
        &self,
        settings: GlobalSettings,
    ) -> Result<GlobalSettings, ClientError> {
        match self.call(Request::SaveUserSettings { settings }).await? {
            Response::Settings { settings } => Ok(settings),
            _ => Err(ClientError::UnexpectedResponse("SaveUserSettings")),
        }
    }

    /// Returns the settings as they stand after premium-only switches were reset.
    pub async fn sign_out(&self) -> Result<GlobalSettings, ClientError> {
        match self.call(Request::SignOut).await? {
            Response::Settings { settings } => Ok(settings),
            _ => Err(ClientError::UnexpectedResponse("SignOut")),
        }
    }

    pub async fn toggle_extension(&self, enabled: bool) -> Result<bool, ClientError> {
        match self.call(Request::ToggleExtension { enabled }).await? {
            Response::ExtensionState { enabled } => Ok(enabled),
            _ => Err(ClientError::UnexpectedResponse("ToggleExtension")),
        }
    }

    pub async fn extension_enabled(&self) -> Result<bool, ClientError> {
        match self.call(Request::GetExtensionState).await? {
            Response::ExtensionState { enabled } => Ok(enabled),
            _ => Err(ClientError::UnexpectedResponse("GetExtensionState")),
        }
    }

    pub async fn block_stats(&self) -> Result<BlockStats, ClientError> {
        match self.call(Request::GetBlockStats).await? {
            Response::Stats { stats } => Ok(stats),
            _ => Err(ClientError::UnexpectedResponse("GetBlockStats")),
        }
    }

    pub async fn profiles(&self) -> Result<Vec<Profile>, ClientError> {
        self.profiles_from(Request::GetProfiles).await
    }

    pub async fn create_profile(&self, draft: DraftProfile) -> Result<Vec<Profile>, ClientError> {
        self.profiles_from(Request::CreateProfile { draft }).await
    }

    pub async fn update_profile(
        &self,
        name: &str,
        draft: DraftProfile,
    ) -> Result<Vec<Profile>, ClientError> {
        self.profiles_from(Request::UpdateProfile {
            name: name.to_string(),
            draft,
        })
        .await
    }

    pub async fn delete_profile(&self, name: &str) -> Result<Vec<Profile>, ClientError> {
        self.profiles_from(Request::DeleteProfile {
            name: name.to_string(),
        })
        .await
    }

    pub async fn toggle_profile(&self, name: &str) -> Result<Vec<Profile>, ClientError> {
        self.profiles_from(Request::ToggleProfile {
            name: name.to_string(),
        })
        .await
    }

    pub async fn toggle_default_profile(&self, name: &str) -> Result<Vec<Profile>, ClientError> {
        self.profiles_from(Request::ToggleDefaultProfile {
            name: name.to_string(),
        })
        .await
    }

    pub async fn toggle_default_group(&self) -> Result<Vec<Profile>, ClientError> {
        self.profiles_from(Request::ToggleDefaultGroup).await
    }

    /// None when no agent answered for the active tab.
    pub async fn preview_state(&self) -> Result<Option<PreviewState>, ClientError> {
        match self.call(Request::GetPreviewState).await? {
            Response::Preview { state } => Ok(state),
            _ => Err(ClientError::UnexpectedResponse("GetPreviewState")),
        }
    }

    pub async fn toggle_preview(&self, enabled: bool) -> Result<Option<PreviewState>, ClientError> {
        match self.call(Request::TogglePreviewHidden { enabled }).await? {
            Response::Preview { state } => Ok(state),
            _ => Err(ClientError::UnexpectedResponse("TogglePreviewHidden")),
        }
    }
}
