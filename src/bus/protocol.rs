//! Message types exchanged between the popup, the coordinator and page agents.
//!
//! ```text
//! ┌────────┐   Request / Response   ┌─────────────┐   QueryPreview / SetPreview   ┌───────────┐
//! │ Popup  │───────────────────────>│ Coordinator │──────────────────────────────>│ Agent(tab)│
//! │        │<───────────────────────│             │<──────────────────────────────│           │
//! └────────┘                        └─────────────┘   AgentReady / ReportBlocked  └───────────┘
//! ```
//!
//! No ordering holds between requests issued independently, and a request to
//! an endpoint that is not listening yields no response at all.

use crate::coordinator::ResolutionOutcome;
use crate::engine::{DraftProfile, GlobalSettings, PreviewState, Profile};
use crate::gateway::User;
use crate::stats::BlockStats;
use serde::{Deserialize, Serialize};

/// Browser tab hosting a page agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TabId(pub u32);

/// One open instance of the popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

/// Addressable execution context on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Coordinator,
    Popup(SessionId),
    Agent(TabId),
    /// The browser shell itself (tab events). Never listens.
    Browser,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Coordinator => write!(f, "coordinator"),
            Endpoint::Popup(id) => write!(f, "popup#{}", id.0),
            Endpoint::Agent(tab) => write!(f, "agent@tab{}", tab.0),
            Endpoint::Browser => write!(f, "browser"),
        }
    }
}

/// Requests, grouped by sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    // Popup -> Coordinator
    PopupOpened { session: SessionId },
    PopupClosed { session: SessionId },
    Heartbeat { session: SessionId },
    LoadUserSettings,
    SaveUserSettings { settings: GlobalSettings },
    ToggleExtension { enabled: bool },
    GetExtensionState,
    GetBlockStats,
    GetProfiles,
    CreateProfile { draft: DraftProfile },
    UpdateProfile { name: String, draft: DraftProfile },
    DeleteProfile { name: String },
    ToggleProfile { name: String },
    ToggleDefaultProfile { name: String },
    ToggleDefaultGroup,
    GetPreviewState,
    TogglePreviewHidden { enabled: bool },
    SignOut,

    // Browser -> Coordinator
    TabActivated { tab: TabId, url: String },
    TabClosed { tab: TabId },

    // Agent -> Coordinator
    /// Answered with `FilterState`.
    AgentReady { tab: TabId },
    ReportBlocked { count: u64 },

    // Coordinator -> Agent
    QueryPreview,
    SetPreview { enabled: bool },
    Refilter {
        extension_enabled: bool,
        profiles: Vec<Profile>,
    },
}

impl Request {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::PopupOpened { .. } => "PopupOpened",
            Request::PopupClosed { .. } => "PopupClosed",
            Request::Heartbeat { .. } => "Heartbeat",
            Request::LoadUserSettings => "LoadUserSettings",
            Request::SaveUserSettings { .. } => "SaveUserSettings",
            Request::ToggleExtension { .. } => "ToggleExtension",
            Request::GetExtensionState => "GetExtensionState",
            Request::GetBlockStats => "GetBlockStats",
            Request::GetProfiles => "GetProfiles",
            Request::CreateProfile { .. } => "CreateProfile",
            Request::UpdateProfile { .. } => "UpdateProfile",
            Request::DeleteProfile { .. } => "DeleteProfile",
            Request::ToggleProfile { .. } => "ToggleProfile",
            Request::ToggleDefaultProfile { .. } => "ToggleDefaultProfile",
            Request::ToggleDefaultGroup => "ToggleDefaultGroup",
            Request::GetPreviewState => "GetPreviewState",
            Request::TogglePreviewHidden { .. } => "TogglePreviewHidden",
            Request::SignOut => "SignOut",
            Request::TabActivated { .. } => "TabActivated",
            Request::TabClosed { .. } => "TabClosed",
            Request::AgentReady { .. } => "AgentReady",
            Request::ReportBlocked { .. } => "ReportBlocked",
            Request::QueryPreview => "QueryPreview",
            Request::SetPreview { .. } => "SetPreview",
            Request::Refilter { .. } => "Refilter",
        }
    }
}

/// Everything the popup needs to render after opening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub settings: GlobalSettings,
    pub profiles: Vec<Profile>,
    pub stats: BlockStats,
    pub user: Option<User>,
    /// Present when the snapshot was taken on popup open.
    pub resolution: Option<ResolutionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Response {
    Ack,
    Session(SessionSnapshot),
    Settings { settings: GlobalSettings },
    ExtensionState { enabled: bool },
    Profiles { profiles: Vec<Profile> },
    Stats { stats: BlockStats },
    /// `state` is None when the agent answered without one or never answered.
    Preview { state: Option<PreviewState> },
    /// What a freshly loaded agent filters with.
    FilterState {
        extension_enabled: bool,
        profiles: Vec<Profile>,
    },
    Failure(FailureReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Validation,
    NotFound,
    Persistence,
    Unreachable,
    Unsupported,
}

/// Structured failure returned instead of leaving the caller hanging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: FailureKind,
    pub messages: Vec<String>,
}

impl FailureReport {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            messages: vec![message.into()],
        }
    }
}

impl std::fmt::Display for FailureReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_value(Request::ToggleProfile {
            name: "Focus".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "TOGGLE_PROFILE");
        assert_eq!(json["name"], "Focus");

        let json = serde_json::to_value(Request::GetPreviewState).unwrap();
        assert_eq!(json["type"], "GET_PREVIEW_STATE");
    }

    #[test]
    fn test_payload_fields_are_camel_case() {
        let json = serde_json::to_value(Request::Refilter {
            extension_enabled: false,
            profiles: Vec::new(),
        })
        .unwrap();
        assert_eq!(json["type"], "REFILTER");
        assert_eq!(json["extensionEnabled"], false);
        assert!(json.get("extension_enabled").is_none());

        let resp: Response = serde_json::from_str(
            r#"{"type":"FILTER_STATE","extensionEnabled":true,"profiles":[]}"#,
        )
        .unwrap();
        assert_eq!(
            resp,
            Response::FilterState {
                extension_enabled: true,
                profiles: Vec::new()
            }
        );
    }

    #[test]
    fn test_preview_response_without_state() {
        let resp: Response = serde_json::from_str(r#"{"type":"PREVIEW","state":null}"#).unwrap();
        assert_eq!(resp, Response::Preview { state: None });
    }

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::Agent(TabId(7)).to_string(), "agent@tab7");
        assert_eq!(Endpoint::Popup(SessionId(2)).to_string(), "popup#2");
    }
}
