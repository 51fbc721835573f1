use super::client::CoordinatorClient;
use super::view::SharedView;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What the popup shows for the preview overlay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewSnapshot {
    pub enabled: bool,
    pub hidden_count: u64,
    pub extension_enabled: bool,
}

/// Keeps the popup's preview toggle consistent with the page agent's overlay.
#[derive(Clone)]
pub struct PreviewSyncController {
    client: CoordinatorClient,
    view: SharedView,
}

impl PreviewSyncController {
    pub fn new(client: CoordinatorClient, view: SharedView) -> Self {
        Self { client, view }
    }

    /// Reads agent state and the global switch concurrently. Never fails: an absent
    /// agent reads as `{false, 0}` and an unreachable coordinator as "enabled".
    pub async fn sync(&self) -> PreviewSnapshot {
        let (preview, enabled) =
            tokio::join!(self.client.preview_state(), self.client.extension_enabled());

        let extension_enabled = match enabled {
            Ok(enabled) => Some(enabled),
            Err(e) => {
                debug!("Extension state unavailable, assuming enabled: {}", e);
                None
            }
        };
        let agent = match preview {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                debug!("Preview state unavailable: {}", e);
                Default::default()
            }
        };

        let active = extension_enabled.unwrap_or(true);
        let snapshot = PreviewSnapshot {
            enabled: active && agent.enabled,
            hidden_count: agent.hidden_count,
            extension_enabled: active,
        };

        let mut view = self.view.write().await;
        if let Some(enabled) = extension_enabled {
            view.settings.extension_enabled = enabled;
        }
        view.preview.apply(&snapshot);
        snapshot
    }

    /// Shows `desired` at once and confirms it with the agent. Any failure rolls the
    /// toggle back and re-reads the real state.
    pub async fn request_toggle(&self, desired: bool) -> PreviewSnapshot {
        {
            let mut view = self.view.write().await;
            if !view.preview.interactive {
                debug!("Preview toggle ignored while filtering is disabled");
                return view.preview.snapshot();
            }
            view.preview.toggle.begin(desired);
        }

        match self.client.toggle_preview(desired).await {
            Ok(state) => {
                let mut view = self.view.write().await;
                view.preview
                    .toggle
                    .confirm(state.map(|s| s.enabled).unwrap_or(desired));
                if let Some(state) = state {
                    view.preview.hidden_count = state.hidden_count;
                }
                view.preview.snapshot()
            }
            Err(e) => {
                warn!("Preview toggle failed: {}", e);
                {
                    let mut view = self.view.write().await;
                    view.preview.toggle.rollback();
                    view.record_error(&e);
                }
                self.sync().await
            }
        }
    }
}
