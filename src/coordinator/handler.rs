use super::BackgroundCoordinator;
use crate::bus::{Endpoint, FailureKind, FailureReport, MessageHandler, Request, Response};
use crate::engine::Profile;
use crate::error::CoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Bus-facing side of the coordinator. Every request gets a reply, failures included.
pub(crate) struct CoordinatorHandler {
    coordinator: Arc<BackgroundCoordinator>,
}

impl CoordinatorHandler {
    pub(crate) fn new(coordinator: Arc<BackgroundCoordinator>) -> Self {
        Self { coordinator }
    }

    async fn dispatch(&self, request: Request) -> Response {
        let c = &self.coordinator;
        match request {
            Request::PopupOpened { session } => Response::Session(c.popup_opened(session).await),
            Request::PopupClosed { session } => {
                c.popup_closed(session).await;
                Response::Ack
            }
            Request::Heartbeat { session } => {
                c.heartbeat(session).await;
                Response::Ack
            }
            Request::LoadUserSettings => Response::Session(c.snapshot(None).await),
            Request::SaveUserSettings { settings } => match c.save_settings(settings).await {
                Ok(settings) => Response::Settings { settings },
                Err(e) => failure("SaveUserSettings", &e),
            },
            Request::ToggleExtension { enabled } => match c.toggle_extension(enabled).await {
                Ok(enabled) => Response::ExtensionState { enabled },
                Err(e) => failure("ToggleExtension", &e),
            },
            Request::GetExtensionState => Response::ExtensionState {
                enabled: c.settings().extension_enabled,
            },
            Request::GetBlockStats => Response::Stats { stats: c.stats() },
            Request::GetProfiles => Response::Profiles {
                profiles: c.profiles().await,
            },
            Request::CreateProfile { draft } => match c.create_profile(&draft).await {
                Ok(committed) => Response::Profiles {
                    profiles: committed.profiles,
                },
                Err(e) => failure("CreateProfile", &e),
            },
            Request::UpdateProfile { name, draft } => match c.update_profile(&name, &draft).await {
                Ok(committed) => Response::Profiles {
                    profiles: committed.profiles,
                },
                Err(e) => failure("UpdateProfile", &e),
            },
            Request::DeleteProfile { name } => {
                profiles_or_failure("DeleteProfile", c.delete_profile(&name).await)
            }
            Request::ToggleProfile { name } => {
                profiles_or_failure("ToggleProfile", c.toggle_profile(&name).await)
            }
            Request::ToggleDefaultProfile { name } => profiles_or_failure(
                "ToggleDefaultProfile",
                c.toggle_default_profile(&name).await,
            ),
            Request::ToggleDefaultGroup => {
                profiles_or_failure("ToggleDefaultGroup", c.toggle_default_group().await)
            }
            Request::GetPreviewState => Response::Preview {
                state: c.query_preview().await,
            },
            Request::TogglePreviewHidden { enabled } => match c.toggle_preview(enabled).await {
                Ok(state) => Response::Preview { state },
                Err(report) => {
                    debug!("Preview toggle refused: {}", report);
                    Response::Failure(report)
                }
            },
            Request::SignOut => match c.sign_out().await {
                Ok(settings) => Response::Settings { settings },
                Err(e) => failure("SignOut", &e),
            },
            Request::TabActivated { tab, url } => {
                c.tab_activated(tab, &url).await;
                Response::Ack
            }
            Request::TabClosed { tab } => {
                c.tab_closed(tab).await;
                Response::Ack
            }
            Request::AgentReady { tab } => {
                let (extension_enabled, profiles) = c.agent_ready(tab).await;
                Response::FilterState {
                    extension_enabled,
                    profiles,
                }
            }
            Request::ReportBlocked { count } => {
                c.record_blocked(count);
                Response::Ack
            }
            Request::QueryPreview | Request::SetPreview { .. } | Request::Refilter { .. } => {
                Response::Failure(FailureReport::new(
                    FailureKind::Unsupported,
                    "request is addressed to page agents",
                ))
            }
        }
    }
}

fn failure(op: &str, err: &CoreError) -> Response {
    warn!("{} failed: {}", op, err);
    Response::Failure(FailureReport::from(err))
}

fn profiles_or_failure(op: &str, result: Result<Vec<Profile>, CoreError>) -> Response {
    match result {
        Ok(profiles) => Response::Profiles { profiles },
        Err(e) => failure(op, &e),
    }
}

#[async_trait]
impl MessageHandler for CoordinatorHandler {
    async fn handle(&self, from: Endpoint, request: Request) -> Option<Response> {
        let name = request.name();
        let start = Instant::now();
        let response = self.dispatch(request).await;
        debug!("{} from {} handled in {:?}", name, from, start.elapsed());
        Some(response)
    }
}
