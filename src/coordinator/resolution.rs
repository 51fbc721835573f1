//! Automatic selection of the default profile for the active site.

use super::BackgroundCoordinator;
use crate::engine::SiteApplication;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Per-event progress of auto-resolution. Always ends back at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionPhase {
    Idle,
    Resolving,
    Applying,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ResolutionOutcome {
    /// Power-user mode: the user picks profiles by hand.
    Skipped,
    /// No active tab, or the tab is not an http(s) page.
    NoActiveSite,
    NoMatch { hostname: String },
    AlreadyApplied { profile: String },
    /// `persisted` is false when the durable write failed; the in-memory list still
    /// carries the change and the next successful save writes it.
    Applied { profile: String, persisted: bool },
}

impl BackgroundCoordinator {
    /// Resolves the active tab's hostname against the default profiles and applies a
    /// match. Persisted without a refilter broadcast, so the page doesn't flash.
    pub async fn auto_resolve(&self) -> ResolutionOutcome {
        let Some(hostname) = self.active_hostname() else {
            debug!("Auto-resolution skipped: no active site");
            return ResolutionOutcome::NoActiveSite;
        };

        let mut store = self.store.lock().await;
        self.set_phase(ResolutionPhase::Resolving);

        let mut next = store.clone();
        let outcome = match next.apply_site_match(&hostname, &self.matcher) {
            SiteApplication::NoMatch => {
                debug!("No default profile matches {}", hostname);
                ResolutionOutcome::NoMatch { hostname }
            }
            SiteApplication::AlreadyApplied(profile) => {
                ResolutionOutcome::AlreadyApplied { profile }
            }
            SiteApplication::Applied(profile) => {
                self.set_phase(ResolutionPhase::Applying);
                let persisted = match self.persist_profiles(next.profiles()).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Auto-selected profile '{}' not persisted: {:#}", profile, e);
                        false
                    }
                };
                *store = next;
                info!("Auto-selected default profile '{}' for {}", profile, hostname);
                ResolutionOutcome::Applied { profile, persisted }
            }
        };

        self.set_phase(ResolutionPhase::Idle);
        outcome
    }

    fn set_phase(&self, phase: ResolutionPhase) {
        self.phase.send_replace(phase);
    }
}
