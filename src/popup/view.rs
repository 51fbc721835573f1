//! Popup-side view model. A cache of coordinator state, never the source of truth.

use super::preview::PreviewSnapshot;
use crate::bus::SessionSnapshot;
use crate::config::ProfileDefaultsConfig;
use crate::coordinator::ResolutionOutcome;
use crate::engine::{DraftProfile, GlobalSettings, Profile};
use crate::error::{ClientError, FieldError};
use crate::gateway::User;
use crate::stats::BlockStats;
use std::sync::Arc;
use tokio::sync::RwLock;

/// View state shared between the session, the preview controller and the heartbeat.
pub type SharedView = Arc<RwLock<ControlPanelState>>;

/// A value shown optimistically while a request is in flight.
///
/// `displayed` returns the tentative value until it is confirmed or rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending<T> {
    confirmed: T,
    tentative: Option<T>,
}

impl<T: Clone> Pending<T> {
    pub fn new(value: T) -> Self {
        Self {
            confirmed: value,
            tentative: None,
        }
    }

    pub fn begin(&mut self, value: T) {
        self.tentative = Some(value);
    }

    pub fn confirm(&mut self, value: T) {
        self.confirmed = value;
        self.tentative = None;
    }

    pub fn rollback(&mut self) {
        self.tentative = None;
    }

    pub fn displayed(&self) -> T {
        self.tentative
            .clone()
            .unwrap_or_else(|| self.confirmed.clone())
    }

    pub fn confirmed(&self) -> T {
        self.confirmed.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.tentative.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewView {
    pub toggle: Pending<bool>,
    pub hidden_count: u64,
    /// False while filtering is disabled; the toggle is shown off and locked.
    pub interactive: bool,
}

impl Default for PreviewView {
    fn default() -> Self {
        Self {
            toggle: Pending::new(false),
            hidden_count: 0,
            interactive: true,
        }
    }
}

impl PreviewView {
    pub fn apply(&mut self, snapshot: &PreviewSnapshot) {
        self.toggle.confirm(snapshot.enabled);
        self.hidden_count = snapshot.hidden_count;
        self.interactive = snapshot.extension_enabled;
    }

    pub fn snapshot(&self) -> PreviewSnapshot {
        PreviewSnapshot {
            enabled: self.toggle.displayed(),
            hidden_count: self.hidden_count,
            extension_enabled: self.interactive,
        }
    }
}

/// A profile being created (`editing == None`) or edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEditor {
    pub editing: Option<String>,
    pub draft: DraftProfile,
    original: DraftProfile,
}

impl ProfileEditor {
    pub fn create(defaults: &ProfileDefaultsConfig) -> Self {
        let draft = DraftProfile::with_defaults(defaults);
        Self {
            editing: None,
            original: draft.clone(),
            draft,
        }
    }

    pub fn edit(profile: &Profile) -> Self {
        let draft = DraftProfile::from_profile(profile);
        Self {
            editing: Some(profile.name.clone()),
            original: draft.clone(),
            draft,
        }
    }

    pub fn original(&self) -> &DraftProfile {
        &self.original
    }

    pub fn is_dirty(&self) -> bool {
        self.draft != self.original
    }

    /// Discards edits back to the state the editor was opened with.
    pub fn reset(&mut self) {
        self.draft = self.original.clone();
    }

    pub fn field_errors(&self) -> Vec<FieldError> {
        self.draft.check_fields()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlPanelState {
    pub settings: GlobalSettings,
    pub profiles: Vec<Profile>,
    pub stats: BlockStats,
    pub user: Option<User>,
    pub preview: PreviewView,
    pub editor: Option<ProfileEditor>,
    pub last_error: Option<String>,
    pub resolution: Option<ResolutionOutcome>,
}

impl ControlPanelState {
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let mut state = Self::default();
        state.apply_snapshot(snapshot);
        state
    }

    pub fn apply_snapshot(&mut self, snapshot: SessionSnapshot) {
        self.settings = snapshot.settings;
        self.profiles = snapshot.profiles;
        self.merge_stats(snapshot.stats);
        self.user = snapshot.user;
        if snapshot.resolution.is_some() {
            self.resolution = snapshot.resolution;
        }
        self.preview.interactive = self.settings.extension_enabled;
    }

    pub fn set_profiles(&mut self, profiles: Vec<Profile>) {
        self.profiles = profiles;
    }

    /// Counters only move forward, even if a stale reply arrives late.
    pub fn merge_stats(&mut self, stats: BlockStats) {
        self.stats.blocked_today = self.stats.blocked_today.max(stats.blocked_today);
        self.stats.total_blocked = self.stats.total_blocked.max(stats.total_blocked);
    }

    /// The customization switch is locked off unless a premium user is signed in.
    pub fn customization_locked(&self) -> bool {
        !self.user.as_ref().is_some_and(|u| u.is_premium())
    }

    pub fn profile(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn record_error(&mut self, err: &ClientError) {
        self.last_error = Some(err.to_string());
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Tier;

    #[test]
    fn test_pending_begin_confirm_rollback() {
        let mut p = Pending::new(false);
        p.begin(true);
        assert!(p.displayed());
        assert!(!p.confirmed());
        p.rollback();
        assert!(!p.displayed());
        assert!(!p.is_pending());

        p.begin(true);
        p.confirm(true);
        assert!(p.displayed() && p.confirmed());
    }

    #[test]
    fn test_editor_reset_restores_original() {
        let mut editor = ProfileEditor::create(&ProfileDefaultsConfig::default());
        editor.draft.name = "Study".to_string();
        assert!(editor.is_dirty());
        editor.reset();
        assert!(!editor.is_dirty());
        assert!(editor.draft.name.is_empty());
        assert_eq!(editor.field_errors().len(), 1);
    }

    #[test]
    fn test_stats_never_go_backwards() {
        let mut state = ControlPanelState::default();
        state.merge_stats(BlockStats {
            blocked_today: 5,
            total_blocked: 40,
        });
        state.merge_stats(BlockStats {
            blocked_today: 3,
            total_blocked: 41,
        });
        assert_eq!(state.stats.blocked_today, 5);
        assert_eq!(state.stats.total_blocked, 41);
    }

    #[test]
    fn test_customization_needs_premium() {
        let mut state = ControlPanelState::default();
        assert!(state.customization_locked());

        state.user = Some(User {
            id: "u1".to_string(),
            email: "a@b.c".to_string(),
            tier: Tier::Free,
        });
        assert!(state.customization_locked());

        state.user.as_mut().unwrap().tier = Tier::Premium;
        assert!(!state.customization_locked());
    }
}
