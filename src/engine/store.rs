use super::profile::{DraftProfile, Profile};
use super::traits::SiteResolver;
use crate::error::{CoreError, FieldError};
use serde::{Deserialize, Serialize};

/// Ordered list of profiles. Pure data: every mutation returns the full list
/// and persisting it is the caller's job.
///
/// Invariant: at most one default profile is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileStore {
    profiles: Vec<Profile>,
}

/// Result of a create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub profile: Profile,
    pub profiles: Vec<Profile>,
}

/// What `apply_site_match` did to the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "profile", rename_all = "camelCase")]
pub enum SiteApplication {
    NoMatch,
    AlreadyApplied(String),
    Applied(String),
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_profiles(profiles: Vec<Profile>) -> Self {
        let mut store = Self::new();
        store.replace_all(profiles);
        store
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn any_default_enabled(&self) -> bool {
        self.profiles.iter().any(|p| p.is_default && p.is_enabled)
    }

    pub fn enabled_default(&self) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.is_default && p.is_enabled)
    }

    /// Loads a list wholesale. Duplicate names keep their first entry and extra
    /// enabled defaults are switched off. Returns how many entries were repaired.
    pub fn replace_all(&mut self, profiles: Vec<Profile>) -> usize {
        let mut repaired = 0;
        let mut seen_enabled_default = false;
        self.profiles.clear();
        for mut profile in profiles {
            if self.get(&profile.name).is_some() {
                repaired += 1;
                continue;
            }
            if profile.is_default && profile.is_enabled {
                if seen_enabled_default {
                    profile.is_enabled = false;
                    repaired += 1;
                }
                seen_enabled_default = true;
            }
            self.profiles.push(profile);
        }
        repaired
    }

    /// Validates a draft against the current list. `editing` names the profile being
    /// replaced, which may keep its own name.
    pub fn validate(&self, draft: &DraftProfile, editing: Option<&str>) -> Result<(), CoreError> {
        let mut errors = draft.check_fields();
        let name = draft.name.trim();
        if !name.is_empty() && Some(name) != editing && self.get(name).is_some() {
            errors.push(FieldError::new(
                "name",
                format!("a profile named '{}' already exists", name),
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Validation(errors))
        }
    }

    pub fn create(&mut self, draft: &DraftProfile) -> Result<Committed, CoreError> {
        self.validate(draft, None)?;
        let profile = Profile::from_draft(draft);
        self.profiles.push(profile.clone());
        if profile.is_default && profile.is_enabled {
            self.disable_other_defaults(&profile.name);
        }
        Ok(self.committed(profile))
    }

    pub fn update(&mut self, name: &str, draft: &DraftProfile) -> Result<Committed, CoreError> {
        let idx = self.index_of(name)?;
        self.validate(draft, Some(name))?;
        let profile = Profile::from_draft(draft);
        self.profiles[idx] = profile.clone();
        if profile.is_default && profile.is_enabled {
            self.disable_other_defaults(&profile.name);
        }
        Ok(self.committed(profile))
    }

    pub fn delete(&mut self, name: &str) -> Result<Vec<Profile>, CoreError> {
        let idx = self.index_of(name)?;
        self.profiles.remove(idx);
        Ok(self.profiles.clone())
    }

    /// Idempotent. Enabling a default profile disables every other default.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<Vec<Profile>, CoreError> {
        let idx = self.index_of(name)?;
        self.profiles[idx].is_enabled = enabled;
        if enabled && self.profiles[idx].is_default {
            self.disable_other_defaults(name);
        }
        Ok(self.profiles.clone())
    }

    pub fn toggle(&mut self, name: &str) -> Result<Vec<Profile>, CoreError> {
        let idx = self.index_of(name)?;
        let enabled = !self.profiles[idx].is_enabled;
        self.set_enabled(name, enabled)
    }

    /// Flips a default profile: enabling it switches the others off, disabling it
    /// enables nothing else.
    pub fn toggle_default(&mut self, name: &str) -> Result<Vec<Profile>, CoreError> {
        let idx = self.index_of(name)?;
        if !self.profiles[idx].is_default {
            return Err(CoreError::Validation(vec![FieldError::new(
                "isDefault",
                format!("'{}' is not a default profile", name),
            )]));
        }
        self.toggle(name)
    }

    pub fn disable_defaults(&mut self) -> Vec<Profile> {
        for profile in self.profiles.iter_mut().filter(|p| p.is_default) {
            profile.is_enabled = false;
        }
        self.profiles.clone()
    }

    /// Makes the default profile matching `hostname` the only enabled default.
    pub fn apply_site_match(
        &mut self,
        hostname: &str,
        resolver: &dyn SiteResolver,
    ) -> SiteApplication {
        let Some(name) = resolver
            .find_match(hostname, &self.profiles)
            .map(|p| p.name.clone())
        else {
            return SiteApplication::NoMatch;
        };

        let sole_enabled = self
            .profiles
            .iter()
            .filter(|p| p.is_default && p.is_enabled)
            .all(|p| p.name == name)
            && self.get(&name).is_some_and(|p| p.is_enabled);
        if sole_enabled {
            return SiteApplication::AlreadyApplied(name);
        }

        self.disable_other_defaults(&name);
        if let Some(profile) = self.profiles.iter_mut().find(|p| p.name == name) {
            profile.is_enabled = true;
        }
        SiteApplication::Applied(name)
    }

    fn disable_other_defaults(&mut self, keep: &str) {
        for profile in self
            .profiles
            .iter_mut()
            .filter(|p| p.is_default && p.name != keep)
        {
            profile.is_enabled = false;
        }
    }

    fn index_of(&self, name: &str) -> Result<usize, CoreError> {
        self.profiles
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| CoreError::NotFound(name.to_string()))
    }

    fn committed(&self, profile: Profile) -> Committed {
        Committed {
            profile,
            profiles: self.profiles.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::matcher::SiteMatcher;

    fn draft(name: &str, is_default: bool, sites: &[&str], enabled: bool) -> DraftProfile {
        DraftProfile {
            name: name.to_string(),
            allowed_websites: sites.iter().map(|s| s.to_string()).collect(),
            is_default,
            is_enabled: enabled,
            ..DraftProfile::default()
        }
    }

    fn enabled_defaults(store: &ProfileStore) -> Vec<String> {
        store
            .profiles()
            .iter()
            .filter(|p| p.is_default && p.is_enabled)
            .map(|p| p.name.clone())
            .collect()
    }

    #[test]
    fn test_create_rejects_empty_and_duplicate_names() {
        let mut store = ProfileStore::new();
        store.create(&draft("A", false, &[], true)).unwrap();

        let err = store.create(&draft("", false, &[], true)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = store.create(&draft("A", false, &[], true)).unwrap_err();
        match err {
            CoreError::Validation(fields) => assert_eq!(fields[0].field, "name"),
            other => panic!("unexpected error: {:?}", other),
        }

        // Case-sensitive uniqueness
        assert!(store.create(&draft("a", false, &[], true)).is_ok());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_default_profile_requires_websites() {
        let mut store = ProfileStore::new();
        let err = store.create(&draft("D", true, &[], true)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_create_then_update_round_trip() {
        let mut store = ProfileStore::new();
        let d = draft("Focus", false, &["www.youtube.com", "reddit.com"], true);
        store.create(&d).unwrap();
        let committed = store.update("Focus", &d).unwrap();

        assert_eq!(committed.profile, Profile::from_draft(&d));
        assert_eq!(store.get("Focus"), Some(&Profile::from_draft(&d)));
        assert_eq!(committed.profiles.len(), 1);
    }

    #[test]
    fn test_update_missing_and_rename_collision() {
        let mut store = ProfileStore::new();
        store.create(&draft("A", false, &[], true)).unwrap();
        store.create(&draft("B", false, &[], true)).unwrap();

        let err = store.update("Z", &draft("Z", false, &[], true)).unwrap_err();
        assert_eq!(err, CoreError::NotFound("Z".to_string()));

        let err = store.update("A", &draft("B", false, &[], true)).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let committed = store.update("A", &draft("C", false, &[], false)).unwrap();
        assert_eq!(committed.profiles[0].name, "C");
        assert!(store.get("A").is_none());
    }

    #[test]
    fn test_delete() {
        let mut store = ProfileStore::new();
        store.create(&draft("A", false, &[], true)).unwrap();
        assert!(store.delete("A").unwrap().is_empty());
        assert_eq!(store.delete("A"), Err(CoreError::NotFound("A".to_string())));
    }

    #[test]
    fn test_set_enabled_is_idempotent() {
        let mut store = ProfileStore::new();
        store.create(&draft("A", false, &[], false)).unwrap();
        store.set_enabled("A", true).unwrap();
        let profiles = store.set_enabled("A", true).unwrap();
        let named_a: Vec<_> = profiles.iter().filter(|p| p.name == "A").collect();
        assert_eq!(named_a.len(), 1);
        assert!(named_a[0].is_enabled);
    }

    #[test]
    fn test_default_profiles_are_exclusive() {
        let mut store = ProfileStore::new();
        store.create(&draft("P1", true, &["youtube.com"], true)).unwrap();
        store.create(&draft("P2", true, &["reddit.com"], true)).unwrap();
        store.create(&draft("Custom", false, &[], true)).unwrap();
        assert_eq!(enabled_defaults(&store), vec!["P2"]);

        store.toggle_default("P1").unwrap();
        assert_eq!(enabled_defaults(&store), vec!["P1"]);
        assert!(store.get("Custom").unwrap().is_enabled);

        // Disabling the active default enables nothing else
        store.toggle_default("P1").unwrap();
        assert!(enabled_defaults(&store).is_empty());

        assert!(matches!(
            store.toggle_default("Custom"),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_non_default_toggles_are_independent() {
        let mut store = ProfileStore::new();
        store.create(&draft("P1", true, &["youtube.com"], true)).unwrap();
        store.create(&draft("A", false, &[], false)).unwrap();
        store.create(&draft("B", false, &[], true)).unwrap();

        store.toggle("A").unwrap();
        assert!(store.get("A").unwrap().is_enabled);
        assert!(store.get("B").unwrap().is_enabled);
        assert!(store.get("P1").unwrap().is_enabled);

        store.toggle("B").unwrap();
        assert!(store.get("A").unwrap().is_enabled);
        assert!(!store.get("B").unwrap().is_enabled);
    }

    #[test]
    fn test_apply_site_match_scenario() {
        let mut store = ProfileStore::new();
        store.create(&draft("P1", true, &["youtube.com"], false)).unwrap();
        store.create(&draft("P2", true, &["reddit.com"], true)).unwrap();

        let applied = store.apply_site_match("m.youtube.com", &SiteMatcher);
        assert_eq!(applied, SiteApplication::Applied("P1".to_string()));
        assert_eq!(enabled_defaults(&store), vec!["P1"]);

        let again = store.apply_site_match("m.youtube.com", &SiteMatcher);
        assert_eq!(again, SiteApplication::AlreadyApplied("P1".to_string()));

        assert_eq!(
            store.apply_site_match("github.com", &SiteMatcher),
            SiteApplication::NoMatch
        );
        assert_eq!(enabled_defaults(&store), vec!["P1"]);
    }

    #[test]
    fn test_replace_all_repairs_invariant() {
        let p1 = Profile::from_draft(&draft("P1", true, &["a.com"], true));
        let p2 = Profile::from_draft(&draft("P2", true, &["b.com"], true));
        let dup = Profile::from_draft(&draft("P1", false, &[], false));
        let mut store = ProfileStore::new();
        assert_eq!(store.replace_all(vec![p1, p2, dup]), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(enabled_defaults(&store), vec!["P1"]);
    }
}
