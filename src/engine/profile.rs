use crate::config::{default_colour, default_websites, ProfileDefaultsConfig};
use crate::error::FieldError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A named filtering profile as persisted under the `profiles` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    pub colour: String,
    #[serde(default)]
    pub whitelist_tags: BTreeSet<String>,
    #[serde(default)]
    pub blacklist_tags: BTreeSet<String>,
    /// Bare domains, normalized, in insertion order.
    #[serde(default)]
    pub allowed_websites: Vec<String>,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_default: bool,
}

/// Which tag list a draft edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagList {
    Whitelist,
    Blacklist,
}

/// Unvalidated, in-progress copy of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftProfile {
    pub name: String,
    pub colour: String,
    #[serde(default)]
    pub whitelist_tags: BTreeSet<String>,
    #[serde(default)]
    pub blacklist_tags: BTreeSet<String>,
    #[serde(default)]
    pub allowed_websites: Vec<String>,
    #[serde(default = "enabled_by_default")]
    pub is_enabled: bool,
    #[serde(default)]
    pub is_default: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl Default for DraftProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            colour: default_colour(),
            whitelist_tags: BTreeSet::new(),
            blacklist_tags: BTreeSet::new(),
            allowed_websites: default_websites(),
            is_enabled: true,
            is_default: false,
        }
    }
}

impl DraftProfile {
    pub fn with_defaults(defaults: &ProfileDefaultsConfig) -> Self {
        Self {
            colour: defaults.default_colour.clone(),
            allowed_websites: defaults.default_websites.clone(),
            ..Self::default()
        }
    }

    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            colour: profile.colour.clone(),
            whitelist_tags: profile.whitelist_tags.clone(),
            blacklist_tags: profile.blacklist_tags.clone(),
            allowed_websites: profile.allowed_websites.clone(),
            is_enabled: profile.is_enabled,
            is_default: profile.is_default,
        }
    }

    /// Adds a tag, ignoring blanks. Returns false when nothing changed.
    pub fn add_tag(&mut self, list: TagList, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() {
            return false;
        }
        self.tags_mut(list).insert(tag.to_string())
    }

    pub fn remove_tag(&mut self, list: TagList, tag: &str) -> bool {
        self.tags_mut(list).remove(tag.trim())
    }

    /// Adds the website if absent, removes it otherwise. Returns whether it is now present.
    pub fn toggle_website(&mut self, website: &str) -> bool {
        let Some(domain) = normalize_website(website) else {
            return false;
        };
        if let Some(idx) = self
            .allowed_websites
            .iter()
            .position(|w| normalize_website(w).as_deref() == Some(domain.as_str()))
        {
            self.allowed_websites.remove(idx);
            false
        } else {
            self.allowed_websites.push(domain);
            true
        }
    }

    fn tags_mut(&mut self, list: TagList) -> &mut BTreeSet<String> {
        match list {
            TagList::Whitelist => &mut self.whitelist_tags,
            TagList::Blacklist => &mut self.blacklist_tags,
        }
    }

    /// Field-level checks that don't depend on other profiles.
    pub(crate) fn check_fields(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(FieldError::new("name", "must not be empty"));
        }
        if !is_valid_colour(&self.colour) {
            errors.push(FieldError::new(
                "colour",
                format!("'{}' is not a #rgb or #rrggbb colour", self.colour),
            ));
        }
        if self.is_default && normalized_websites(&self.allowed_websites).is_empty() {
            errors.push(FieldError::new(
                "allowedWebsites",
                "default profiles need at least one website",
            ));
        }
        errors
    }
}

impl Profile {
    /// Builds the committed form of a draft. Callers validate first.
    pub fn from_draft(draft: &DraftProfile) -> Self {
        let colour = draft.colour.trim().to_lowercase();
        Self {
            name: draft.name.trim().to_string(),
            colour: if colour.is_empty() {
                default_colour()
            } else {
                colour
            },
            whitelist_tags: draft.whitelist_tags.clone(),
            blacklist_tags: draft.blacklist_tags.clone(),
            allowed_websites: normalized_websites(&draft.allowed_websites),
            is_enabled: draft.is_enabled,
            is_default: draft.is_default,
        }
    }
}

/// Empty means "use the default colour"; otherwise `#rgb` or `#rrggbb`.
pub fn is_valid_colour(colour: &str) -> bool {
    let colour = colour.trim();
    if colour.is_empty() {
        return true;
    }
    match colour.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Reduces user input like `https://www.Example.com/path` to `example.com`.
pub fn normalize_website(input: &str) -> Option<String> {
    let mut rest = input.trim().to_lowercase();
    if let Some(idx) = rest.find("://") {
        rest = rest[idx + 3..].to_string();
    }
    let end = rest.find(&['/', '?', '#', ':'][..]).unwrap_or(rest.len());
    rest.truncate(end);
    let rest = rest.strip_prefix("www.").unwrap_or(rest.as_str());
    let rest = rest.trim_end_matches('.');
    if rest.is_empty() {
        None
    } else {
        Some(rest.to_string())
    }
}

fn normalized_websites(websites: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(websites.len());
    for site in websites.iter().filter_map(|w| normalize_website(w)) {
        if !out.contains(&site) {
            out.push(site);
        }
    }
    out
}
