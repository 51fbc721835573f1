use super::profile::Profile;
use super::state::GlobalSettings;
use super::traits::SiteResolver;
use url::Url;

/// Suffix-domain matcher for default profiles.
#[derive(Debug, Default, Clone, Copy)]
pub struct SiteMatcher;

/// Lower-cases and strips a single leading `www.`.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Normalized host of an http(s) tab URL. Restricted pages (`chrome://`, `about:`) yield None.
pub fn host_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(normalize_host)
}

impl SiteMatcher {
    /// True if any of the profile's websites equals the host or is a domain suffix of it.
    pub fn matches(&self, hostname: &str, profile: &Profile) -> bool {
        let host = normalize_host(hostname);
        if host.is_empty() {
            return false;
        }
        let entries: Vec<String> = profile
            .allowed_websites
            .iter()
            .map(|w| normalize_host(w))
            .filter(|w| !w.is_empty())
            .collect();

        // Iterative suffix match, one label at a time
        let mut part = host.as_str();
        loop {
            if entries.iter().any(|e| e == part) {
                return true;
            }

            // Strip leading label
            match part.find('.') {
                Some(idx) => {
                    part = &part[idx + 1..];
                    if part.is_empty() {
                        break;
                    }
                }
                None => break,
            }
        }

        false
    }

    /// Enabled profiles that apply on `hostname`, honouring the global switch.
    ///
    /// Non-default profiles without websites apply everywhere.
    pub fn effective_profiles<'a>(
        &self,
        hostname: &str,
        settings: &GlobalSettings,
        profiles: &'a [Profile],
    ) -> Vec<&'a Profile> {
        if !settings.extension_enabled {
            return Vec::new();
        }
        profiles
            .iter()
            .filter(|p| p.is_enabled)
            .filter(|p| {
                (!p.is_default && p.allowed_websites.is_empty()) || self.matches(hostname, p)
            })
            .collect()
    }
}

impl SiteResolver for SiteMatcher {
    fn find_match<'a>(&self, hostname: &str, profiles: &'a [Profile]) -> Option<&'a Profile> {
        profiles
            .iter()
            .filter(|p| p.is_default)
            .find(|p| self.matches(hostname, p))
    }

    fn resolve<'a>(&self, hostname: &str, profiles: &'a [Profile]) -> Option<&'a Profile> {
        self.find_match(hostname, profiles)
            .or_else(|| profiles.iter().find(|p| p.is_default))
    }
}
