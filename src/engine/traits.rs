use super::profile::Profile;

/// Maps a hostname to the default profile that should apply there.
///
/// Implementations are pure: same inputs, same answer, no mutation.
pub trait SiteResolver: Send + Sync {
    /// First default profile whose websites cover `hostname`, in list order.
    fn find_match<'a>(&self, hostname: &str, profiles: &'a [Profile]) -> Option<&'a Profile>;

    /// Like `find_match`, falling back to the first default profile.
    fn resolve<'a>(&self, hostname: &str, profiles: &'a [Profile]) -> Option<&'a Profile>;
}
