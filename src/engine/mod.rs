mod matcher;
pub mod profile;
pub mod state;
pub mod store;
mod traits;

pub use matcher::{host_from_url, normalize_host, SiteMatcher};
pub use profile::{DraftProfile, Profile, TagList};
pub use state::{ExtensionState, GlobalSettings, PreviewState};
pub use store::{Committed, ProfileStore, SiteApplication};
pub use traits::SiteResolver;
