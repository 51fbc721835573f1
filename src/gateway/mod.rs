//! External collaborators: durable storage and the signed-in identity.

mod file;
mod identity;
mod memory;
mod source;

pub use file::FileGateway;
pub use identity::{IdentityProvider, StoredIdentity, Tier, User};
pub use memory::MemoryGateway;
pub use source::{PersistenceGateway, PROFILES_KEY, SESSION_KEY, SETTINGS_KEY, USER_KEY};
