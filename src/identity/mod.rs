//! Client identities and the directory that serves their permissions.
//! Keep the public surface thin and split implementation across sub-modules.

mod principal;
mod directory;

pub use principal::{AccessType, ClientIdentity};
pub use directory::{CachedDirectory, Directory, DirectoryError, InMemoryDirectory};
