//! Interface to the local package manager.
//!
//! [`PackageBackend`] is what the catalog consumes; listing, searching and
//! downgrading are implemented elsewhere (e.g. by shelling out to the package
//! manager). Implement this trait to plug in a different backend without
//! touching the catalog.

use std::collections::HashSet;

use crate::error::BackendError;
use crate::record::RawPackage;

/// Output lines of a running downgrade, as produced by the package manager.
pub type DowngradeStream = Box<dyn Iterator<Item = String> + Send>;

pub trait PackageBackend: Send + Sync {
    /// Every package currently installed, dependencies included.
    fn list_installed(&self) -> Result<Vec<RawPackage>, BackendError>;

    /// Packages matching `term` in the configured remotes.
    fn search(&self, term: &str) -> Result<Vec<RawPackage>, BackendError>;

    /// Ids of installed packages with a pending update.
    fn list_available_update_ids(&self) -> Result<HashSet<String>, BackendError>;

    /// Commit ids of `reference` on `origin`, newest first.
    fn get_commit_history(&self, reference: &str, origin: &str)
    -> Result<Vec<String>, BackendError>;

    /// Move `reference` to `commit`. `credential` authorises the operation.
    fn downgrade(
        &self,
        reference: &str,
        commit: &str,
        credential: &str,
    ) -> Result<DowngradeStream, BackendError>;
}
