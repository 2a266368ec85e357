//! Version-control abstraction layer
//!
//! The change workflow drives a working copy through the [VersionControl]
//! trait so it can run against a real checkout or a recording mock.
//!
//! - [repository::Git2Repository]: libgit2 checkout via the `git2` crate
//! - [mock::MockVersionControl]: in-memory recorder for tests
//!
//! ```rust
//! # use img_upgr::git::VersionControl;
//! # fn example<V: VersionControl>(vcs: &V) -> img_upgr::Result<()> {
//! let base = vcs.default_branch();
//! vcs.checkout(&base)?;
//! vcs.pull("origin", &base)?;
//! vcs.create_branch("img-upgr/web-20240101-120000")?;
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;

pub use mock::MockVersionControl;
pub use repository::Git2Repository;

use crate::error::Result;
use std::path::Path;

pub const DEFAULT_REMOTE: &str = "origin";

/// Branch used when the remote does not advertise one
pub const FALLBACK_BRANCH: &str = "main";

/// Working-copy operations the change workflow needs
///
/// Implementations map their native failures to
/// [crate::error::ImgUpgrError::Vcs] naming the operation, except
/// [VersionControl::commit] which reports an unchanged tree as
/// [crate::error::ImgUpgrError::NothingToCommit].
pub trait VersionControl: Send + Sync {
    /// Root of the working tree; manifest paths live below it
    fn workdir(&self) -> &Path;

    /// Switch to an existing branch, creating it from the remote-tracking
    /// branch when only that exists
    fn checkout(&self, branch: &str) -> Result<()>;

    /// Fetch `branch` from `remote` and fast-forward the local branch
    fn pull(&self, remote: &str, branch: &str) -> Result<()>;

    /// Create a branch at HEAD and switch to it
    fn create_branch(&self, name: &str) -> Result<()>;

    /// Stage every change in the working tree, deletions included
    fn add_all(&self) -> Result<()>;

    /// Commit the index on top of HEAD
    ///
    /// # Returns
    /// * `Err(NothingToCommit)` - if the index matches HEAD
    fn commit(&self, message: &str) -> Result<()>;

    /// Push the current branch to the same name on `remote`
    fn push_head(&self, remote: &str) -> Result<()>;

    /// Name of the checked-out branch, or `HEAD` when detached
    fn current_branch(&self) -> Result<String>;

    /// Default branch of the remote
    ///
    /// Tries the remote's advertised HEAD, then the local
    /// `refs/remotes/origin/HEAD` symbolic ref, then [FALLBACK_BRANCH].
    /// Never fails.
    fn default_branch(&self) -> String;

    /// Paths with uncommitted changes, untracked files included
    fn status(&self) -> Result<Vec<String>>;

    fn has_changes(&self) -> Result<bool> {
        Ok(!self.status()?.is_empty())
    }
}
