use crate::config::GitLabConfig;
use crate::error::{ImgUpgrError, Result};
use crate::git::{VersionControl, DEFAULT_REMOTE, FALLBACK_BRANCH};
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, CredentialType, Direction, ErrorCode, FetchOptions, IndexAddOption,
    PushOptions, RemoteCallbacks, Repository, StatusOptions,
};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// libgit2 asks again after a rejected credential; stop instead of looping
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Credentials offered to the remote for fetch, push and clone
#[derive(Debug, Clone, Default)]
struct Credentials {
    username: Option<String>,
    token: Option<String>,
}

impl Credentials {
    fn from_gitlab(gitlab: &GitLabConfig) -> Self {
        Credentials {
            username: gitlab.user.clone(),
            token: gitlab.token.clone(),
        }
    }
}

fn vcs_err(operation: &'static str) -> impl Fn(git2::Error) -> ImgUpgrError {
    move |e| ImgUpgrError::vcs(operation, e.message())
}

/// Like [vcs_err], but a transfer aborted by `cancel` maps to
/// [ImgUpgrError::Cancelled]
fn transfer_err<'a>(
    operation: &'static str,
    cancel: &'a CancellationToken,
) -> impl Fn(git2::Error) -> ImgUpgrError + 'a {
    move |e| {
        if cancel.is_cancelled() {
            ImgUpgrError::Cancelled
        } else {
            ImgUpgrError::vcs(operation, e.message())
        }
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ImgUpgrError::Cancelled);
    }
    Ok(())
}

/// Token over HTTPS first, then SSH keys and the agent, then libgit2 defaults
///
/// Progress callbacks return false once `cancel` fires, which makes libgit2
/// abort the transfer.
fn remote_callbacks<'a>(
    credentials: &'a Credentials,
    cancel: &'a CancellationToken,
) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    let mut attempts = 0;

    callbacks.transfer_progress(move |_| !cancel.is_cancelled());
    callbacks.sideband_progress(move |_| !cancel.is_cancelled());

    callbacks.credentials(move |_url, username_from_url, allowed_types| {
        if cancel.is_cancelled() {
            return Err(git2::Error::from_str("cancelled"));
        }
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication rejected by remote"));
        }

        if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let (Some(user), Some(token)) = (&credentials.username, &credentials.token) {
                return Cred::userpass_plaintext(user, token);
            }
        }

        if allowed_types.contains(CredentialType::SSH_KEY) {
            let user = username_from_url.unwrap_or("git");
            if let Some(home) = dirs::home_dir() {
                for key in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                    let path = home.join(".ssh").join(key);
                    if path.exists() {
                        if let Ok(cred) = Cred::ssh_key(user, None, &path, None) {
                            return Ok(cred);
                        }
                    }
                }
            }
            if let Ok(cred) = Cred::ssh_key_from_agent(user) {
                return Ok(cred);
            }
        }

        Cred::default()
    });

    callbacks
}

/// A working copy driven through libgit2
///
/// The repository handle sits behind a mutex so the gateway can be shared
/// with the async workflow. Fetches and pushes stop when `cancel` fires.
pub struct Git2Repository {
    repo: Mutex<Repository>,
    workdir: PathBuf,
    credentials: Credentials,
    cancel: CancellationToken,
}

impl Git2Repository {
    /// Open or discover an existing working copy
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::discover(path).map_err(vcs_err("open"))?;
        Self::from_git2(repo, Credentials::default(), CancellationToken::new())
    }

    /// Clone `url` into `dir` and configure the commit identity
    ///
    /// `user.name` and `user.email` are written to the checkout's own
    /// config when the GitLab settings carry them. `cancel` aborts the
    /// clone and every later fetch or push through this handle.
    pub fn clone_into(
        url: &str,
        dir: &Path,
        gitlab: &GitLabConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        ensure_not_cancelled(cancel)?;
        let credentials = Credentials::from_gitlab(gitlab);
        info!(dir = %dir.display(), "cloning repository");

        let repo = {
            let mut fetch_options = FetchOptions::new();
            fetch_options.remote_callbacks(remote_callbacks(&credentials, cancel));
            RepoBuilder::new()
                .fetch_options(fetch_options)
                .clone(url, dir)
                .map_err(transfer_err("clone", cancel))?
        };

        {
            let mut config = repo.config().map_err(vcs_err("config"))?;
            if let Some(user) = &gitlab.user {
                config
                    .set_str("user.name", user)
                    .map_err(vcs_err("config"))?;
            }
            if let Some(email) = &gitlab.email {
                config
                    .set_str("user.email", email)
                    .map_err(vcs_err("config"))?;
            }
        }

        Self::from_git2(repo, credentials, cancel.clone())
    }

    fn from_git2(
        repo: Repository,
        credentials: Credentials,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let workdir = repo
            .workdir()
            .ok_or_else(|| ImgUpgrError::vcs("open", "repository has no working tree"))?
            .to_path_buf();

        Ok(Git2Repository {
            repo: Mutex::new(repo),
            workdir,
            credentials,
            cancel,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Repository>> {
        self.repo
            .lock()
            .map_err(|_| ImgUpgrError::vcs("lock", "repository handle poisoned"))
    }

    /// Fast-forward a local branch to its remote-tracking counterpart
    ///
    /// Missing remote branches and diverged histories leave the local
    /// branch untouched.
    fn fast_forward(repo: &Repository, branch: &str, remote: &str) -> Result<()> {
        let tracking_name = format!("{}/{}", remote, branch);
        let remote_oid = match repo.find_reference(&format!("refs/remotes/{}", tracking_name)) {
            Ok(reference) => reference.target().ok_or_else(|| {
                ImgUpgrError::vcs("pull", format!("{} reference is invalid", tracking_name))
            })?,
            Err(_) => return Ok(()),
        };

        let branch_ref_name = format!("refs/heads/{}", branch);
        let mut local_ref = match repo.find_reference(&branch_ref_name) {
            Ok(reference) => reference,
            Err(_) => {
                let commit = repo.find_commit(remote_oid).map_err(vcs_err("pull"))?;
                repo.branch(branch, &commit, false).map_err(vcs_err("pull"))?;
                return Ok(());
            }
        };

        let local_oid = match local_ref.target() {
            Some(oid) => oid,
            None => return Ok(()),
        };
        if local_oid == remote_oid {
            return Ok(());
        }

        if !repo
            .graph_descendant_of(remote_oid, local_oid)
            .map_err(vcs_err("pull"))?
        {
            warn!(branch = %branch, "local branch has diverged from {}, not fast-forwarding", tracking_name);
            return Ok(());
        }

        let checked_out = repo
            .head()
            .ok()
            .and_then(|head| head.name().map(|name| name == branch_ref_name))
            .unwrap_or(false);
        if checked_out {
            let commit = repo.find_commit(remote_oid).map_err(vcs_err("pull"))?;
            repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))
                .map_err(vcs_err("pull"))?;
        }

        local_ref
            .set_target(
                remote_oid,
                &format!("fast-forward from {}", tracking_name),
            )
            .map_err(vcs_err("pull"))?;
        debug!(branch = %branch, "fast-forwarded to {}", remote_oid);
        Ok(())
    }

    fn head_branch_name(repo: &Repository) -> Result<String> {
        let head = repo.head().map_err(vcs_err("rev-parse"))?;
        if repo.head_detached().map_err(vcs_err("rev-parse"))? {
            return Ok("HEAD".to_string());
        }
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    fn advertised_default_branch(&self, repo: &Repository) -> Option<String> {
        let mut remote = repo.find_remote(DEFAULT_REMOTE).ok()?;
        let connection = remote
            .connect_auth(
                Direction::Fetch,
                Some(remote_callbacks(&self.credentials, &self.cancel)),
                None,
            )
            .map_err(|e| debug!(error = %e.message(), "cannot query remote HEAD"))
            .ok()?;
        let head = connection.default_branch().ok()?;
        let name = head.as_str()?;
        Some(name.strip_prefix("refs/heads/").unwrap_or(name).to_string())
    }

    fn tracked_default_branch(repo: &Repository) -> Option<String> {
        let reference = repo
            .find_reference(&format!("refs/remotes/{}/HEAD", DEFAULT_REMOTE))
            .ok()?;
        let target = reference.symbolic_target()?;
        let prefix = format!("refs/remotes/{}/", DEFAULT_REMOTE);
        target.strip_prefix(prefix.as_str()).map(str::to_string)
    }
}

impl VersionControl for Git2Repository {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        let repo = self.lock()?;

        let local = match repo.find_branch(branch, BranchType::Local) {
            Ok(local) => local,
            Err(e) if e.code() == ErrorCode::NotFound => {
                let upstream = format!("{}/{}", DEFAULT_REMOTE, branch);
                let tracking = repo
                    .find_branch(&upstream, BranchType::Remote)
                    .map_err(|e| {
                        ImgUpgrError::vcs(
                            "checkout",
                            format!("branch '{}' not found: {}", branch, e.message()),
                        )
                    })?;
                let commit = tracking
                    .get()
                    .peel_to_commit()
                    .map_err(vcs_err("checkout"))?;
                let mut created = repo
                    .branch(branch, &commit, false)
                    .map_err(vcs_err("checkout"))?;
                created
                    .set_upstream(Some(&upstream))
                    .map_err(vcs_err("checkout"))?;
                created
            }
            Err(e) => return Err(vcs_err("checkout")(e)),
        };

        let reference = local.into_reference();
        let ref_name = reference
            .name()
            .ok_or_else(|| ImgUpgrError::vcs("checkout", "branch name is not valid UTF-8"))?
            .to_string();
        let tree = reference.peel_to_tree().map_err(vcs_err("checkout"))?;

        repo.checkout_tree(tree.as_object(), Some(CheckoutBuilder::new().safe()))
            .map_err(vcs_err("checkout"))?;
        repo.set_head(&ref_name).map_err(vcs_err("checkout"))?;
        debug!(branch = %branch, "checked out");
        Ok(())
    }

    fn pull(&self, remote_name: &str, branch: &str) -> Result<()> {
        ensure_not_cancelled(&self.cancel)?;
        let repo = self.lock()?;
        {
            let mut remote = repo.find_remote(remote_name).map_err(|_| {
                ImgUpgrError::vcs("pull", format!("remote '{}' not found", remote_name))
            })?;

            let mut fetch_options = FetchOptions::new();
            fetch_options.remote_callbacks(remote_callbacks(&self.credentials, &self.cancel));

            let refspec = format!(
                "+refs/heads/{branch}:refs/remotes/{remote_name}/{branch}",
                branch = branch,
                remote_name = remote_name
            );
            remote
                .fetch(&[refspec.as_str()], Some(&mut fetch_options), None)
                .map_err(transfer_err("pull", &self.cancel))?;
        }

        Self::fast_forward(&repo, branch, remote_name)
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        let repo = self.lock()?;
        let head = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(vcs_err("checkout -b"))?;
        let branch = repo
            .branch(name, &head, false)
            .map_err(vcs_err("checkout -b"))?;
        let ref_name = branch
            .get()
            .name()
            .ok_or_else(|| ImgUpgrError::vcs("checkout -b", "branch name is not valid UTF-8"))?
            .to_string();
        repo.set_head(&ref_name).map_err(vcs_err("checkout -b"))?;
        debug!(branch = %name, "created branch");
        Ok(())
    }

    fn add_all(&self) -> Result<()> {
        let repo = self.lock()?;
        let mut index = repo.index().map_err(vcs_err("add"))?;
        index
            .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
            .map_err(vcs_err("add"))?;
        index
            .update_all(["*"].iter(), None)
            .map_err(vcs_err("add"))?;
        index.write().map_err(vcs_err("add"))?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        let repo = self.lock()?;
        let mut index = repo.index().map_err(vcs_err("commit"))?;
        let tree_id = index.write_tree().map_err(vcs_err("commit"))?;
        let parent = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(vcs_err("commit"))?;

        if parent.tree_id() == tree_id {
            return Err(ImgUpgrError::NothingToCommit);
        }

        let tree = repo.find_tree(tree_id).map_err(vcs_err("commit"))?;
        let signature = repo.signature().map_err(|e| {
            ImgUpgrError::vcs(
                "commit",
                format!("no commit identity configured: {}", e.message()),
            )
        })?;
        let oid = repo
            .commit(
                Some("HEAD"),
                &signature,
                &signature,
                message,
                &tree,
                &[&parent],
            )
            .map_err(vcs_err("commit"))?;
        debug!(commit = %oid, "created commit");
        Ok(())
    }

    fn push_head(&self, remote_name: &str) -> Result<()> {
        ensure_not_cancelled(&self.cancel)?;
        let repo = self.lock()?;
        let branch = Self::head_branch_name(&repo)?;
        if branch == "HEAD" {
            return Err(ImgUpgrError::vcs("push", "HEAD is detached"));
        }

        let mut remote = repo.find_remote(remote_name).map_err(|_| {
            ImgUpgrError::vcs("push", format!("remote '{}' not found", remote_name))
        })?;

        let mut callbacks = remote_callbacks(&self.credentials, &self.cancel);
        callbacks.push_update_reference(|refname, status| match status {
            Some(status) => {
                warn!(reference = %refname, status = %status, "remote rejected reference");
                Err(git2::Error::from_str(&format!(
                    "push rejected for {}: {}",
                    refname, status
                )))
            }
            None => Ok(()),
        });

        let mut push_options = PushOptions::new();
        push_options.remote_callbacks(callbacks);

        let refspec = format!("refs/heads/{0}:refs/heads/{0}", branch);
        remote
            .push(&[refspec.as_str()], Some(&mut push_options))
            .map_err(|e| {
                if self.cancel.is_cancelled() {
                    return ImgUpgrError::Cancelled;
                }
                let message = match e.class() {
                    git2::ErrorClass::Net => format!("network error: {}", e.message()),
                    git2::ErrorClass::Reference => format!("reference error: {}", e.message()),
                    _ => e.message().to_string(),
                };
                ImgUpgrError::vcs("push", message)
            })?;

        info!(branch = %branch, remote = %remote_name, "pushed branch");
        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        let repo = self.lock()?;
        Self::head_branch_name(&repo)
    }

    fn default_branch(&self) -> String {
        let repo = match self.lock() {
            Ok(repo) => repo,
            Err(_) => return FALLBACK_BRANCH.to_string(),
        };

        if let Some(branch) = self.advertised_default_branch(&repo) {
            debug!(branch = %branch, "default branch from remote");
            return branch;
        }
        if let Some(branch) = Self::tracked_default_branch(&repo) {
            debug!(branch = %branch, "default branch from origin/HEAD");
            return branch;
        }

        warn!(
            "could not determine default branch, using '{}'",
            FALLBACK_BRANCH
        );
        FALLBACK_BRANCH.to_string()
    }

    fn status(&self) -> Result<Vec<String>> {
        let repo = self.lock()?;
        let mut options = StatusOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);

        let statuses = repo.statuses(Some(&mut options)).map_err(vcs_err("status"))?;
        Ok(statuses
            .iter()
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect())
    }
}
