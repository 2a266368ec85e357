use crate::error::{ImgUpgrError, Result};
use crate::git::{VersionControl, FALLBACK_BRANCH};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Operations the mock can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Checkout,
    Pull,
    CreateBranch,
    Add,
    Commit,
    Push,
}

/// File contents below the working directory, keyed by path
type Snapshot = BTreeMap<PathBuf, Vec<u8>>;

fn snapshot(dir: &Path) -> Snapshot {
    fn walk(dir: &Path, files: &mut Snapshot) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, files);
            } else if let Ok(content) = fs::read(&path) {
                files.insert(path, content);
            }
        }
    }

    let mut files = Snapshot::new();
    walk(dir, &mut files);
    files
}

#[derive(Debug)]
struct MockState {
    current_branch: String,
    branches: Vec<String>,
    calls: Vec<String>,
    /// Working tree as of the last checkout or commit
    committed: Option<Snapshot>,
    dirty: bool,
}

/// Recording version-control gateway for tests
///
/// Files are read and written in a real directory; branch and commit
/// handling is bookkeeping only. [VersionControl::add_all] stages
/// something only when a file changed since the last checkout or commit.
/// Failures are keyed by operation and a substring the current branch must
/// contain, so a test can fail the push of one service's branch and let the
/// others through.
pub struct MockVersionControl {
    workdir: PathBuf,
    default_branch: Option<String>,
    failures: HashMap<MockOp, Vec<String>>,
    cancel_after: Option<(MockOp, CancellationToken)>,
    state: Mutex<MockState>,
}

impl MockVersionControl {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        MockVersionControl {
            workdir: workdir.into(),
            default_branch: None,
            failures: HashMap::new(),
            cancel_after: None,
            state: Mutex::new(MockState {
                current_branch: FALLBACK_BRANCH.to_string(),
                branches: vec![FALLBACK_BRANCH.to_string()],
                calls: Vec::new(),
                committed: None,
                dirty: false,
            }),
        }
    }

    /// Branch reported by [VersionControl::default_branch]; unset falls back to `main`
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        if let Ok(state) = self.state.get_mut() {
            if !state.branches.contains(&branch) {
                state.branches.push(branch.clone());
            }
        }
        self.default_branch = Some(branch);
        self
    }

    /// Fail `op` whenever the current branch (or the branch argument) contains `pattern`
    pub fn fail_on(mut self, op: MockOp, pattern: impl Into<String>) -> Self {
        self.failures.entry(op).or_default().push(pattern.into());
        self
    }

    /// Cancel `token` once `op` has succeeded
    pub fn cancel_after(mut self, op: MockOp, token: CancellationToken) -> Self {
        self.cancel_after = Some((op, token));
        self
    }

    /// Every call in order, formatted like the equivalent git command
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.calls.clone())
            .unwrap_or_default()
    }

    pub fn branches(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|state| state.branches.clone())
            .unwrap_or_default()
    }

    fn record(&self, op: MockOp, call: String, subject: Option<&str>) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ImgUpgrError::vcs("mock", "state poisoned"))?;
        state.calls.push(call.clone());

        let subject = subject.unwrap_or(state.current_branch.as_str()).to_string();
        let fails = self
            .failures
            .get(&op)
            .map(|patterns| patterns.iter().any(|p| subject.contains(p.as_str())))
            .unwrap_or(false);
        if fails {
            return Err(ImgUpgrError::vcs(call, "simulated failure"));
        }
        Ok(())
    }

    fn finish(&self, op: MockOp) {
        if let Some((after, token)) = &self.cancel_after {
            if *after == op {
                token.cancel();
            }
        }
    }
}

impl VersionControl for MockVersionControl {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.record(MockOp::Checkout, format!("checkout {}", branch), Some(branch))?;
        let mut state = self
            .state
            .lock()
            .map_err(|_| ImgUpgrError::vcs("mock", "state poisoned"))?;
        if !state.branches.iter().any(|b| b == branch) {
            return Err(ImgUpgrError::vcs(
                "checkout",
                format!("branch '{}' not found", branch),
            ));
        }
        state.current_branch = branch.to_string();
        state.committed = Some(snapshot(&self.workdir));
        state.dirty = false;
        drop(state);
        self.finish(MockOp::Checkout);
        Ok(())
    }

    fn pull(&self, remote: &str, branch: &str) -> Result<()> {
        self.record(MockOp::Pull, format!("pull {} {}", remote, branch), Some(branch))?;
        self.finish(MockOp::Pull);
        Ok(())
    }

    fn create_branch(&self, name: &str) -> Result<()> {
        self.record(MockOp::CreateBranch, format!("checkout -b {}", name), Some(name))?;
        let mut state = self
            .state
            .lock()
            .map_err(|_| ImgUpgrError::vcs("mock", "state poisoned"))?;
        if state.branches.iter().any(|b| b == name) {
            return Err(ImgUpgrError::vcs(
                "checkout -b",
                format!("branch '{}' already exists", name),
            ));
        }
        state.branches.push(name.to_string());
        state.current_branch = name.to_string();
        drop(state);
        self.finish(MockOp::CreateBranch);
        Ok(())
    }

    fn add_all(&self) -> Result<()> {
        self.record(MockOp::Add, "add .".to_string(), None)?;
        let current = snapshot(&self.workdir);
        if let Ok(mut state) = self.state.lock() {
            state.dirty = state.committed.as_ref() != Some(&current);
        }
        self.finish(MockOp::Add);
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.record(MockOp::Commit, format!("commit -m {}", message), None)?;
        let mut state = self
            .state
            .lock()
            .map_err(|_| ImgUpgrError::vcs("mock", "state poisoned"))?;
        if !state.dirty {
            return Err(ImgUpgrError::NothingToCommit);
        }
        state.dirty = false;
        state.committed = Some(snapshot(&self.workdir));
        drop(state);
        self.finish(MockOp::Commit);
        Ok(())
    }

    fn push_head(&self, remote: &str) -> Result<()> {
        self.record(MockOp::Push, format!("push {} HEAD", remote), None)?;
        self.finish(MockOp::Push);
        Ok(())
    }

    fn current_branch(&self) -> Result<String> {
        self.state
            .lock()
            .map(|state| state.current_branch.clone())
            .map_err(|_| ImgUpgrError::vcs("mock", "state poisoned"))
    }

    fn default_branch(&self) -> String {
        self.default_branch
            .clone()
            .unwrap_or_else(|| FALLBACK_BRANCH.to_string())
    }

    fn status(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_records_calls_in_order() {
        let dir = TempDir::new().unwrap();
        let vcs = MockVersionControl::new(dir.path());
        vcs.checkout("main").unwrap();
        vcs.pull("origin", "main").unwrap();
        vcs.create_branch("img-upgr/web-1").unwrap();
        fs::write(dir.path().join("compose.yml"), "services: {}\n").unwrap();
        vcs.add_all().unwrap();
        vcs.commit("msg").unwrap();
        vcs.push_head("origin").unwrap();

        assert_eq!(
            vcs.calls(),
            vec![
                "checkout main",
                "pull origin main",
                "checkout -b img-upgr/web-1",
                "add .",
                "commit -m msg",
                "push origin HEAD",
            ]
        );
        assert_eq!(vcs.current_branch().unwrap(), "img-upgr/web-1");
    }

    #[test]
    fn test_fail_on_matches_current_branch() {
        let vcs = MockVersionControl::new("/tmp/checkout").fail_on(MockOp::Push, "db");

        vcs.create_branch("img-upgr/cache-1").unwrap();
        assert!(vcs.push_head("origin").is_ok());

        vcs.checkout("main").unwrap();
        vcs.create_branch("img-upgr/db-1").unwrap();
        let err = vcs.push_head("origin").unwrap_err();
        assert!(matches!(err, ImgUpgrError::Vcs { .. }));
    }

    #[test]
    fn test_commit_without_add_is_nothing_to_commit() {
        let vcs = MockVersionControl::new("/tmp/checkout");
        assert!(matches!(
            vcs.commit("msg").unwrap_err(),
            ImgUpgrError::NothingToCommit
        ));
    }

    #[test]
    fn test_add_without_file_changes_stages_nothing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("compose.yml"), "services: {}\n").unwrap();
        let vcs = MockVersionControl::new(dir.path());

        vcs.checkout("main").unwrap();
        vcs.add_all().unwrap();
        assert!(matches!(
            vcs.commit("msg").unwrap_err(),
            ImgUpgrError::NothingToCommit
        ));

        fs::write(dir.path().join("compose.yml"), "services:\n  web: {}\n").unwrap();
        vcs.add_all().unwrap();
        vcs.commit("msg").unwrap();

        // Committed content is the new baseline
        vcs.add_all().unwrap();
        assert!(vcs.commit("again").is_err());
    }

    #[test]
    fn test_cancel_after_operation() {
        let cancel = CancellationToken::new();
        let vcs = MockVersionControl::new("/tmp/checkout")
            .cancel_after(MockOp::CreateBranch, cancel.clone());

        vcs.checkout("main").unwrap();
        assert!(!cancel.is_cancelled());
        vcs.create_branch("img-upgr/web-1").unwrap();
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn test_default_branch() {
        assert_eq!(MockVersionControl::new("/tmp").default_branch(), "main");
        let vcs = MockVersionControl::new("/tmp").with_default_branch("develop");
        assert_eq!(vcs.default_branch(), "develop");
        assert!(vcs.checkout("develop").is_ok());
    }
}
