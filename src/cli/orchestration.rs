//! Run orchestration
//!
//! Turns a validated [Config] and subcommand arguments into a run:
//! optional clone, manifest discovery, update resolution, output, and the
//! merge-request batch. Kept apart from `main.rs` so it can be driven
//! without clap.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analyzer::{BuildReport, UpdateSetBuilder};
use crate::config::Config;
use crate::git::{Git2Repository, VersionControl};
use crate::manifest;
use crate::proposal::GitLabClient;
use crate::registry::DockerHubClient;
use crate::ui::{self, formatter, OutputFormat};
use crate::workflow::{BatchSummary, ChangeWorkflow};

/// Manifest `check` looks at when no path is given
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// Whether a run opens merge requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalMode {
    Disabled,
    /// Open them when a repository is configured and cloned
    WhenRepository,
    /// Open them; a missing GitLab configuration is fatal
    Required,
}

/// Arguments for one run, independent of clap
#[derive(Debug, Clone, PartialEq)]
pub struct RunArgs {
    /// Explicit file or directory; relative paths resolve inside the checkout
    pub path: Option<PathBuf>,

    /// Target used when neither `path` nor the configured scan dir is set
    pub default_target: PathBuf,

    /// Clone even without proposals; `scan` always works on a checkout
    pub require_clone: bool,

    /// An empty directory is a normal outcome rather than an error
    pub allow_empty: bool,

    pub proposals: ProposalMode,
    pub target_branch: Option<String>,
    pub output: OutputFormat,
}

impl RunArgs {
    /// `check [PATH]`: clone only when a repository is configured
    pub fn check(path: Option<PathBuf>, config: &Config) -> Result<Self> {
        Ok(RunArgs {
            path,
            default_target: PathBuf::from(DEFAULT_COMPOSE_FILE),
            require_clone: false,
            allow_empty: false,
            proposals: if config.dry_run {
                ProposalMode::Disabled
            } else {
                ProposalMode::WhenRepository
            },
            target_branch: config.target_branch.clone(),
            output: config.output_format.parse()?,
        })
    }

    /// `scan [DIR]`: always clone; open merge requests only with `--create-mr`
    pub fn scan(dir: Option<PathBuf>, config: &Config) -> Result<Self> {
        Ok(RunArgs {
            path: dir,
            default_target: PathBuf::from("."),
            require_clone: true,
            allow_empty: true,
            proposals: if config.create_mr {
                ProposalMode::Required
            } else {
                ProposalMode::Disabled
            },
            target_branch: config.target_branch.clone(),
            output: config.output_format.parse()?,
        })
    }

    fn wants_clone(&self, config: &Config) -> bool {
        self.require_clone || self.proposals == ProposalMode::Required || config.has_gitlab_repo()
    }
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub found: usize,
    pub opened: usize,
    /// One line per update whose merge request was not created
    pub failed: Vec<String>,
    pub skipped: usize,
    pub not_attempted: usize,
    /// Images whose registry lookup failed
    pub check_errors: usize,
    pub merge_requests: Vec<String>,
    pub cancelled: bool,
}

impl RunSummary {
    fn from_report(report: &BuildReport, cancelled: bool) -> Self {
        RunSummary {
            found: report.candidates.len(),
            skipped: report.skipped.len(),
            check_errors: report.failed.len(),
            cancelled,
            ..Default::default()
        }
    }

    fn record_batch(&mut self, batch: BatchSummary) {
        self.opened = batch.opened.len();
        self.merge_requests = batch
            .opened
            .into_iter()
            .map(|(_, merge_request)| merge_request.web_url)
            .collect();
        self.failed = batch
            .failed
            .iter()
            .filter(|failure| !failure.error.is_cancelled())
            .map(formatter::format_workflow_failure)
            .collect();
        self.not_attempted = batch.not_attempted.len()
            + batch
                .failed
                .iter()
                .filter(|failure| failure.error.is_cancelled())
                .count();
        self.cancelled |= batch.cancelled;
    }
}

/// A temporary clone, removed when dropped
struct Checkout {
    repo: Git2Repository,
    _dir: TempDir,
}

/// Clone the configured repository; `None` when cancelled mid-clone
async fn clone_checkout(config: &Config, cancel: &CancellationToken) -> Result<Option<Checkout>> {
    let url = config
        .gitlab
        .repo
        .clone()
        .context("GitLab repository URL is not set")?;
    let gitlab = config.gitlab.clone();

    let dir = tempfile::Builder::new()
        .prefix("img-upgr-")
        .tempdir()
        .context("failed to create temporary directory")?;
    let path = dir.path().to_path_buf();
    debug!(dir = %path.display(), "created temporary directory");

    let token = cancel.clone();
    let cloned =
        tokio::task::spawn_blocking(move || Git2Repository::clone_into(&url, &path, &gitlab, &token))
            .await
            .context("clone task failed")?;
    let repo = match cloned {
        Ok(repo) => repo,
        Err(e) if e.is_cancelled() => return Ok(None),
        Err(e) => return Err(e).context("failed to clone repository"),
    };

    info!("repository setup complete");
    Ok(Some(Checkout { repo, _dir: dir }))
}

/// Path to scan: explicit, else configured scan dir, else `default`
///
/// Relative paths resolve inside the checkout when there is one.
pub fn scan_target(
    explicit: Option<&Path>,
    scan_dir: Option<&str>,
    default: &Path,
    checkout: Option<&Path>,
) -> PathBuf {
    let chosen = explicit
        .map(Path::to_path_buf)
        .or_else(|| scan_dir.filter(|d| !d.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| default.to_path_buf());

    match checkout {
        Some(root) if chosen.is_relative() => {
            let resolved = root.join(&chosen);
            debug!(path = %resolved.display(), "using path relative to cloned repository");
            resolved
        }
        _ => chosen,
    }
}

fn manifest_files(target: &Path, allow_empty: bool) -> Result<Vec<PathBuf>> {
    if allow_empty && target.is_dir() {
        return manifest::find_compose_files(target)
            .with_context(|| format!("failed to find compose files in {}", target.display()));
    }
    manifest::resolve_scan_target(target).context("failed to determine files to scan")
}

/// Execute one run
///
/// Fatal problems (invalid configuration, clone failure, no manifests) are
/// errors. Per-image and per-update problems are counted in the summary;
/// cancellation sets [RunSummary::cancelled].
pub async fn run(args: &RunArgs, config: &Config, cancel: &CancellationToken) -> Result<RunSummary> {
    config.validate().context("configuration validation failed")?;

    let checkout = if args.wants_clone(config) {
        config
            .validate_gitlab()
            .context("GitLab configuration validation failed")?;
        match clone_checkout(config, cancel).await? {
            Some(checkout) => Some(checkout),
            None => {
                warn!("clone cancelled");
                return Ok(RunSummary {
                    cancelled: true,
                    ..RunSummary::default()
                });
            }
        }
    } else {
        None
    };

    let target = scan_target(
        args.path.as_deref(),
        config.scan_dir.as_deref(),
        &args.default_target,
        checkout.as_ref().map(|c| c.repo.workdir()),
    );
    let files = manifest_files(&target, args.allow_empty)?;
    if files.is_empty() {
        ui::display_status(&format!("No docker-compose files found in {}", target.display()));
        return Ok(RunSummary::default());
    }
    info!(count = files.len(), path = %target.display(), "found compose files");

    let manifests = manifest::load_manifests(&files);
    let registry = DockerHubClient::new(&config.registry)?;
    let outcome = UpdateSetBuilder::new(&registry, config.registry.concurrency)
        .build(&manifests, cancel)
        .await;

    let cancelled = outcome.is_cancelled();
    let report = outcome.into_report();
    let mut summary = RunSummary::from_report(&report, cancelled);

    ui::print_updates(&report.candidates, args.output)?;
    if config.verbose {
        ui::display_skipped(&report.skipped);
    }

    if cancelled {
        warn!("update check cancelled, discarding partial results");
        summary.not_attempted = summary.found;
        return Ok(summary);
    }
    if report.candidates.is_empty() {
        return Ok(summary);
    }

    let checkout = match (args.proposals, checkout) {
        (ProposalMode::Disabled, _) => {
            debug!("merge requests disabled for this run");
            return Ok(summary);
        }
        (_, None) => {
            info!("no repository configured, not creating merge requests");
            return Ok(summary);
        }
        (_, Some(checkout)) => checkout,
    };

    let gateway = GitLabClient::new(&config.gitlab).context("error initializing GitLab client")?;
    let workflow = ChangeWorkflow::new(&checkout.repo, &gateway, args.target_branch.clone());
    let batch = workflow.run_batch(&report.candidates, cancel).await;
    summary.record_batch(batch);

    for url in &summary.merge_requests {
        ui::display_success(&format!("Merge request created: {}", url));
    }
    Ok(summary)
}
