//! Per-update change workflow
//!
//! Each [UpdateCandidate] walks an explicit state machine:
//!
//! ```text
//! Start -> BranchCreated -> FileRewritten -> CommittedAndPushed -> ProposalOpened -> Done
//! ```
//!
//! Any transition can end in [WorkflowState::Failed]. Nothing is rolled
//! back: a pushed branch stays on the remote when the proposal fails.

pub mod rewrite;

pub use rewrite::{rewrite_file, rewrite_image};

use crate::domain::{BranchProposal, UpdateCandidate};
use crate::error::{ImgUpgrError, Result};
use crate::git::{VersionControl, DEFAULT_REMOTE};
use crate::proposal::{MergeRequest, MergeRequestResponse, ProposalGateway};
use chrono::Local;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The transition a workflow failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CreateBranch,
    RewriteFile,
    CommitAndPush,
    OpenProposal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CreateBranch => "branch creation",
            Stage::RewriteFile => "file rewrite",
            Stage::CommitAndPush => "commit and push",
            Stage::OpenProposal => "merge request",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum WorkflowState {
    Start,
    BranchCreated {
        proposal: BranchProposal,
    },
    FileRewritten {
        proposal: BranchProposal,
    },
    CommittedAndPushed {
        proposal: BranchProposal,
    },
    ProposalOpened {
        proposal: BranchProposal,
        merge_request: MergeRequestResponse,
    },
    Done {
        merge_request: MergeRequestResponse,
    },
    Failed {
        stage: Stage,
        error: ImgUpgrError,
    },
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done { .. } | WorkflowState::Failed { .. })
    }

    /// Stage the next transition runs, if any
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            WorkflowState::Start => Some(Stage::CreateBranch),
            WorkflowState::BranchCreated { .. } => Some(Stage::RewriteFile),
            WorkflowState::FileRewritten { .. } => Some(Stage::CommitAndPush),
            WorkflowState::CommittedAndPushed { .. } => Some(Stage::OpenProposal),
            WorkflowState::ProposalOpened { .. } => Some(Stage::OpenProposal),
            WorkflowState::Done { .. } | WorkflowState::Failed { .. } => None,
        }
    }

    /// Whether the next transition still touches the remote
    ///
    /// Once the merge request exists only bookkeeping remains, and that is
    /// finished even after cancellation.
    fn has_pending_side_effects(&self) -> bool {
        !matches!(
            self,
            WorkflowState::ProposalOpened { .. } | WorkflowState::Done { .. } | WorkflowState::Failed { .. }
        )
    }
}

/// An update whose workflow did not reach [WorkflowState::Done]
#[derive(Debug)]
pub struct WorkflowFailure {
    pub service_name: String,
    pub stage: Stage,
    pub error: ImgUpgrError,
}

/// What happened to each candidate of a batch
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub opened: Vec<(String, MergeRequestResponse)>,
    pub failed: Vec<WorkflowFailure>,
    /// Services never started because the run was cancelled
    pub not_attempted: Vec<String>,
    pub cancelled: bool,
}

/// Drives candidates through the workflow over one checkout
pub struct ChangeWorkflow<'a, V: VersionControl + ?Sized, P: ProposalGateway + ?Sized> {
    vcs: &'a V,
    gateway: &'a P,
    target_branch: Option<String>,
}

impl<'a, V: VersionControl + ?Sized, P: ProposalGateway + ?Sized> ChangeWorkflow<'a, V, P> {
    /// `target_branch` overrides the remote's default branch as the base
    pub fn new(vcs: &'a V, gateway: &'a P, target_branch: Option<String>) -> Self {
        ChangeWorkflow {
            vcs,
            gateway,
            target_branch: target_branch.filter(|b| !b.is_empty()),
        }
    }

    fn base_branch(&self) -> String {
        match &self.target_branch {
            Some(branch) => branch.clone(),
            None => self.vcs.default_branch(),
        }
    }

    /// Run one transition
    ///
    /// Terminal states are returned unchanged. `cancel` aborts an in-flight
    /// merge request call.
    pub async fn step(
        &self,
        candidate: &UpdateCandidate,
        state: WorkflowState,
        cancel: &CancellationToken,
    ) -> WorkflowState {
        match state {
            WorkflowState::Start => match self.create_branch(candidate) {
                Ok(proposal) => WorkflowState::BranchCreated { proposal },
                Err(error) => failed(Stage::CreateBranch, error),
            },
            WorkflowState::BranchCreated { proposal } => match self.rewrite(candidate) {
                Ok(()) => WorkflowState::FileRewritten { proposal },
                Err(error) => failed(Stage::RewriteFile, error),
            },
            WorkflowState::FileRewritten { proposal } => {
                match self.commit_and_push(&proposal) {
                    Ok(()) => WorkflowState::CommittedAndPushed { proposal },
                    Err(error) => failed(Stage::CommitAndPush, error),
                }
            }
            WorkflowState::CommittedAndPushed { proposal } => {
                match self.open_proposal(&proposal, cancel).await {
                    Ok(merge_request) => WorkflowState::ProposalOpened {
                        proposal,
                        merge_request,
                    },
                    Err(error) => failed(Stage::OpenProposal, error),
                }
            }
            WorkflowState::ProposalOpened { merge_request, .. } => {
                WorkflowState::Done { merge_request }
            }
            terminal => terminal,
        }
    }

    /// Run every transition for `candidate`, checking `cancel` before each
    /// one that still has remote side effects
    pub async fn run(
        &self,
        candidate: &UpdateCandidate,
        cancel: &CancellationToken,
    ) -> WorkflowState {
        let mut state = WorkflowState::Start;
        while let Some(stage) = state.next_stage() {
            if cancel.is_cancelled() && state.has_pending_side_effects() {
                return failed(stage, ImgUpgrError::Cancelled);
            }
            state = self.step(candidate, state, cancel).await;
        }
        state
    }

    /// Run the workflow for each candidate in order
    ///
    /// A failed candidate is logged and the batch moves on. Cancellation
    /// stops the batch; the rest are reported as not attempted.
    pub async fn run_batch(
        &self,
        candidates: &[UpdateCandidate],
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for (index, candidate) in candidates.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                summary.not_attempted = candidates[index..]
                    .iter()
                    .map(|c| c.service_name.clone())
                    .collect();
                break;
            }

            info!(
                service = %candidate.service_name,
                from = %candidate.old_image,
                to = %candidate.new_image,
                "creating merge request for update"
            );

            match self.run(candidate, cancel).await {
                WorkflowState::Done { merge_request } => {
                    info!(
                        service = %candidate.service_name,
                        url = %merge_request.web_url,
                        "merge request opened"
                    );
                    summary
                        .opened
                        .push((candidate.service_name.clone(), merge_request));
                }
                WorkflowState::Failed { stage, error } => {
                    if error.is_cancelled() {
                        warn!(service = %candidate.service_name, stage = %stage, "workflow cancelled");
                        summary.cancelled = true;
                    } else {
                        error!(
                            service = %candidate.service_name,
                            stage = %stage,
                            error = %error,
                            "failed to create merge request"
                        );
                    }
                    summary.failed.push(WorkflowFailure {
                        service_name: candidate.service_name.clone(),
                        stage,
                        error,
                    });
                    if summary.cancelled {
                        summary.not_attempted = candidates[index + 1..]
                            .iter()
                            .map(|c| c.service_name.clone())
                            .collect();
                        break;
                    }
                }
                other => {
                    warn!(service = %candidate.service_name, state = ?other, "workflow stopped early");
                }
            }
        }

        info!(
            opened = summary.opened.len(),
            failed = summary.failed.len(),
            not_attempted = summary.not_attempted.len(),
            "merge request batch finished"
        );
        summary
    }

    fn create_branch(&self, candidate: &UpdateCandidate) -> Result<BranchProposal> {
        let base = self.base_branch();
        let proposal = BranchProposal::new(candidate, base, Local::now());
        debug!(
            branch = %proposal.branch_name,
            base = %proposal.base_branch,
            "creating branch"
        );

        self.vcs.checkout(&proposal.base_branch)?;
        self.vcs.pull(DEFAULT_REMOTE, &proposal.base_branch)?;
        self.vcs.create_branch(&proposal.branch_name)?;

        info!(branch = %proposal.branch_name, "created branch");
        Ok(proposal)
    }

    fn rewrite(&self, candidate: &UpdateCandidate) -> Result<()> {
        let path = if candidate.file_path.is_absolute() {
            candidate.file_path.clone()
        } else {
            self.vcs.workdir().join(&candidate.file_path)
        };

        if !rewrite_file(&path, &candidate.old_image, &candidate.new_image)? {
            warn!(
                file = %path.display(),
                image = %candidate.old_image,
                "image not found in file"
            );
        }
        debug!(file = %path.display(), "updated file");
        Ok(())
    }

    fn commit_and_push(&self, proposal: &BranchProposal) -> Result<()> {
        self.vcs.add_all()?;
        self.vcs.commit(&proposal.commit_message)?;
        self.vcs.push_head(DEFAULT_REMOTE)?;
        Ok(())
    }

    async fn open_proposal(
        &self,
        proposal: &BranchProposal,
        cancel: &CancellationToken,
    ) -> Result<MergeRequestResponse> {
        let source_branch = self.vcs.current_branch()?;
        let request = MergeRequest {
            source_branch,
            target_branch: proposal.base_branch.clone(),
            title: proposal.title.clone(),
            description: proposal.description.clone(),
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ImgUpgrError::Cancelled),
            created = self.gateway.create_merge_request(&request) => created,
        }
    }
}

fn failed(stage: Stage, error: ImgUpgrError) -> WorkflowState {
    WorkflowState::Failed { stage, error }
}
