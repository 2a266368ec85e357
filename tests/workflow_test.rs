// tests/workflow_test.rs
use img_upgr::analyzer::UpdateSetBuilder;
use img_upgr::git::mock::MockOp;
use img_upgr::git::MockVersionControl;
use img_upgr::manifest::{load_manifests, resolve_scan_target};
use img_upgr::proposal::MockProposalGateway;
use img_upgr::registry::MockTagSource;
use img_upgr::ui::formatter::format_workflow_failure;
use img_upgr::workflow::{ChangeWorkflow, Stage};
use std::fs;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const COMPOSE: &str = r#"
services:
  cache:
    image: redis:7.0.0
  db:
    image: postgres:15.0.0
  app:
    image: myapp:latest
"#;

fn checkout() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("docker-compose.yml"), COMPOSE).unwrap();
    dir
}

fn registry() -> MockTagSource {
    MockTagSource::new()
        .with_tags("redis", &["7.0.0", "7.2.0"])
        .with_tags("postgres", &["15.0.0", "15.4.0", "16.1.0"])
}

#[tokio::test]
async fn test_push_failure_for_one_service_keeps_the_other() {
    let dir = checkout();
    let files = resolve_scan_target(dir.path()).unwrap();
    let manifests = load_manifests(&files);
    let cancel = CancellationToken::new();

    let source = registry();
    let report = UpdateSetBuilder::new(&source, 2)
        .build(&manifests, &cancel)
        .await
        .into_report();
    assert_eq!(report.candidates.len(), 2);
    assert_eq!(report.skipped.len(), 1);

    let vcs = MockVersionControl::new(dir.path()).fail_on(MockOp::Push, "/db-");
    let gateway = MockProposalGateway::new();
    let workflow = ChangeWorkflow::new(&vcs, &gateway, None);
    let summary = workflow.run_batch(&report.candidates, &cancel).await;

    assert!(!summary.cancelled);
    assert_eq!(summary.opened.len(), 1);
    assert_eq!(summary.opened[0].0, "cache");
    assert!(summary.opened[0].1.web_url.contains("merge_requests"));

    assert_eq!(summary.failed.len(), 1);
    let failure = &summary.failed[0];
    assert_eq!(failure.service_name, "db");
    assert_eq!(failure.stage, Stage::CommitAndPush);
    assert!(format_workflow_failure(failure).starts_with("db (commit and push):"));

    let opened = gateway.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].title, "Update cache from 7.0.0 to 7.2.0");
    assert_eq!(opened[0].target_branch, "main");
}

#[tokio::test]
async fn test_each_update_branches_from_the_base() {
    let dir = checkout();
    let manifests = load_manifests(&resolve_scan_target(dir.path()).unwrap());
    let cancel = CancellationToken::new();
    let source = registry();
    let report = UpdateSetBuilder::new(&source, 1)
        .build(&manifests, &cancel)
        .await
        .into_report();

    let vcs = MockVersionControl::new(dir.path());
    let gateway = MockProposalGateway::new();
    let summary = ChangeWorkflow::new(&vcs, &gateway, None)
        .run_batch(&report.candidates, &cancel)
        .await;
    assert_eq!(summary.opened.len(), 2);

    let calls = vcs.calls();
    let checkouts: Vec<&String> = calls.iter().filter(|c| *c == "checkout main").collect();
    assert_eq!(checkouts.len(), 2);
    assert_eq!(
        calls.iter().filter(|c| c.starts_with("checkout -b img-upgr/")).count(),
        2
    );

    // Both rewrites land in the shared checkout
    let content = fs::read_to_string(dir.path().join("docker-compose.yml")).unwrap();
    assert!(content.contains("redis:7.2.0"));
    assert!(content.contains("postgres:16.1.0"));
    assert!(content.contains("myapp:latest"));
}
