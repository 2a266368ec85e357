// tests/integration_test.rs
use axum::{extract::Path as UrlPath, routing::get, Json, Router};
use serde_json::{json, Value};
use std::io::Write;
use std::process::Command;
use tempfile::{NamedTempFile, TempDir};

const BIN: &str = env!("CARGO_BIN_EXE_img-upgr");

fn img_upgr() -> Command {
    let mut cmd = Command::new(BIN);
    for (key, _) in std::env::vars() {
        if key.starts_with("IMG_UPGR_") {
            cmd.env_remove(key);
        }
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_img_upgr_help() {
    let output = img_upgr()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("img-upgr"));
    assert!(stdout.contains("check"));
    assert!(stdout.contains("scan"));
}

#[test]
fn test_img_upgr_version() {
    let output = img_upgr()
        .arg("version")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_invalid_output_format_fails() {
    let dir = TempDir::new().unwrap();
    let compose = dir.path().join("docker-compose.yml");
    std::fs::write(&compose, "services:\n  web:\n    image: nginx:1.25.0\n").unwrap();

    let output = img_upgr()
        .args(["check", "--dry-run", "--output", "xml"])
        .arg(&compose)
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_check_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let output = img_upgr()
        .args(["check", "--dry-run"])
        .arg(dir.path().join("nope.yml"))
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
}

async fn tags(UrlPath((namespace, name)): UrlPath<(String, String)>) -> Json<Value> {
    let results = match (namespace.as_str(), name.as_str()) {
        ("library", "redis") => vec!["7.0.0", "7.2.0", "7.1.5", "latest"],
        ("library", "nginx") => vec!["1.25.3", "1.24.0"],
        _ => vec![],
    };
    let results: Vec<Value> = results.into_iter().map(|n| json!({ "name": n })).collect();
    Json(json!({ "count": results.len(), "next": null, "results": results }))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_dry_run_reports_updates_as_json() {
    let app = Router::new().route("/v2/repositories/:namespace/:name/tags", get(tags));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = TempDir::new().unwrap();
    let compose = dir.path().join("docker-compose.yml");
    std::fs::write(
        &compose,
        "services:\n  cache:\n    image: redis:7.0.0\n  web:\n    image: nginx:1.25.3\n  app:\n    image: myapp:latest\n",
    )
    .unwrap();

    let mut config = NamedTempFile::new().unwrap();
    writeln!(
        config,
        "[registry]\nbase_url = \"http://{}/v2/repositories\"",
        addr
    )
    .unwrap();
    config.flush().unwrap();

    let config_path = config.path().to_path_buf();
    let output = tokio::task::spawn_blocking(move || {
        img_upgr()
            .arg("--config")
            .arg(&config_path)
            .args(["check", "--dry-run", "--output", "json"])
            .arg(&compose)
            .output()
            .expect("Failed to execute command")
    })
    .await
    .unwrap();

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("\"new_image\": \"redis:7.2.0\""));
    assert!(!stdout.contains("nginx:1.25.3\","), "up-to-date image must not be reported");
    assert!(!stdout.contains("myapp"));
}
