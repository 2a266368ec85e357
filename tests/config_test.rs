// tests/config_test.rs
use img_upgr::config::{load_config, Config, ENV_GITLAB_REPO, ENV_GITLAB_TOKEN, ENV_SCAN_DIR};
use serial_test::serial;
use std::env;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();
    let toml_content = r#"
log_level = "DEBUG"
output_format = "yaml"
scan_dir = "stack"
target_branch = "develop"

[gitlab]
user = "bot"
email = "bot@example.com"
repo = "https://gitlab.example.com/group/infra.git"

[registry]
base_url = "http://127.0.0.1:5000/v2/repositories"
concurrency = 8
"#;
    temp_file.write_all(toml_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = load_config(Some(temp_file.path().to_str().unwrap())).unwrap();
    assert_eq!(config.log_level, "DEBUG");
    assert_eq!(config.output_format, "yaml");
    assert_eq!(config.scan_dir.as_deref(), Some("stack"));
    assert_eq!(config.target_branch.as_deref(), Some("develop"));
    assert_eq!(config.gitlab.user.as_deref(), Some("bot"));
    assert!(config.gitlab.token.is_none());
    assert_eq!(
        config.registry.base_url,
        "http://127.0.0.1:5000/v2/repositories"
    );
    assert_eq!(config.registry.concurrency, 8);
    // Unset registry keys keep their defaults
    assert_eq!(config.registry.page_size, 100);
    assert!(config.validate().is_ok());
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"create_mr = true\n").unwrap();
    temp_file.flush().unwrap();

    let config = load_config(Some(temp_file.path().to_str().unwrap())).unwrap();
    assert!(config.create_mr);
    assert_eq!(config.log_level, "INFO");
    assert_eq!(config.output_format, "text");
}

#[test]
fn test_invalid_toml_is_config_error() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"log_level = [unterminated").unwrap();
    temp_file.flush().unwrap();

    let err = load_config(Some(temp_file.path().to_str().unwrap())).unwrap_err();
    assert!(err.to_string().contains("cannot parse"));
}

#[test]
fn test_missing_explicit_file_is_error() {
    assert!(load_config(Some("/nonexistent/img-upgr.toml")).is_err());
}

#[test]
#[serial]
fn test_apply_env_reads_process_environment() {
    env::set_var(ENV_SCAN_DIR, "deploy");
    env::set_var(ENV_GITLAB_REPO, "https://gitlab.example.com/group/infra.git");
    env::set_var(ENV_GITLAB_TOKEN, "");

    let mut config = Config::default();
    config.apply_env();

    env::remove_var(ENV_SCAN_DIR);
    env::remove_var(ENV_GITLAB_REPO);
    env::remove_var(ENV_GITLAB_TOKEN);

    assert_eq!(config.scan_dir.as_deref(), Some("deploy"));
    assert!(config.has_gitlab_repo());
    assert!(config.gitlab.token.is_none());
}

#[test]
#[serial]
fn test_gitlab_validation_names_missing_variables() {
    env::set_var(ENV_GITLAB_REPO, "ftp://gitlab.example.com/group/infra.git");

    let mut config = Config::default();
    config.apply_env();
    env::remove_var(ENV_GITLAB_REPO);

    let msg = config.validate_gitlab().unwrap_err().to_string();
    assert!(msg.contains("IMG_UPGR_GL_USER"));
    assert!(msg.contains("IMG_UPGR_GL_TOKEN"));
    assert!(msg.contains("IMG_UPGR_GL_EMAIL"));
    assert!(!msg.contains("IMG_UPGR_GL_REPO,"));
    assert!(msg.contains("http or https"));
}
