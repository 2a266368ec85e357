use crate::error::{ImgUpgrError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_SCAN_DIR: &str = "IMG_UPGR_SCANDIR";
pub const ENV_LOG_LEVEL: &str = "IMG_UPGR_LOG_LEVEL";
pub const ENV_GITLAB_USER: &str = "IMG_UPGR_GL_USER";
pub const ENV_GITLAB_TOKEN: &str = "IMG_UPGR_GL_TOKEN";
pub const ENV_GITLAB_REPO: &str = "IMG_UPGR_GL_REPO";
pub const ENV_GITLAB_PROJECT: &str = "IMG_UPGR_GL_PROJECT_ID";
pub const ENV_GITLAB_EMAIL: &str = "IMG_UPGR_GL_EMAIL";
pub const ENV_OUTPUT_FORMAT: &str = "IMG_UPGR_OUTPUT_FORMAT";

pub const VALID_LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARN", "WARNING", "ERROR", "FATAL"];
pub const VALID_OUTPUT_FORMATS: &[&str] = &["text", "json", "yaml"];

pub const DEFAULT_REGISTRY_URL: &str = "https://hub.docker.com/v2/repositories";

/// Represents the complete configuration for img-upgr.
///
/// Built from defaults, an optional TOML file, then `IMG_UPGR_*` environment
/// variables, then command-line flags. Passed explicitly to every component.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub quiet: bool,

    #[serde(default = "default_output_format")]
    pub output_format: String,

    #[serde(default)]
    pub dry_run: bool,

    /// Directory (or file) to scan, relative to the checkout when one exists
    #[serde(default)]
    pub scan_dir: Option<String>,

    #[serde(default)]
    pub create_mr: bool,

    /// Branch proposals target; the repository default when unset
    #[serde(default)]
    pub target_branch: Option<String>,

    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub registry: RegistryConfig,
}

/// GitLab credentials and repository location
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct GitLabConfig {
    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    /// HTTPS clone URL of the repository holding the manifests
    #[serde(default)]
    pub repo: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Numeric project ID or full path; takes precedence over the path in `repo`
    #[serde(default)]
    pub project_id: Option<String>,
}

/// Registry index settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_url")]
    pub base_url: String,

    #[serde(default = "default_page_size")]
    pub page_size: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Images resolved in parallel
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_output_format() -> String {
    "text".to_string()
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}

fn default_page_size() -> usize {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            base_url: default_registry_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            verbose: false,
            quiet: false,
            output_format: default_output_format(),
            dry_run: false,
            scan_dir: None,
            create_mr: false,
            target_branch: None,
            gitlab: GitLabConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

impl Config {
    /// Apply `IMG_UPGR_*` overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; empty values are ignored
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_SCAN_DIR) {
            self.scan_dir = Some(v);
        }
        if let Some(v) = get(ENV_LOG_LEVEL) {
            self.log_level = v;
        }
        if let Some(v) = get(ENV_OUTPUT_FORMAT) {
            self.output_format = v;
        }
        if let Some(v) = get(ENV_GITLAB_USER) {
            self.gitlab.user = Some(v);
        }
        if let Some(v) = get(ENV_GITLAB_TOKEN) {
            self.gitlab.token = Some(v);
        }
        if let Some(v) = get(ENV_GITLAB_REPO) {
            self.gitlab.repo = Some(v);
        }
        if let Some(v) = get(ENV_GITLAB_PROJECT) {
            self.gitlab.project_id = Some(v);
        }
        if let Some(v) = get(ENV_GITLAB_EMAIL) {
            self.gitlab.email = Some(v);
        }
    }

    /// Validate general settings (log level, output format)
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::default();

        if !VALID_LOG_LEVELS.contains(&self.log_level.to_uppercase().as_str()) {
            errors.add(
                "log_level",
                format!(
                    "invalid log level: {} (valid levels: {})",
                    self.log_level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        if !VALID_OUTPUT_FORMATS.contains(&self.output_format.to_lowercase().as_str()) {
            errors.add(
                "output_format",
                format!(
                    "invalid output format: {} (valid formats: {})",
                    self.output_format,
                    VALID_OUTPUT_FORMATS.join(", ")
                ),
            );
        }

        if self.registry.page_size == 0 {
            errors.add("registry.page_size", "page size must be at least 1");
        }

        if self.registry.concurrency == 0 {
            errors.add("registry.concurrency", "concurrency must be at least 1");
        }

        errors.into_result()
    }

    /// Validate the settings needed to clone and open merge requests
    pub fn validate_gitlab(&self) -> Result<()> {
        let mut errors = ValidationErrors::default();

        let required = [
            (ENV_GITLAB_USER, &self.gitlab.user),
            (ENV_GITLAB_TOKEN, &self.gitlab.token),
            (ENV_GITLAB_REPO, &self.gitlab.repo),
            (ENV_GITLAB_EMAIL, &self.gitlab.email),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.as_deref().map_or(true, str::is_empty))
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            errors.add(
                "gitlab",
                format!("missing required environment variables: {}", missing.join(", ")),
            );
        }

        if let Some(repo) = self.gitlab.repo.as_deref().filter(|r| !r.is_empty()) {
            if let Err(reason) = validate_repo_url(repo) {
                errors.add("gitlab.repo", reason);
            }
        }

        errors.into_result()
    }

    /// Whether a repository to clone is configured
    pub fn has_gitlab_repo(&self) -> bool {
        self.gitlab.repo.as_deref().map_or(false, |r| !r.is_empty())
    }
}

fn validate_repo_url(repo: &str) -> std::result::Result<(), String> {
    let url = reqwest::Url::parse(repo).map_err(|e| format!("invalid URL {}: {}", repo, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("URL must use http or https: {}", repo));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(format!("URL has no host: {}", repo));
    }
    Ok(())
}

/// Every problem found while validating, reported together
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationErrors {
    pub errors: Vec<(String, String)>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push((field.into(), message.into()));
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn into_result(self) -> Result<()> {
        if self.has_errors() {
            Err(ImgUpgrError::config(self.to_string()))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation errors:")?;
        for (field, message) in &self.errors {
            write!(f, "\n  - {}: {}", field, message)?;
        }
        Ok(())
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `img-upgr.toml` in current directory
/// 3. `.img-upgr.toml` in the user config directory
/// 4. Default configuration if no file found
///
/// Environment overrides are not applied here; see [Config::apply_env].
///
/// # Returns
/// * `Ok(Config)` - Loaded or default configuration
/// * `Err` - If file exists but cannot be read or parsed
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let path: Option<PathBuf> = if let Some(path) = config_path {
        Some(PathBuf::from(path))
    } else if Path::new("./img-upgr.toml").exists() {
        Some(PathBuf::from("./img-upgr.toml"))
    } else {
        dirs::config_dir()
            .map(|dir| dir.join(".img-upgr.toml"))
            .filter(|p| p.exists())
    };

    match path {
        Some(path) => {
            let config_str = fs::read_to_string(&path)?;
            toml::from_str(&config_str).map_err(|e| {
                ImgUpgrError::config(format!("cannot parse {}: {}", path.display(), e))
            })
        }
        None => Ok(Config::default()),
    }
}
