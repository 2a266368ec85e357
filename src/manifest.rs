//! docker-compose discovery and parsing

use crate::error::{ImgUpgrError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Substrings that mark a file as a compose file
pub const COMPOSE_NAMES: &[&str] = &["docker-compose", "compose"];
pub const COMPOSE_EXTENSIONS: &[&str] = &[".yml", ".yaml"];
pub const DIRECTORIES_TO_SKIP: &[&str] = &[".git", "node_modules", "vendor"];

/// The part of a docker-compose file img-upgr cares about
#[derive(Debug, Deserialize, Default)]
pub struct ComposeFile {
    #[serde(default)]
    pub services: BTreeMap<String, Service>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Service {
    #[serde(default)]
    pub image: Option<String>,
}

impl ComposeFile {
    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str::<Option<ComposeFile>>(content)
            .map(Option::unwrap_or_default)
            .map_err(|e| ImgUpgrError::manifest(format!("failed to parse YAML: {}", e)))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ImgUpgrError::manifest(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Service name to image, for services that declare one
    pub fn images(&self) -> BTreeMap<String, String> {
        self.services
            .iter()
            .filter_map(|(name, service)| {
                service
                    .image
                    .as_ref()
                    .filter(|image| !image.is_empty())
                    .map(|image| (name.clone(), image.clone()))
            })
            .collect()
    }
}

/// Images declared in one manifest file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub path: PathBuf,
    pub images: BTreeMap<String, String>,
}

/// Parse every file; unreadable or invalid files contribute no images
pub fn load_manifests(paths: &[PathBuf]) -> Vec<Manifest> {
    paths
        .iter()
        .map(|path| {
            info!(file = %path.display(), "processing compose file");
            let images = match ComposeFile::from_path(path) {
                Ok(compose) => compose.images(),
                Err(e) => {
                    error!(file = %path.display(), error = %e, "error parsing compose file");
                    BTreeMap::new()
                }
            };
            Manifest {
                path: path.clone(),
                images,
            }
        })
        .collect()
}

/// Whether a file name looks like a compose file
pub fn is_compose_file(file_name: &str) -> bool {
    COMPOSE_NAMES.iter().any(|n| file_name.contains(n))
        && COMPOSE_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext))
}

/// Recursively find compose files under `dir`, sorted by path
pub fn find_compose_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ImgUpgrError::manifest(format!(
            "not a directory: {}",
            dir.display()
        )));
    }

    debug!(dir = %dir.display(), "scanning directory");
    let mut found = Vec::new();
    walk(dir, &mut found)?;
    found.sort();

    info!(dir = %dir.display(), count = found.len(), "found compose files");
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();

        if entry.file_type()?.is_dir() {
            if !DIRECTORIES_TO_SKIP.contains(&name.as_str()) {
                walk(&path, found)?;
            }
        } else if is_compose_file(&name) {
            debug!(file = %path.display(), "found compose file");
            found.push(path);
        }
    }
    Ok(())
}

/// Resolve what to scan: a single file, or every compose file in a directory
pub fn resolve_scan_target(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(ImgUpgrError::manifest(format!(
            "path does not exist: {}",
            path.display()
        )));
    }

    let files = if path.is_dir() {
        find_compose_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    if files.is_empty() {
        return Err(ImgUpgrError::manifest(format!(
            "no compose files found in {}",
            path.display()
        )));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const COMPOSE: &str = r#"
services:
  web:
    image: nginx:1.25.0
    ports:
      - "80:80"
  worker:
    build: .
  cache:
    image: redis:7.0.0
"#;

    #[test]
    fn test_images_only_services_with_image() {
        let compose = ComposeFile::parse(COMPOSE).unwrap();
        let images = compose.images();
        assert_eq!(images.len(), 2);
        assert_eq!(images.get("web").map(String::as_str), Some("nginx:1.25.0"));
        assert_eq!(images.get("cache").map(String::as_str), Some("redis:7.0.0"));
        assert_eq!(images.keys().collect::<Vec<_>>(), vec!["cache", "web"]);
    }

    #[test]
    fn test_empty_document_has_no_images() {
        assert!(ComposeFile::parse("").unwrap().images().is_empty());
        assert!(ComposeFile::parse("version: '3'\n").unwrap().images().is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(ComposeFile::parse("services: [unclosed").is_err());
    }

    #[test]
    fn test_is_compose_file() {
        assert!(is_compose_file("docker-compose.yml"));
        assert!(is_compose_file("docker-compose.prod.yaml"));
        assert!(is_compose_file("compose.yaml"));
        assert!(!is_compose_file("compose.json"));
        assert!(!is_compose_file("values.yaml"));
    }

    #[test]
    fn test_find_compose_files_skips_ignored_dirs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("stack/app")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("docker-compose.yml"), COMPOSE).unwrap();
        fs::write(root.join("stack/app/compose.yaml"), COMPOSE).unwrap();
        fs::write(root.join("stack/app/README.md"), "docs").unwrap();
        fs::write(root.join("node_modules/pkg/docker-compose.yml"), COMPOSE).unwrap();
        fs::write(root.join(".git/compose.yml"), COMPOSE).unwrap();

        let files = find_compose_files(root).unwrap();
        assert_eq!(
            files,
            vec![
                root.join("docker-compose.yml"),
                root.join("stack/app/compose.yaml")
            ]
        );
    }

    #[test]
    fn test_load_manifests_tolerates_bad_files() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("docker-compose.yml");
        let bad = dir.path().join("broken-compose.yml");
        let missing = dir.path().join("missing-compose.yml");
        fs::write(&good, COMPOSE).unwrap();
        fs::write(&bad, "services: [unclosed").unwrap();

        let manifests = load_manifests(&[good, bad, missing]);
        assert_eq!(manifests.len(), 3);
        assert_eq!(manifests[0].images.len(), 2);
        assert!(manifests[1].images.is_empty());
        assert!(manifests[2].images.is_empty());
    }

    #[test]
    fn test_resolve_scan_target() {
        let dir = TempDir::new().unwrap();
        assert!(resolve_scan_target(&dir.path().join("nope")).is_err());
        assert!(resolve_scan_target(dir.path()).is_err());

        let file = dir.path().join("docker-compose.yml");
        fs::write(&file, COMPOSE).unwrap();
        assert_eq!(resolve_scan_target(&file).unwrap(), vec![file.clone()]);
        assert_eq!(resolve_scan_target(dir.path()).unwrap(), vec![file]);
    }
}
