use crate::analyzer::resolver::{resolve, Resolution};
use crate::boundary::SkipReason;
use crate::domain::{ImageReference, ParsedTag, UpdateCandidate};
use crate::error::{ImgUpgrError, Result};
use crate::manifest::Manifest;
use crate::registry::TagSource;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of checking a single image against the registry
#[derive(Debug, Clone, PartialEq)]
pub enum ImageStatus {
    UpdateAvailable {
        image: ImageReference,
        resolution: Resolution,
    },
    Skipped(SkipReason),
}

/// Check one image string for a newer tag
///
/// Tags that cannot be tracked come back as [ImageStatus::Skipped]; only
/// registry failures (including cancellation) are errors.
pub async fn check_image<S>(
    source: &S,
    image: &str,
    cancel: &CancellationToken,
) -> Result<ImageStatus>
where
    S: TagSource + ?Sized,
{
    debug!(image = %image, "checking image");

    let reference = match ImageReference::parse(image) {
        Ok(reference) => reference,
        Err(ImgUpgrError::NoTagFound(_)) => {
            debug!(image = %image, "no tag found in image");
            return Ok(ImageStatus::Skipped(SkipReason::NoTagFound {
                image: image.to_string(),
            }));
        }
        Err(e) => return Err(e),
    };

    let parsed = match ParsedTag::parse(&reference.tag) {
        Ok(parsed) => parsed,
        Err(ImgUpgrError::NotVersionLike(_)) => {
            debug!(tag = %reference.tag, "tag not version-like");
            return Ok(ImageStatus::Skipped(SkipReason::NotVersionLike {
                tag: reference.tag,
            }));
        }
        Err(e) => return Err(e),
    };
    debug!(prefix = %parsed.prefix, version = %parsed.version, "parsed tag");

    let tags = source.fetch_all_tags(&reference.repository, cancel).await?;

    match resolve(&parsed, &tags) {
        None => Ok(ImageStatus::Skipped(SkipReason::NoMatchingVersions {
            repository: reference.repository,
            prefix: parsed.prefix,
        })),
        Some(resolution) if !resolution.has_update => {
            debug!(
                repository = %reference.repository,
                tag = %reference.tag,
                "already the latest version"
            );
            Ok(ImageStatus::Skipped(SkipReason::UpToDate {
                tag: reference.tag,
            }))
        }
        Some(resolution) => {
            info!(
                repository = %reference.repository,
                from = %reference.tag,
                to = %resolution.latest_tag,
                "update available"
            );
            Ok(ImageStatus::UpdateAvailable {
                image: reference,
                resolution,
            })
        }
    }
}

/// A service whose image was left alone
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub service_name: String,
    pub file_path: PathBuf,
    pub reason: SkipReason,
}

/// A service whose image could not be checked
#[derive(Debug, Clone, PartialEq)]
pub struct FailedImage {
    pub service_name: String,
    pub file_path: PathBuf,
    pub error: String,
}

/// Everything learned while checking a set of manifests
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    pub candidates: Vec<UpdateCandidate>,
    pub skipped: Vec<SkippedImage>,
    pub failed: Vec<FailedImage>,
}

/// How the build ended
///
/// A cancelled build still carries the candidates collected before the
/// signal; the caller decides whether to use them.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Complete(BuildReport),
    Cancelled(BuildReport),
}

impl BuildOutcome {
    pub fn report(&self) -> &BuildReport {
        match self {
            BuildOutcome::Complete(report) | BuildOutcome::Cancelled(report) => report,
        }
    }

    pub fn into_report(self) -> BuildReport {
        match self {
            BuildOutcome::Complete(report) | BuildOutcome::Cancelled(report) => report,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BuildOutcome::Cancelled(_))
    }
}

struct ImageJob {
    service_name: String,
    file_path: PathBuf,
    image: String,
}

/// Checks every service image across manifests and collects the updates
pub struct UpdateSetBuilder<'a, S: TagSource + ?Sized> {
    source: &'a S,
    concurrency: usize,
}

impl<'a, S: TagSource + ?Sized> UpdateSetBuilder<'a, S> {
    /// `concurrency` bounds the number of images resolved at the same time
    pub fn new(source: &'a S, concurrency: usize) -> Self {
        UpdateSetBuilder {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Check all images, manifest order then service-name order
    ///
    /// Per-image problems are logged and recorded; cancellation stops the
    /// build and returns what was collected so far.
    pub async fn build(&self, manifests: &[Manifest], cancel: &CancellationToken) -> BuildOutcome {
        let mut jobs = Vec::new();
        for manifest in manifests {
            if manifest.images.is_empty() {
                info!(file = %manifest.path.display(), "no images found in compose file");
                continue;
            }
            info!(
                file = %manifest.path.display(),
                services = manifest.images.len(),
                "found services with images"
            );
            for (service_name, image) in &manifest.images {
                jobs.push(ImageJob {
                    service_name: service_name.clone(),
                    file_path: manifest.path.clone(),
                    image: image.clone(),
                });
            }
        }

        let source = self.source;
        let mut results = stream::iter(jobs)
            .map(move |job| async move {
                let status = if cancel.is_cancelled() {
                    Err(ImgUpgrError::Cancelled)
                } else {
                    check_image(source, &job.image, cancel).await
                };
                (job, status)
            })
            .buffered(self.concurrency);

        let mut report = BuildReport::default();
        while let Some((job, status)) = results.next().await {
            match status {
                Ok(ImageStatus::UpdateAvailable { image, resolution }) => {
                    report.candidates.push(UpdateCandidate {
                        service_name: job.service_name,
                        file_path: job.file_path,
                        old_image: job.image,
                        new_image: image.with_tag(&resolution.latest_tag),
                        repository: image.repository,
                        old_tag: image.tag,
                        new_tag: resolution.latest_tag,
                    });
                }
                Ok(ImageStatus::Skipped(reason)) => {
                    info!(service = %job.service_name, reason = %reason, "skipping image");
                    report.skipped.push(SkippedImage {
                        service_name: job.service_name,
                        file_path: job.file_path,
                        reason,
                    });
                }
                Err(e) if e.is_cancelled() => {
                    warn!(
                        service = %job.service_name,
                        found = report.candidates.len(),
                        "scan cancelled"
                    );
                    return BuildOutcome::Cancelled(report);
                }
                Err(e) => {
                    error!(service = %job.service_name, image = %job.image, error = %e, "error checking image");
                    report.failed.push(FailedImage {
                        service_name: job.service_name,
                        file_path: job.file_path,
                        error: e.to_string(),
                    });
                }
            }
        }

        BuildOutcome::Complete(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MockTagSource;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves tags from `inner` until call `cancel_on`, which fires `cancel`
    struct CancelOnCall {
        inner: MockTagSource,
        calls: AtomicUsize,
        cancel_on: usize,
        cancel: CancellationToken,
    }

    #[async_trait]
    impl TagSource for CancelOnCall {
        async fn fetch_all_tags(
            &self,
            repository: &str,
            cancel: &CancellationToken,
        ) -> Result<Vec<String>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.cancel_on {
                self.cancel.cancel();
                return Err(ImgUpgrError::Cancelled);
            }
            self.inner.fetch_all_tags(repository, cancel).await
        }
    }

    fn manifest(path: &str, services: &[(&str, &str)]) -> Manifest {
        Manifest {
            path: PathBuf::from(path),
            images: services
                .iter()
                .map(|(s, i)| (s.to_string(), i.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn test_check_image_update_available() {
        let source = MockTagSource::new().with_tags("nginx", &["apache-2.34.0", "apache-2.35.0"]);
        let cancel = CancellationToken::new();

        let status = check_image(&source, "nginx:apache-2.34.0", &cancel)
            .await
            .unwrap();
        match status {
            ImageStatus::UpdateAvailable { image, resolution } => {
                assert_eq!(image.repository, "nginx");
                assert_eq!(resolution.latest_tag, "apache-2.35.0");
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_check_image_skips_without_registry_call() {
        let source = MockTagSource::new();
        let cancel = CancellationToken::new();

        let status = check_image(&source, "myapp:latest", &cancel).await.unwrap();
        assert_eq!(
            status,
            ImageStatus::Skipped(SkipReason::NotVersionLike {
                tag: "latest".to_string()
            })
        );

        let status = check_image(&source, "myapp", &cancel).await.unwrap();
        assert!(matches!(
            status,
            ImageStatus::Skipped(SkipReason::NoTagFound { .. })
        ));
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn test_build_keeps_manifest_then_service_order() {
        let source = MockTagSource::new()
            .with_tags("redis", &["7.0.0", "7.2.0"])
            .with_tags("postgres", &["15.0.0", "16.1.0"])
            .with_tags("nginx", &["1.25.0", "1.25.3"]);
        let manifests = vec![
            manifest("b/compose.yml", &[("web", "nginx:1.25.0"), ("cache", "redis:7.0.0")]),
            manifest("a/compose.yml", &[("db", "postgres:15.0.0")]),
        ];

        let outcome = UpdateSetBuilder::new(&source, 3)
            .build(&manifests, &CancellationToken::new())
            .await;
        assert!(!outcome.is_cancelled());

        let services: Vec<&str> = outcome
            .report()
            .candidates
            .iter()
            .map(|c| c.service_name.as_str())
            .collect();
        assert_eq!(services, vec!["cache", "web", "db"]);

        let cache = &outcome.report().candidates[0];
        assert_eq!(cache.old_image, "redis:7.0.0");
        assert_eq!(cache.new_image, "redis:7.2.0");
        assert_eq!(cache.file_path, PathBuf::from("b/compose.yml"));
    }

    #[tokio::test]
    async fn test_build_registry_errors_do_not_abort() {
        let source = MockTagSource::new()
            .with_status("private/app", 401)
            .with_tags("redis", &["7.0.0", "7.0.1"]);
        let manifests = vec![manifest(
            "compose.yml",
            &[
                ("app", "private/app:1.0.0"),
                ("ghost", "ghost:1.0.0"),
                ("redis", "redis:7.0.0"),
            ],
        )];

        let report = UpdateSetBuilder::new(&source, 1)
            .build(&manifests, &CancellationToken::new())
            .await
            .into_report();

        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].service_name, "app");
        assert_eq!(report.failed[1].service_name, "ghost");
    }

    #[tokio::test]
    async fn test_build_cancelled_before_start() {
        let source = MockTagSource::new().with_tags("redis", &["7.0.0", "7.0.1"]);
        let manifests = vec![manifest("compose.yml", &[("redis", "redis:7.0.0")])];
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = UpdateSetBuilder::new(&source, 2)
            .build(&manifests, &cancel)
            .await;

        assert!(outcome.is_cancelled());
        assert!(outcome.report().candidates.is_empty());
        assert!(source.requests().is_empty());
    }

    #[tokio::test]
    async fn test_build_cancelled_midway_keeps_earlier_candidates() {
        let cancel = CancellationToken::new();
        let source = CancelOnCall {
            inner: MockTagSource::new()
                .with_tags("redis", &["7.0.0", "7.2.0"])
                .with_tags("postgres", &["15.0.0", "16.1.0"])
                .with_tags("nginx", &["1.25.0", "1.25.3"]),
            calls: AtomicUsize::new(0),
            cancel_on: 2,
            cancel: cancel.clone(),
        };
        let manifests = vec![manifest(
            "compose.yml",
            &[
                ("a-cache", "redis:7.0.0"),
                ("b-db", "postgres:15.0.0"),
                ("c-web", "nginx:1.25.0"),
            ],
        )];

        let outcome = UpdateSetBuilder::new(&source, 1)
            .build(&manifests, &cancel)
            .await;

        assert!(outcome.is_cancelled());
        let report = outcome.into_report();
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].service_name, "a-cache");
        assert_eq!(report.candidates[0].new_image, "redis:7.2.0");
        assert!(report.failed.is_empty());
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
