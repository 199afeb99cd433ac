//! Source providers
//!
//! Fetch the checked-out source of one server version. Failures are
//! reported as [`SourceError`] and turn into skipped versions, never into
//! a failed run.

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{ErrorCode, FetchOptions, RemoteCallbacks, Repository};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// One server version to assess
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub server_name: String,
    pub slug: String,
    pub repository: String,
    pub version: String,
}

impl ScanTarget {
    pub fn label(&self) -> String {
        format!("{}@{}", self.slug, self.version)
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no source for {target} under {path}")]
    NotFound { target: String, path: PathBuf },

    #[error("repository for {target} is unreachable: {reason}")]
    Unreachable { target: String, reason: String },

    #[error("{target} has an unsafe path component '{component}'")]
    UnsafePath { target: String, component: String },

    #[error("{target} has no repository URL")]
    MissingRepository { target: String },

    #[error("failed to prepare checkout for {target}: {source}")]
    Io {
        target: String,
        #[source]
        source: std::io::Error,
    },
}

/// A checked-out tree. Temporary clones are removed on drop.
#[derive(Debug)]
pub struct Checkout {
    path: PathBuf,
    /// Which ref was checked out, when known
    pub resolved_ref: Option<String>,
    _workdir: Option<TempDir>,
}

impl Checkout {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub trait SourceProvider: Send + Sync {
    fn checkout(&self, target: &ScanTarget) -> Result<Checkout, SourceError>;
}

/// Pre-fetched sources laid out as `<root>/<slug>/<version>`, or `<root>/<slug>`.
#[derive(Debug, Clone)]
pub struct LocalSourceProvider {
    root: PathBuf,
}

impl LocalSourceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// A slug or version must name exactly one directory below the root.
fn is_safe_component(component: &str) -> bool {
    !component.is_empty()
        && !component.contains(&['/', '\\'][..])
        && !component.contains("..")
        && !Path::new(component).is_absolute()
}

impl SourceProvider for LocalSourceProvider {
    fn checkout(&self, target: &ScanTarget) -> Result<Checkout, SourceError> {
        for component in [&target.slug, &target.version] {
            if !is_safe_component(component) {
                return Err(SourceError::UnsafePath {
                    target: target.label(),
                    component: component.clone(),
                });
            }
        }
        let versioned = self.root.join(&target.slug).join(&target.version);
        let unversioned = self.root.join(&target.slug);
        let path = if versioned.is_dir() {
            versioned
        } else if unversioned.is_dir() {
            debug!(
                "No versioned checkout for {}, using {}",
                target.label(),
                unversioned.display()
            );
            unversioned
        } else {
            return Err(SourceError::NotFound {
                target: target.label(),
                path: self.root.clone(),
            });
        };
        Ok(Checkout {
            path,
            resolved_ref: None,
            _workdir: None,
        })
    }
}

/// Clones the repository into a temporary directory and checks out the
/// version tag (`v<version>` or `<version>`), else the default branch.
#[derive(Debug, Clone)]
pub struct GitSourceProvider {
    clone_timeout: Duration,
}

impl Default for GitSourceProvider {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

/// Point in time after which a running clone is aborted
#[derive(Debug, Clone, Copy)]
struct CloneDeadline(Instant);

impl CloneDeadline {
    fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    /// Returning false from a transfer callback makes libgit2 abort the fetch.
    fn allows_progress(self) -> bool {
        Instant::now() < self.0
    }
}

impl GitSourceProvider {
    pub fn new(clone_timeout: Duration) -> Self {
        Self { clone_timeout }
    }

    fn fetch_options(deadline: CloneDeadline) -> FetchOptions<'static> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.transfer_progress(move |_| deadline.allows_progress());
        callbacks.sideband_progress(move |_| deadline.allows_progress());
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(callbacks);
        fetch
    }

    fn checkout_tag(repo: &Repository, version: &str) -> Result<Option<String>, git2::Error> {
        for candidate in [format!("v{}", version), version.to_string()] {
            let Ok(object) = repo.revparse_single(&format!("refs/tags/{}", candidate)) else {
                continue;
            };
            let commit = object.peel_to_commit()?;
            repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
            repo.set_head_detached(commit.id())?;
            return Ok(Some(candidate));
        }
        Ok(None)
    }
}

impl SourceProvider for GitSourceProvider {
    fn checkout(&self, target: &ScanTarget) -> Result<Checkout, SourceError> {
        if target.repository.trim().is_empty() {
            return Err(SourceError::MissingRepository {
                target: target.label(),
            });
        }

        let workdir = tempfile::Builder::new()
            .prefix(&format!("mcpvet-{}-", target.slug))
            .tempdir()
            .map_err(|source| SourceError::Io {
                target: target.label(),
                source,
            })?;

        info!("Cloning {} for {}", target.repository, target.label());
        let deadline = CloneDeadline::after(self.clone_timeout);
        let repo = RepoBuilder::new()
            .fetch_options(Self::fetch_options(deadline))
            .clone(&target.repository, workdir.path())
            .map_err(|e| {
                let reason = if e.code() == ErrorCode::User && !deadline.allows_progress() {
                    format!("clone exceeded {}s", self.clone_timeout.as_secs())
                } else {
                    e.message().to_string()
                };
                SourceError::Unreachable {
                    target: target.label(),
                    reason,
                }
            })?;

        let resolved_ref = match Self::checkout_tag(&repo, &target.version) {
            Ok(Some(tag)) => Some(tag),
            Ok(None) => {
                warn!(
                    "No tag for {}; scanning the default branch",
                    target.label()
                );
                None
            }
            Err(e) => {
                return Err(SourceError::Unreachable {
                    target: target.label(),
                    reason: format!("checkout failed: {}", e.message()),
                })
            }
        };

        Ok(Checkout {
            path: workdir.path().to_path_buf(),
            resolved_ref,
            _workdir: Some(workdir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn target(slug: &str, version: &str, repository: &str) -> ScanTarget {
        ScanTarget {
            server_name: slug.to_string(),
            slug: slug.to_string(),
            repository: repository.to_string(),
            version: version.to_string(),
        }
    }

    fn commit_file(repo: &Repository, dir: &Path, name: &str, content: &str, msg: &str) -> git2::Oid {
        fs::write(dir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Test User", "test@example.com").unwrap();
        let parents: Vec<git2::Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parent_refs)
            .unwrap()
    }

    #[test]
    fn test_local_versioned_then_unversioned() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("alpha/1.0.0")).unwrap();
        fs::create_dir_all(root.path().join("beta")).unwrap();
        let provider = LocalSourceProvider::new(root.path());

        let alpha = provider.checkout(&target("alpha", "1.0.0", "")).unwrap();
        assert!(alpha.path().ends_with("alpha/1.0.0"));

        let beta = provider.checkout(&target("beta", "2.0.0", "")).unwrap();
        assert!(beta.path().ends_with("beta"));

        let missing = provider.checkout(&target("gamma", "1.0.0", ""));
        assert!(matches!(missing, Err(SourceError::NotFound { .. })));
    }

    #[test]
    fn test_git_checks_out_version_tag() {
        let upstream = tempfile::tempdir().unwrap();
        let repo = Repository::init(upstream.path()).unwrap();
        let first = commit_file(&repo, upstream.path(), "VERSION", "1.0.0", "release 1");
        let obj = repo.find_object(first, None).unwrap();
        repo.tag_lightweight("v1.0.0", &obj, false).unwrap();
        commit_file(&repo, upstream.path(), "VERSION", "2.0.0-dev", "work");

        let url = upstream.path().to_string_lossy().to_string();
        let checkout = GitSourceProvider::default()
            .checkout(&target("demo", "1.0.0", &url))
            .unwrap();
        assert_eq!(checkout.resolved_ref.as_deref(), Some("v1.0.0"));
        assert_eq!(
            fs::read_to_string(checkout.path().join("VERSION")).unwrap(),
            "1.0.0"
        );

        let untagged = GitSourceProvider::default()
            .checkout(&target("demo", "9.9.9", &url))
            .unwrap();
        assert!(untagged.resolved_ref.is_none());
        assert_eq!(
            fs::read_to_string(untagged.path().join("VERSION")).unwrap(),
            "2.0.0-dev"
        );
    }

    #[test]
    fn test_git_unreachable() {
        let missing = tempfile::tempdir().unwrap();
        let url = missing.path().join("nope").to_string_lossy().to_string();
        let result = GitSourceProvider::default().checkout(&target("demo", "1.0.0", &url));
        assert!(matches!(result, Err(SourceError::Unreachable { .. })));
    }

    #[test]
    fn test_git_missing_repository_url() {
        let result = GitSourceProvider::default().checkout(&target("demo", "1.0.0", " "));
        assert!(matches!(result, Err(SourceError::MissingRepository { .. })));
    }

    #[test]
    fn test_clone_dir_removed_on_drop() {
        let upstream = tempfile::tempdir().unwrap();
        let repo = Repository::init(upstream.path()).unwrap();
        commit_file(&repo, upstream.path(), "README.md", "# x", "init");
        let url = upstream.path().to_string_lossy().to_string();
        let checkout = GitSourceProvider::default().checkout(&target("demo", "1.0.0", &url)).unwrap();
        let path = checkout.path().to_path_buf();
        assert!(path.exists());
        drop(checkout);
        assert!(!path.exists());
    }

    #[test]
    fn test_local_rejects_escaping_version() {
        let root = tempfile::tempdir().unwrap();
        let sources = root.path().join("sources");
        fs::create_dir_all(sources.join("alpha")).unwrap();
        fs::create_dir_all(root.path().join("x")).unwrap();
        let provider = LocalSourceProvider::new(&sources);

        for version in ["../../x", "..", "1.0/../..", "/etc", "a\\b"] {
            let result = provider.checkout(&target("alpha", version, ""));
            assert!(
                matches!(result, Err(SourceError::UnsafePath { .. })),
                "accepted {}",
                version
            );
        }
        let result = provider.checkout(&target("../x", "1.0.0", ""));
        assert!(matches!(result, Err(SourceError::UnsafePath { .. })));
    }

    #[test]
    fn test_clone_deadline() {
        assert!(!CloneDeadline::after(Duration::ZERO).allows_progress());
        assert!(CloneDeadline::after(Duration::from_secs(60)).allows_progress());
    }

    #[test]
    fn test_git_clone_within_timeout() {
        let upstream = tempfile::tempdir().unwrap();
        let repo = Repository::init(upstream.path()).unwrap();
        commit_file(&repo, upstream.path(), "README.md", "# x", "init");
        let url = upstream.path().to_string_lossy().to_string();
        let checkout = GitSourceProvider::new(Duration::from_secs(60))
            .checkout(&target("demo", "1.0.0", &url))
            .unwrap();
        assert!(checkout.path().join("README.md").is_file());
    }
}
