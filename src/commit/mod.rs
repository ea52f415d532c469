// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Recording the deployed tag
//!
//! [`StateCommitter`] rewrites the version-tag field of the tracked
//! deployment configuration and, when the content actually changed, records
//! the change through a [`VersionControl`] implementation. Applying the same
//! tag twice is a no-op the second time.

use async_trait::async_trait;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;

use crate::config::DeploySettings;
use crate::errors::{ShiplineError, ShiplineResult};

/// Outcome of applying a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    /// File changed; `commit` is the new revision when one was recorded
    Committed {
        commit: Option<String>,
        message: String,
    },
    /// File already carried the tag
    NoOpNoChange,
}

impl fmt::Display for CommitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed {
                commit: Some(commit),
                message,
            } => write!(f, "committed {} ({})", commit, message),
            Self::Committed {
                commit: None,
                message,
            } => write!(f, "updated ({})", message),
            Self::NoOpNoChange => write!(f, "no change"),
        }
    }
}

/// Records a changed file in version-control history
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Commit `path` with `message`, returning the new revision id
    async fn commit(&self, path: &Path, message: &str) -> ShiplineResult<String>;
}

/// `git` command-line backend
#[derive(Debug, Clone)]
pub struct GitCli {
    pub author_name: String,
    pub author_email: String,
    pub push: bool,
}

impl GitCli {
    pub fn from_settings(deploy: &DeploySettings) -> Self {
        Self {
            author_name: deploy.author_name.clone(),
            author_email: deploy.author_email.clone(),
            push: deploy.push,
        }
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> ShiplineResult<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .map_err(|e| ShiplineError::Vcs {
                message: format!("could not run git: {}", e),
            })?;

        if !output.status.success() {
            return Err(ShiplineError::Vcs {
                message: format!(
                    "git {} failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn commit(&self, path: &Path, message: &str) -> ShiplineResult<String> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file = path.to_string_lossy();
        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);

        self.git(dir, &["add", "--", &file]).await?;
        self.git(dir, &["-c", &name, "-c", &email, "commit", "-m", message, "--", &file])
            .await?;
        let revision = self.git(dir, &["rev-parse", "HEAD"]).await?;

        if self.push {
            self.git(dir, &["push"]).await?;
        }

        Ok(revision)
    }
}

/// Applies a tag to the deployment configuration
#[derive(Clone)]
pub struct StateCommitter {
    field: String,
    pattern: Regex,
    vcs: Option<Arc<dyn VersionControl>>,
}

impl fmt::Debug for StateCommitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCommitter")
            .field("field", &self.field)
            .field("records", &self.vcs.is_some())
            .finish()
    }
}

impl StateCommitter {
    /// Committer for `field` that only rewrites the file
    pub fn new(field: &str) -> ShiplineResult<Self> {
        if field.trim().is_empty() {
            return Err(ShiplineError::InvalidConfig {
                reason: "deploy.field must not be empty".into(),
            });
        }

        // `field: value`, optionally list-prefixed or quoted
        let pattern = Regex::new(&format!(
            r#"(?m)^([ \t]*(?:-[ \t]*)?{}[ \t]*:[ \t]*)(["']?)([^"'\s#]*)(["']?)"#,
            regex::escape(field)
        ))
        .map_err(|e| ShiplineError::InvalidConfig {
            reason: format!("deploy.field '{}': {}", field, e),
        })?;

        Ok(Self {
            field: field.to_string(),
            pattern,
            vcs: None,
        })
    }

    /// Record changes through `vcs`
    pub fn with_vcs(mut self, vcs: Arc<dyn VersionControl>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    /// Committer configured from deploy settings, using git when enabled
    pub fn from_settings(deploy: &DeploySettings) -> ShiplineResult<Self> {
        let committer = Self::new(&deploy.field)?;
        Ok(if deploy.commit {
            committer.with_vcs(Arc::new(GitCli::from_settings(deploy)))
        } else {
            committer
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn records(&self) -> bool {
        self.vcs.is_some()
    }

    /// Deterministic commit message for a tag
    pub fn commit_message(tag: &str) -> String {
        format!("deploy: set image tag to {} [skip ci]", tag)
    }

    /// Replace every occurrence of the field's value with `tag`
    ///
    /// Returns `None` when the field does not occur.
    pub fn substitute(&self, content: &str, tag: &str) -> Option<String> {
        if !self.pattern.is_match(content) {
            return None;
        }

        let replaced = self.pattern.replace_all(content, |caps: &Captures<'_>| {
            if &caps[3] == tag {
                return caps[0].to_string();
            }
            // `field:` with no value needs a space before the new one
            let separator = if caps[3].is_empty() && caps[1].ends_with(':') {
                " "
            } else {
                ""
            };
            format!("{}{}{}{}{}", &caps[1], separator, &caps[2], tag, &caps[4])
        });
        Some(replaced.into_owned())
    }

    /// Write `tag` into the file at `path` and record the change
    pub async fn apply(&self, path: &Path, tag: &str) -> ShiplineResult<CommitOutcome> {
        let write_error = |error: String| ShiplineError::Write {
            path: path.to_path_buf(),
            error,
        };

        if tag.trim().is_empty() {
            return Err(write_error("tag is empty".into()));
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| write_error("file does not exist".into()))?;
        if !metadata.is_file() {
            return Err(write_error("not a regular file".into()));
        }
        if metadata.permissions().readonly() {
            return Err(write_error("file is not writable".into()));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| write_error(e.to_string()))?;

        let updated = self
            .substitute(&content, tag)
            .ok_or_else(|| write_error(format!("field '{}' not found", self.field)))?;

        if updated == content {
            tracing::info!(path = %path.display(), tag, "deployment configuration already current");
            return Ok(CommitOutcome::NoOpNoChange);
        }

        tokio::fs::write(path, &updated)
            .await
            .map_err(|e| write_error(e.to_string()))?;

        let message = Self::commit_message(tag);
        let commit = match &self.vcs {
            Some(vcs) => match vcs.commit(path, &message).await {
                Ok(revision) => Some(revision),
                Err(e) => {
                    // Unrecorded edits would make a retry look like a no-op
                    if let Err(restore) = tokio::fs::write(path, &content).await {
                        tracing::warn!(
                            path = %path.display(),
                            error = %restore,
                            "could not restore deployment configuration"
                        );
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        tracing::info!(
            path = %path.display(),
            tag,
            commit = commit.as_deref().unwrap_or("-"),
            "deployment configuration updated"
        );

        Ok(CommitOutcome::Committed { commit, message })
    }
}

/// Resolve the deployment file against the working directory
pub fn deploy_file_path(deploy: &DeploySettings, working_dir: &Path) -> PathBuf {
    if deploy.file.is_absolute() {
        deploy.file.clone()
    } else {
        working_dir.join(&deploy.file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const KUSTOMIZATION: &str = "\
apiVersion: kustomize.config.k8s.io/v1beta1
kind: Kustomization
images:
  - name: ghcr.io/acme/api
    newTag: 0000000 # managed by shipline
";

    #[derive(Default)]
    struct RecordingVcs {
        commits: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VersionControl for RecordingVcs {
        async fn commit(&self, _path: &Path, message: &str) -> ShiplineResult<String> {
            let mut commits = self.commits.lock().unwrap();
            commits.push(message.to_string());
            Ok(format!("rev{}", commits.len()))
        }
    }

    #[test]
    fn test_substitute_keeps_layout() {
        let committer = StateCommitter::new("newTag").unwrap();
        let updated = committer.substitute(KUSTOMIZATION, "abc1234").unwrap();
        assert!(updated.contains("    newTag: abc1234 # managed by shipline\n"));
        assert!(updated.starts_with("apiVersion"));
    }

    #[test]
    fn test_substitute_quoted_and_list_item() {
        let committer = StateCommitter::new("newTag").unwrap();
        assert_eq!(
            committer.substitute("- newTag: \"old\"\n", "abc").unwrap(),
            "- newTag: \"abc\"\n"
        );
        assert_eq!(
            committer.substitute("newTag: 'old'", "abc").unwrap(),
            "newTag: 'abc'"
        );
        assert!(committer.substitute("newName: x\n", "abc").is_none());
    }

    #[test]
    fn test_substitute_empty_value() {
        let committer = StateCommitter::new("newTag").unwrap();
        assert_eq!(committer.substitute("newTag:\n", "abc").unwrap(), "newTag: abc\n");
    }

    #[test]
    fn test_substitute_leaves_current_value_untouched() {
        let committer = StateCommitter::new("newTag").unwrap();
        assert_eq!(
            committer.substitute("newTag:abc123\n", "abc123").unwrap(),
            "newTag:abc123\n"
        );
        assert_eq!(
            committer.substitute("newTag:old\n", "abc123").unwrap(),
            "newTag:abc123\n"
        );
    }

    #[test]
    fn test_empty_field_rejected() {
        assert!(StateCommitter::new(" ").is_err());
    }

    #[test]
    fn test_commit_message_is_deterministic() {
        assert_eq!(
            StateCommitter::commit_message("abc1234"),
            StateCommitter::commit_message("abc1234")
        );
        assert!(StateCommitter::commit_message("abc1234").contains("abc1234"));
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kustomization.yaml");
        std::fs::write(&path, KUSTOMIZATION).unwrap();

        let vcs = Arc::new(RecordingVcs::default());
        let committer = StateCommitter::new("newTag").unwrap().with_vcs(vcs.clone());

        let first = committer.apply(&path, "abc123").await.unwrap();
        let after_first = std::fs::read_to_string(&path).unwrap();
        let second = committer.apply(&path, "abc123").await.unwrap();
        let after_second = std::fs::read_to_string(&path).unwrap();

        assert!(matches!(
            first,
            CommitOutcome::Committed { commit: Some(ref c), .. } if c == "rev1"
        ));
        assert_eq!(second, CommitOutcome::NoOpNoChange);
        assert_eq!(after_first, after_second);
        assert_eq!(vcs.commits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_compact_field_with_current_tag_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kustomization.yaml");
        std::fs::write(&path, "newTag:abc123\n").unwrap();

        let vcs = Arc::new(RecordingVcs::default());
        let committer = StateCommitter::new("newTag").unwrap().with_vcs(vcs.clone());

        let outcome = committer.apply(&path, "abc123").await.unwrap();
        assert_eq!(outcome, CommitOutcome::NoOpNoChange);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "newTag:abc123\n");
        assert!(vcs.commits.lock().unwrap().is_empty());
    }

    /// Rejects the first `failures` commits
    struct FlakyVcs {
        failures: Mutex<usize>,
        commits: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VersionControl for FlakyVcs {
        async fn commit(&self, _path: &Path, message: &str) -> ShiplineResult<String> {
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ShiplineError::Vcs {
                    message: "push rejected".into(),
                });
            }
            let mut commits = self.commits.lock().unwrap();
            commits.push(message.to_string());
            Ok(format!("rev{}", commits.len()))
        }
    }

    #[tokio::test]
    async fn test_failed_commit_restores_file_and_retry_commits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kustomization.yaml");
        std::fs::write(&path, KUSTOMIZATION).unwrap();

        let vcs = Arc::new(FlakyVcs {
            failures: Mutex::new(1),
            commits: Mutex::new(Vec::new()),
        });
        let committer = StateCommitter::new("newTag").unwrap().with_vcs(vcs.clone());

        let first = committer.apply(&path, "abc123").await;
        assert!(matches!(first, Err(ShiplineError::Vcs { .. })));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), KUSTOMIZATION);

        let second = committer.apply(&path, "abc123").await.unwrap();
        assert!(matches!(second, CommitOutcome::Committed { commit: Some(_), .. }));
        assert!(std::fs::read_to_string(&path).unwrap().contains("newTag: abc123"));
        assert_eq!(vcs.commits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_write_error() {
        let dir = TempDir::new().unwrap();
        let err = StateCommitter::new("newTag")
            .unwrap()
            .apply(&dir.path().join("absent.yaml"), "abc")
            .await
            .unwrap_err();
        assert!(matches!(err, ShiplineError::Write { .. }));
    }

    #[tokio::test]
    async fn test_readonly_file_is_write_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kustomization.yaml");
        std::fs::write(&path, KUSTOMIZATION).unwrap();
        let mut permissions = std::fs::metadata(&path).unwrap().permissions();
        permissions.set_readonly(true);
        std::fs::set_permissions(&path, permissions).unwrap();

        let err = StateCommitter::new("newTag")
            .unwrap()
            .apply(&path, "abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, ShiplineError::Write { .. }));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), KUSTOMIZATION);
    }

    #[tokio::test]
    async fn test_missing_field_is_write_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("values.yaml");
        std::fs::write(&path, "image:\n  tag: old\n").unwrap();

        let err = StateCommitter::new("newTag")
            .unwrap()
            .apply(&path, "abc")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("newTag"));
    }
}
