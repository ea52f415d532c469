// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Artifact handoff between stages
//!
//! A run-scoped, content-addressed, write-once store. Each key has exactly one
//! producer per run; the scheduler is its only writer and publishes a stage's
//! outputs before any dependent stage is started.

mod digest;

pub use digest::{content_path, digest_bytes, digest_file};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::ArtifactSettings;
use crate::errors::{ShiplineError, ShiplineResult};

/// Reference to a payload produced by one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHandle {
    pub key: String,
    pub producer_stage: String,
    /// BLAKE3 digest of the payload
    pub digest: String,
    /// Where the payload is stored
    pub location: PathBuf,
    pub size: u64,
    pub created_at: SystemTime,
    /// Advisory retention window
    pub retention: Duration,
}

impl ArtifactHandle {
    pub fn expires_at(&self) -> SystemTime {
        self.created_at + self.retention
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at()
    }
}

/// Write-once artifact store for a single run
#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    retention: Duration,
    handles: HashMap<String, ArtifactHandle>,
}

impl ArtifactStore {
    /// Open a store rooted at `root`, creating the directory
    pub fn open(root: PathBuf, retention: Duration) -> ShiplineResult<Self> {
        std::fs::create_dir_all(&root).map_err(|e| ShiplineError::Write {
            path: root.clone(),
            error: e.to_string(),
        })?;

        Ok(Self {
            root,
            retention,
            handles: HashMap::new(),
        })
    }

    /// Open the store for one run under the configured artifact directory
    pub fn for_run(
        settings: &ArtifactSettings,
        working_dir: &Path,
        run_id: &str,
    ) -> ShiplineResult<Self> {
        let base = if settings.directory.is_absolute() {
            settings.directory.clone()
        } else {
            working_dir.join(&settings.directory)
        };
        Self::open(base.join(run_id), settings.retention())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store a payload under `key`
    ///
    /// Fails with `DuplicateArtifact` if the key already has a producer.
    pub async fn put(
        &mut self,
        key: &str,
        producer_stage: &str,
        payload: &[u8],
    ) -> ShiplineResult<ArtifactHandle> {
        self.ensure_vacant(key)?;

        let digest = digest_bytes(payload);
        let location = content_path(&self.root, &digest);

        if !location.exists() {
            let staging = Self::staging_path(&location).await?;
            tokio::fs::write(&staging, payload)
                .await
                .map_err(|e| ShiplineError::Write {
                    path: staging.clone(),
                    error: e.to_string(),
                })?;
            Self::promote(&staging, &location).await?;
        }

        self.record(key, producer_stage, digest, location, payload.len() as u64)
    }

    /// Store the file at `source` under `key`
    ///
    /// The file is hashed and copied in chunks, so large payloads such as
    /// image archives are never held in memory. `source` is left in place.
    pub async fn put_file(
        &mut self,
        key: &str,
        producer_stage: &str,
        source: &Path,
    ) -> ShiplineResult<ArtifactHandle> {
        self.ensure_vacant(key)?;

        let path = source.to_path_buf();
        let digest = tokio::task::spawn_blocking(move || digest_file(&path))
            .await
            .map_err(|e| ShiplineError::FileReadError {
                path: source.to_path_buf(),
                error: e.to_string(),
            })??;
        let location = content_path(&self.root, &digest);

        let size = if location.exists() {
            tokio::fs::metadata(&location).await?.len()
        } else {
            let staging = Self::staging_path(&location).await?;
            let size = tokio::fs::copy(source, &staging)
                .await
                .map_err(|e| ShiplineError::Write {
                    path: staging.clone(),
                    error: e.to_string(),
                })?;
            Self::promote(&staging, &location).await?;
            size
        };

        self.record(key, producer_stage, digest, location, size)
    }

    fn ensure_vacant(&self, key: &str) -> ShiplineResult<()> {
        match self.handles.get(key) {
            Some(existing) => Err(ShiplineError::DuplicateArtifact {
                key: key.to_string(),
                existing: existing.producer_stage.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Create the fan-out directory and return a sibling to write into
    async fn staging_path(location: &Path) -> ShiplineResult<PathBuf> {
        if let Some(parent) = location.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ShiplineError::Write {
                    path: parent.to_path_buf(),
                    error: e.to_string(),
                })?;
        }
        Ok(location.with_extension("partial"))
    }

    async fn promote(staging: &Path, location: &Path) -> ShiplineResult<()> {
        tokio::fs::rename(staging, location)
            .await
            .map_err(|e| ShiplineError::Write {
                path: location.to_path_buf(),
                error: e.to_string(),
            })
    }

    fn record(
        &mut self,
        key: &str,
        producer_stage: &str,
        digest: String,
        location: PathBuf,
        size: u64,
    ) -> ShiplineResult<ArtifactHandle> {
        let handle = ArtifactHandle {
            key: key.to_string(),
            producer_stage: producer_stage.to_string(),
            digest,
            location,
            size,
            created_at: SystemTime::now(),
            retention: self.retention,
        };

        let short_digest = &handle.digest[..12];
        tracing::debug!(
            key,
            producer = producer_stage,
            digest = short_digest,
            size = handle.size,
            "artifact stored"
        );

        self.handles.insert(key.to_string(), handle.clone());
        Ok(handle)
    }

    /// Handle for `key`, or `MissingArtifact` if nothing produced it
    pub fn handle(&self, key: &str) -> ShiplineResult<&ArtifactHandle> {
        self.handles
            .get(key)
            .ok_or_else(|| ShiplineError::MissingArtifact {
                key: key.to_string(),
            })
    }

    /// Read the payload stored under `key`
    pub async fn get(&self, key: &str) -> ShiplineResult<Vec<u8>> {
        let handle = self.handle(key)?;
        tokio::fs::read(&handle.location)
            .await
            .map_err(|e| ShiplineError::FileReadError {
                path: handle.location.clone(),
                error: e.to_string(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.handles.contains_key(key)
    }

    pub fn handles(&self) -> impl Iterator<Item = &ArtifactHandle> {
        self.handles.values()
    }

    /// Handles whose retention window has elapsed at `now`
    pub fn expired(&self, now: SystemTime) -> Vec<&ArtifactHandle> {
        let mut expired: Vec<_> = self
            .handles
            .values()
            .filter(|h| h.is_expired(now))
            .collect();
        expired.sort_by(|a, b| a.key.cmp(&b.key));
        expired
    }

    /// Drop expired handles and delete payloads no live handle shares
    pub async fn purge_expired(&mut self, now: SystemTime) -> ShiplineResult<usize> {
        let expired: Vec<String> = self.expired(now).iter().map(|h| h.key.clone()).collect();

        for key in &expired {
            if let Some(handle) = self.handles.remove(key) {
                let shared = self.handles.values().any(|h| h.digest == handle.digest);
                if !shared && handle.location.exists() {
                    tokio::fs::remove_file(&handle.location).await?;
                }
            }
        }

        Ok(expired.len())
    }

    /// End of run: remove every payload and the run directory
    pub async fn close(self) -> ShiplineResult<()> {
        if self.root.exists() {
            tokio::fs::remove_dir_all(&self.root).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ArtifactStore {
        ArtifactStore::open(dir.path().join("run"), Duration::from_secs(3600)).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        let handle = store.put("binary", "build", b"\x7fELF").await.unwrap();
        assert_eq!(handle.producer_stage, "build");
        assert_eq!(handle.size, 4);
        assert!(handle.location.starts_with(store.root()));

        assert_eq!(store.get("binary").await.unwrap(), b"\x7fELF");
    }

    #[tokio::test]
    async fn test_duplicate_key_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        store.put("image", "containerize", b"one").await.unwrap();
        let err = store.put("image", "other", b"two").await.unwrap_err();
        match err {
            ShiplineError::DuplicateArtifact { key, existing } => {
                assert_eq!(key, "image");
                assert_eq!(existing, "containerize");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.get("image").await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_put_file_copies_and_leaves_source() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("image.tar");
        std::fs::write(&source, b"layer data").unwrap();
        let mut store = store(&dir);

        let handle = store.put_file("image", "containerize", &source).await.unwrap();
        assert_eq!(handle.digest, digest_bytes(b"layer data"));
        assert_eq!(handle.size, 10);
        assert!(source.exists());
        assert_eq!(store.get("image").await.unwrap(), b"layer data");

        let err = store.put_file("image", "other", &source).await.unwrap_err();
        assert!(matches!(err, ShiplineError::DuplicateArtifact { .. }));
    }

    #[tokio::test]
    async fn test_put_file_missing_source() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        let err = store
            .put_file("image", "containerize", &dir.path().join("absent.tar"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShiplineError::FileReadError { .. }));
        assert!(!store.contains("image"));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.get("image").await,
            Err(ShiplineError::MissingArtifact { .. })
        ));
        assert!(!store.contains("image"));
    }

    #[tokio::test]
    async fn test_identical_payloads_share_storage() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        let a = store.put("a", "s1", b"same").await.unwrap();
        let b = store.put("b", "s2", b"same").await.unwrap();
        assert_eq!(a.location, b.location);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let dir = TempDir::new().unwrap();
        let mut store =
            ArtifactStore::open(dir.path().join("run"), Duration::from_secs(60)).unwrap();

        let handle = store.put("binary", "build", b"payload").await.unwrap();
        let later = handle.created_at + Duration::from_secs(61);

        assert!(store.expired(handle.created_at).is_empty());
        assert_eq!(store.expired(later).len(), 1);

        assert_eq!(store.purge_expired(later).await.unwrap(), 1);
        assert!(!handle.location.exists());
        assert!(matches!(
            store.handle("binary"),
            Err(ShiplineError::MissingArtifact { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_removes_run_directory() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.put("binary", "build", b"payload").await.unwrap();
        let root = store.root().to_path_buf();

        store.close().await.unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_for_run_uses_run_directory() {
        let dir = TempDir::new().unwrap();
        let settings = ArtifactSettings::default();
        let store = ArtifactStore::for_run(&settings, dir.path(), "0123abcd").unwrap();
        assert!(store.root().ends_with(".shipline/artifacts/0123abcd"));
        assert!(store.root().exists());
    }
}
