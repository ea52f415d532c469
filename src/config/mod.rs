// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Deployment configuration
//!
//! Loaded once before any run from `.shipline.yaml` (or a `.toml` file).
//! Every field has a default so a bare repository can run with no file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ShiplineError, ShiplineResult};
use crate::gate::GatePolicy;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = ".shipline.yaml";

/// Top-level settings for a deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Container registry the image is published to
    pub registry: RegistrySettings,

    /// Tracked deployment configuration updated by the record stage
    pub deploy: DeploySettings,

    /// Tag derivation
    pub tags: TagSettings,

    /// Security gate policy
    pub gate: GatePolicy,

    /// Artifact handoff between stages
    pub artifacts: ArtifactSettings,

    /// Collaborator command lines
    pub commands: CommandSettings,

    /// Size of the parallel worker pool
    pub workers: Workers,

    /// Environment passed to every collaborator
    pub env: HashMap<String, String>,
}

impl Settings {
    /// Load settings from a YAML or TOML file
    pub fn from_file(path: &Path) -> ShiplineResult<Self> {
        if !path.exists() {
            return Err(ShiplineError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ShiplineError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        let settings = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content)?,
            _ => Self::from_yaml(&content)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is absent
    pub fn load_or_default(path: &Path) -> ShiplineResult<Self> {
        match Self::from_file(path) {
            Err(ShiplineError::ConfigNotFound { .. }) => {
                tracing::warn!(path = %path.display(), "configuration not found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn from_yaml(yaml: &str) -> ShiplineResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    pub fn from_toml(content: &str) -> ShiplineResult<Self> {
        toml::from_str(content).map_err(Into::into)
    }

    pub fn to_yaml(&self) -> ShiplineResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Check values serde cannot
    pub fn validate(&self) -> ShiplineResult<()> {
        if self.workers.0 == 0 {
            return Err(ShiplineError::InvalidConfig {
                reason: "workers must be at least 1".into(),
            });
        }
        if self.tags.short_length == 0 {
            return Err(ShiplineError::InvalidConfig {
                reason: "tags.short_length must be at least 1".into(),
            });
        }
        if self.deploy.field.trim().is_empty() {
            return Err(ShiplineError::InvalidConfig {
                reason: "deploy.field must not be empty".into(),
            });
        }
        if self.registry.repository.trim().is_empty() {
            return Err(ShiplineError::InvalidConfig {
                reason: "registry.repository must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Image name without a tag, e.g. `ghcr.io/acme/app`
    pub fn image_name(&self) -> String {
        let host = self.registry.host.trim_end_matches('/');
        if host.is_empty() {
            self.registry.repository.clone()
        } else {
            format!("{}/{}", host, self.registry.repository)
        }
    }
}

/// Registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub host: String,
    pub repository: String,
    /// Environment variable holding the registry username
    pub username_env: String,
    /// Environment variable holding the registry password or token
    pub password_env: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            host: "ghcr.io".into(),
            repository: "app".into(),
            username_env: "REGISTRY_USERNAME".into(),
            password_env: "REGISTRY_PASSWORD".into(),
        }
    }
}

/// Deployment configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Path of the tracked configuration file
    pub file: PathBuf,
    /// Name of the version-tag field inside the file
    pub field: String,
    /// Commit the change after writing it
    pub commit: bool,
    /// Push the commit after creating it
    pub push: bool,
    pub author_name: String,
    pub author_email: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from("deploy/kustomization.yaml"),
            field: "newTag".into(),
            commit: true,
            push: false,
            author_name: "shipline".into(),
            author_email: "shipline@users.noreply.github.com".into(),
        }
    }
}

/// Tag derivation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagSettings {
    /// Label applied to every run
    pub fixed_label: String,
    /// Number of commit id characters in the short hash
    pub short_length: usize,
}

impl Default for TagSettings {
    fn default() -> Self {
        Self {
            fixed_label: "latest".into(),
            short_length: 7,
        }
    }
}

/// Artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    /// Root under which each run gets its own directory
    pub directory: PathBuf,
    /// Advisory retention window
    pub retention_hours: u64,
}

impl ArtifactSettings {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(".shipline/artifacts"),
            retention_hours: 24,
        }
    }
}

/// External collaborator commands of the standard pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    pub shell: String,
    pub lint: String,
    pub build: String,
    pub test: String,
    pub containerize: String,
    pub scan: String,
    pub publish: String,
    /// Binary written by the build command
    pub binary_path: String,
    /// Image archive written by the containerize command
    pub image_path: String,
    /// JSON report written by the scan command
    pub scan_report: PathBuf,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            shell: "bash".into(),
            lint: "cargo fmt --all -- --check && cargo clippy --all-targets -- -D warnings"
                .into(),
            build: "cargo build --release --locked".into(),
            test: "cargo test --all --locked".into(),
            containerize: "docker build -t \"$SHIPLINE_IMAGE_REF\" . \
                           && docker save -o image.tar \"$SHIPLINE_IMAGE_REF\""
                .into(),
            scan: "trivy image --input \"$SHIPLINE_ARTIFACT_IMAGE\" --format json \
                   --output \"$SHIPLINE_SCAN_REPORT\""
                .into(),
            publish: "docker load -i \"$SHIPLINE_ARTIFACT_IMAGE\" \
                      && echo \"$SHIPLINE_REGISTRY_PASSWORD\" | docker login \"$SHIPLINE_REGISTRY\" \
                      -u \"$SHIPLINE_REGISTRY_USERNAME\" --password-stdin \
                      && for ref in ${SHIPLINE_IMAGE_REFS//,/ }; do \
                      docker tag \"$SHIPLINE_IMAGE_REF\" \"$ref\" && docker push \"$ref\"; done"
                .into(),
            binary_path: "target/release/app".into(),
            image_path: "image.tar".into(),
            scan_report: PathBuf::from("scan-report.json"),
        }
    }
}

/// Worker pool size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workers(pub usize);

impl Default for Workers {
    fn default() -> Self {
        Self(4)
    }
}
