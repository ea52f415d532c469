// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Publish executor
//!
//! Pushes every tag of the consumed image to the registry. Missing or
//! rejected credentials surface as [`ShiplineError::Auth`] rather than a
//! plain stage failure.

use async_trait::async_trait;
use std::collections::HashMap;

use super::{require_command, run_command, ExecutionResult, Executor, Invocation};
use crate::config::RegistrySettings;
use crate::errors::{ShiplineError, ShiplineResult};
use crate::pipeline::{Action, Stage};

/// Registry responses that mean the credentials were refused
const AUTH_MARKERS: &[&str] = &[
    "unauthorized",
    "authentication required",
    "access denied",
    "denied: ",
    "incorrect username or password",
];

/// Publish executor
pub struct PublishExecutor {
    shell: String,
    registry: RegistrySettings,
}

impl PublishExecutor {
    pub fn new(shell: &str, registry: &RegistrySettings) -> Self {
        Self {
            shell: shell.to_string(),
            registry: registry.clone(),
        }
    }

    /// Username and password from the configured variables
    ///
    /// `Err` names the first variable that is unset or blank.
    fn credentials(&self, env: &HashMap<String, String>) -> Result<(String, String), String> {
        let lookup = |name: &str| {
            env.get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| name.to_string())
        };
        Ok((
            lookup(&self.registry.username_env)?,
            lookup(&self.registry.password_env)?,
        ))
    }

    fn rejected(stderr: &str) -> bool {
        let lowered = stderr.to_lowercase();
        AUTH_MARKERS.iter().any(|m| lowered.contains(m))
    }
}

#[async_trait]
impl Executor for PublishExecutor {
    async fn execute(
        &self,
        stage: &Stage,
        invocation: &Invocation<'_>,
    ) -> ShiplineResult<ExecutionResult> {
        let Action::Publish { command, shell } = &stage.action else {
            return Err(ShiplineError::InvalidStage {
                stage: stage.name.clone(),
                reason: "Expected a publish action".to_string(),
            });
        };

        let mut env = invocation.env(stage);
        let (username, password) =
            self.credentials(&env)
                .map_err(|name| ShiplineError::Auth {
                    registry: self.registry.host.clone(),
                    reason: format!("{} is not set", name),
                })?;
        // Commands read fixed names whatever variables hold the credentials
        env.insert("SHIPLINE_REGISTRY_USERNAME".into(), username);
        env.insert("SHIPLINE_REGISTRY_PASSWORD".into(), password);

        let output = run_command(shell, command, invocation.working_dir, &env).await?;
        if !output.success && Self::rejected(&output.stderr) {
            let reason = output
                .stderr
                .lines()
                .find(|l| Self::rejected(l))
                .unwrap_or("credentials rejected")
                .trim()
                .to_string();
            return Err(ShiplineError::Auth {
                registry: self.registry.host.clone(),
                reason,
            });
        }

        if output.success {
            tracing::info!(
                registry = %self.registry.host,
                refs = invocation.tags.len(),
                "image published"
            );
        }
        Ok(output.into_result())
    }

    async fn check_available(&self) -> ShiplineResult<bool> {
        Ok(which::which(&self.shell).is_ok())
    }

    fn validate_stage(&self, stage: &Stage) -> ShiplineResult<()> {
        if !matches!(stage.action, Action::Publish { .. }) {
            return Err(ShiplineError::InvalidStage {
                stage: stage.name.clone(),
                reason: "Not a publish stage".to_string(),
            });
        }
        require_command(stage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::tags::TagResolver;
    use crate::trigger::TriggerContext;
    use tempfile::TempDir;

    fn publish_stage(command: &str) -> Stage {
        Stage::new(
            "publish",
            Action::Publish {
                command: command.to_string(),
                shell: "bash".to_string(),
            },
        )
    }

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.registry.username_env = "SHIPLINE_TEST_PUBLISH_USER".into();
        settings.registry.password_env = "SHIPLINE_TEST_PUBLISH_PASSWORD".into();
        settings
    }

    async fn run(stage: &Stage, settings: &Settings) -> ShiplineResult<ExecutionResult> {
        let dir = TempDir::new().unwrap();
        let ctx = TriggerContext::direct_push("main", "abc1234").unwrap();
        let tags = TagResolver::new(&settings.tags).resolve(&ctx);
        let invocation = Invocation {
            trigger: &ctx,
            tags: &tags,
            settings,
            working_dir: dir.path(),
            inputs: &[],
        };
        PublishExecutor::new("bash", &settings.registry)
            .execute(stage, &invocation)
            .await
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let err = run(&publish_stage("true"), &settings()).await.unwrap_err();
        match err {
            ShiplineError::Auth { registry, reason } => {
                assert_eq!(registry, "ghcr.io");
                assert!(reason.contains("SHIPLINE_TEST_PUBLISH_USER"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let mut settings = settings();
        settings
            .env
            .insert("SHIPLINE_TEST_PUBLISH_USER".into(), "bot".into());
        settings
            .env
            .insert("SHIPLINE_TEST_PUBLISH_PASSWORD".into(), "wrong".into());

        let stage = publish_stage("echo 'Error response from daemon: unauthorized' >&2; exit 1");
        let err = run(&stage, &settings).await.unwrap_err();
        assert!(matches!(err, ShiplineError::Auth { ref reason, .. } if reason.contains("unauthorized")));
    }

    #[tokio::test]
    async fn test_other_failures_are_plain() {
        let mut settings = settings();
        settings
            .env
            .insert("SHIPLINE_TEST_PUBLISH_USER".into(), "bot".into());
        settings
            .env
            .insert("SHIPLINE_TEST_PUBLISH_PASSWORD".into(), "token".into());

        let result = run(&publish_stage("echo 'no space left' >&2; exit 1"), &settings)
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_credentials_exported_under_fixed_names() {
        let mut settings = settings();
        settings
            .env
            .insert("SHIPLINE_TEST_PUBLISH_USER".into(), "bot".into());
        settings
            .env
            .insert("SHIPLINE_TEST_PUBLISH_PASSWORD".into(), "token".into());

        let stage = publish_stage(
            "test \"$SHIPLINE_REGISTRY_USERNAME\" = bot && test \"$SHIPLINE_REGISTRY_PASSWORD\" = token",
        );
        let result = run(&stage, &settings).await.unwrap();
        assert!(result.success);
    }
}
