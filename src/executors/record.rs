// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Record executor
//!
//! Terminal stage: writes the run's primary tag into the deployment
//! configuration through [`StateCommitter`].

use async_trait::async_trait;
use std::time::Instant;

use super::{ExecutionResult, Executor, Invocation};
use crate::commit::{deploy_file_path, StateCommitter};
use crate::config::DeploySettings;
use crate::errors::{ShiplineError, ShiplineResult};
use crate::pipeline::{Action, Stage};

/// Record executor
#[derive(Debug)]
pub struct RecordExecutor {
    committer: StateCommitter,
}

impl RecordExecutor {
    pub fn new(committer: StateCommitter) -> Self {
        Self { committer }
    }

    pub fn from_settings(deploy: &DeploySettings) -> ShiplineResult<Self> {
        Ok(Self::new(StateCommitter::from_settings(deploy)?))
    }
}

#[async_trait]
impl Executor for RecordExecutor {
    async fn execute(
        &self,
        stage: &Stage,
        invocation: &Invocation<'_>,
    ) -> ShiplineResult<ExecutionResult> {
        self.validate_stage(stage)?;

        let tag = invocation
            .tags
            .primary()
            .ok_or_else(|| ShiplineError::InvalidStage {
                stage: stage.name.clone(),
                reason: "no primary tag was resolved for this run".to_string(),
            })?;

        let start = Instant::now();
        let path = deploy_file_path(&invocation.settings.deploy, invocation.working_dir);
        let outcome = self.committer.apply(&path, &tag.value).await?;

        Ok(ExecutionResult::success(
            format!("{}: {}", path.display(), outcome),
            start.elapsed(),
        ))
    }

    async fn check_available(&self) -> ShiplineResult<bool> {
        Ok(!self.committer.records() || which::which("git").is_ok())
    }

    fn validate_stage(&self, stage: &Stage) -> ShiplineResult<()> {
        match stage.action {
            Action::Record => Ok(()),
            _ => Err(ShiplineError::InvalidStage {
                stage: stage.name.clone(),
                reason: "Not a record stage".to_string(),
            }),
        }
    }
}
