// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Shell executor
//!
//! Runs lint, build, test and containerize commands. Pass/fail is the exit
//! status; declared outputs are read back from the working directory.

use async_trait::async_trait;

use super::{collect_outputs, require_command, run_command, ExecutionResult, Executor, Invocation};
use crate::errors::{ShiplineError, ShiplineResult};
use crate::pipeline::{Action, Stage};

/// Shell executor
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    /// Create a new shell executor; `shell` is only used for availability checks
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("bash")
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    async fn execute(
        &self,
        stage: &Stage,
        invocation: &Invocation<'_>,
    ) -> ShiplineResult<ExecutionResult> {
        let Action::Shell { command, shell } = &stage.action else {
            return Err(ShiplineError::InvalidStage {
                stage: stage.name.clone(),
                reason: "Expected a shell action".to_string(),
            });
        };

        let env = invocation.env(stage);
        let output = run_command(shell, command, invocation.working_dir, &env).await?;

        if !output.success {
            return Ok(output.into_result());
        }

        let outputs = collect_outputs(stage, invocation.working_dir)?;
        Ok(output.into_result().with_outputs(outputs))
    }

    async fn check_available(&self) -> ShiplineResult<bool> {
        Ok(which::which(&self.shell).is_ok())
    }

    fn validate_stage(&self, stage: &Stage) -> ShiplineResult<()> {
        if !matches!(stage.action, Action::Shell { .. }) {
            return Err(ShiplineError::InvalidStage {
                stage: stage.name.clone(),
                reason: "Not a shell stage".to_string(),
            });
        }
        require_command(stage)
    }
}
