// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Scan executor
//!
//! Runs the vulnerability scanner against the consumed image and parses the
//! JSON report it writes to `$SHIPLINE_SCAN_REPORT`. The gate decision is
//! left to the scheduler.

use async_trait::async_trait;

use super::{require_command, run_command, ExecutionResult, Executor, Invocation};
use crate::errors::{ShiplineError, ShiplineResult};
use crate::gate::ScanReport;
use crate::pipeline::{Action, Stage};

/// Scan executor
pub struct ScanExecutor {
    shell: String,
}

impl ScanExecutor {
    pub fn new(shell: &str) -> Self {
        Self {
            shell: shell.to_string(),
        }
    }
}

#[async_trait]
impl Executor for ScanExecutor {
    async fn execute(
        &self,
        stage: &Stage,
        invocation: &Invocation<'_>,
    ) -> ShiplineResult<ExecutionResult> {
        let Action::Scan {
            command,
            shell,
            report,
        } = &stage.action
        else {
            return Err(ShiplineError::InvalidStage {
                stage: stage.name.clone(),
                reason: "Expected a scan action".to_string(),
            });
        };

        let report_path = invocation.working_dir.join(report);
        if report_path.exists() {
            tokio::fs::remove_file(&report_path).await?;
        }

        let mut env = invocation.env(stage);
        env.insert(
            "SHIPLINE_SCAN_REPORT".into(),
            report_path.to_string_lossy().to_string(),
        );

        let output = run_command(shell, command, invocation.working_dir, &env).await?;
        if !output.success {
            return Ok(output.into_result());
        }

        let parsed = ScanReport::from_file(&report_path)?;
        tracing::debug!(
            stage = %stage.name,
            findings = parsed.findings.len(),
            "scan report parsed"
        );

        Ok(output.into_result().with_scan(parsed))
    }

    async fn check_available(&self) -> ShiplineResult<bool> {
        Ok(which::which(&self.shell).is_ok())
    }

    fn validate_stage(&self, stage: &Stage) -> ShiplineResult<()> {
        let Action::Scan { report, .. } = &stage.action else {
            return Err(ShiplineError::InvalidStage {
                stage: stage.name.clone(),
                reason: "Not a scan stage".to_string(),
            });
        };
        if report.as_os_str().is_empty() {
            return Err(ShiplineError::InvalidStage {
                stage: stage.name.clone(),
                reason: "scan report path is empty".to_string(),
            });
        }
        require_command(stage)
    }
}
