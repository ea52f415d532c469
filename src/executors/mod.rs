// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Collaborator executors
//!
//! This module provides the executor trait and the built-in implementations
//! for each stage action (shell, scan, publish, record). Executors run the
//! external tool, interpret its exit status and hand declared outputs back to
//! the scheduler; they never touch the artifact store themselves.

mod publish;
mod record;
mod scan;
mod shell;

pub use publish::PublishExecutor;
pub use record::RecordExecutor;
pub use scan::ScanExecutor;
pub use shell::ShellExecutor;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::config::Settings;
use crate::errors::{ShiplineError, ShiplineResult};
use crate::gate::ScanReport;
use crate::pipeline::Stage;
use crate::tags::TagSet;
use crate::trigger::TriggerContext;

/// A consumed artifact, resolved to where its payload can be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub key: String,
    pub location: PathBuf,
}

/// A declared output collected after a stage ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducedArtifact {
    pub key: String,
    pub payload: ArtifactPayload,
}

/// Where a produced artifact's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactPayload {
    /// Held in memory
    Bytes(Vec<u8>),
    /// A file in the working tree, streamed into the store
    File(PathBuf),
}

impl ProducedArtifact {
    pub fn bytes(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload: ArtifactPayload::Bytes(payload),
        }
    }

    pub fn file(key: impl Into<String>, path: PathBuf) -> Self {
        Self {
            key: key.into(),
            payload: ArtifactPayload::File(path),
        }
    }
}

/// Everything a collaborator receives for one stage invocation
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub trigger: &'a TriggerContext,
    pub tags: &'a TagSet,
    pub settings: &'a Settings,
    pub working_dir: &'a Path,
    pub inputs: &'a [ResolvedArtifact],
}

impl Invocation<'_> {
    /// Environment exported to the stage's command
    ///
    /// Precedence, lowest first: global settings, run identifiers, stage env.
    pub fn env(&self, stage: &Stage) -> HashMap<String, String> {
        let mut env = self.settings.env.clone();
        env.extend(self.trigger.env_vars());

        let image = self.settings.image_name();
        let refs = self.tags.image_refs(&image);
        if let Some(primary) = self.tags.primary() {
            env.insert("SHIPLINE_TAG".into(), primary.value.clone());
            env.insert(
                "SHIPLINE_IMAGE_REF".into(),
                format!("{}:{}", image, primary.value),
            );
        }
        env.insert("SHIPLINE_TAGS".into(), self.tags.values().join(","));
        env.insert("SHIPLINE_IMAGE_REFS".into(), refs.join(","));
        env.insert("SHIPLINE_IMAGE".into(), image);
        env.insert(
            "SHIPLINE_REGISTRY".into(),
            self.settings.registry.host.clone(),
        );

        for input in self.inputs {
            env.insert(
                artifact_env_var(&input.key),
                input.location.to_string_lossy().to_string(),
            );
        }

        env.extend(stage.env.clone());
        env
    }
}

/// `SHIPLINE_ARTIFACT_<KEY>` with the key upper-cased and non-alphanumerics mapped to `_`
pub fn artifact_env_var(key: &str) -> String {
    let suffix: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("SHIPLINE_ARTIFACT_{}", suffix)
}

/// Result of stage execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether execution succeeded
    pub success: bool,

    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Exit code
    pub exit_code: i32,

    /// Declared outputs collected after a successful run
    pub outputs: Vec<ProducedArtifact>,

    /// Execution duration
    pub duration: Duration,

    /// Parsed scanner report, for scan stages
    pub scan: Option<ScanReport>,
}

impl ExecutionResult {
    /// Create a successful result
    pub fn success(stdout: String, duration: Duration) -> Self {
        Self {
            success: true,
            stdout,
            stderr: String::new(),
            exit_code: 0,
            outputs: vec![],
            duration,
            scan: None,
        }
    }

    /// Create a failed result
    pub fn failure(stderr: String, exit_code: i32, duration: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr,
            exit_code,
            outputs: vec![],
            duration,
            scan: None,
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<ProducedArtifact>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn with_scan(mut self, report: ScanReport) -> Self {
        self.scan = Some(report);
        self
    }
}

/// Trait for collaborator executors
#[async_trait]
pub trait Executor: Send + Sync {
    /// Execute a stage
    ///
    /// A collaborator that ran and reported failure returns `Ok` with
    /// `success == false`; `Err` is reserved for failures to run it at all
    /// and for typed failures such as rejected credentials.
    async fn execute(
        &self,
        stage: &Stage,
        invocation: &Invocation<'_>,
    ) -> ShiplineResult<ExecutionResult>;

    /// Check if the underlying tool is available
    async fn check_available(&self) -> ShiplineResult<bool>;

    /// Validate stage configuration
    fn validate_stage(&self, stage: &Stage) -> ShiplineResult<()>;
}

/// Captured output of a collaborator command
#[derive(Debug)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn into_result(self) -> ExecutionResult {
        ExecutionResult {
            success: self.success,
            stdout: self.stdout,
            stderr: self.stderr,
            exit_code: self.exit_code,
            outputs: vec![],
            duration: self.duration,
            scan: None,
        }
    }
}

/// Run `command` through `shell -c` in `working_dir`
pub(crate) async fn run_command(
    shell: &str,
    command: &str,
    working_dir: &Path,
    env: &HashMap<String, String>,
) -> ShiplineResult<CommandOutput> {
    let start = Instant::now();

    let output = Command::new(shell)
        .arg("-c")
        .arg(command)
        .current_dir(working_dir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ShiplineError::ToolExecutionFailed {
            tool: shell.to_string(),
            error: e.to_string(),
            help: Some(format!("Shell '{}' may not be available", shell)),
        })?;

    Ok(CommandOutput {
        success: output.status.success(),
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration: start.elapsed(),
    })
}

/// Resolve a declared output pattern to at most one file
pub fn resolve_output(pattern: &str, base_dir: &Path) -> ShiplineResult<Option<PathBuf>> {
    let full_pattern = if Path::new(pattern).is_absolute() {
        pattern.to_string()
    } else {
        base_dir.join(pattern).to_string_lossy().to_string()
    };

    let mut matches: Vec<PathBuf> = glob::glob(&full_pattern)?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    matches.sort();

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        n => Err(ShiplineError::GlobPattern {
            message: format!("'{}' matched {} files, expected one", pattern, n),
        }),
    }
}

/// Locate every declared output of `stage` that exists on disk
///
/// Absent outputs are left out; the scheduler treats them as an unmet
/// postcondition. Files are not read here; the store streams them.
pub(crate) fn collect_outputs(
    stage: &Stage,
    working_dir: &Path,
) -> ShiplineResult<Vec<ProducedArtifact>> {
    let mut outputs = Vec::with_capacity(stage.produces.len());

    for output in &stage.produces {
        if let Some(path) = resolve_output(&output.path, working_dir)? {
            outputs.push(ProducedArtifact::file(output.key.clone(), path));
        }
    }

    Ok(outputs)
}

/// Reject a stage whose command is blank
pub(crate) fn require_command(stage: &Stage) -> ShiplineResult<()> {
    match stage.action.command() {
        Some((_, command)) if !command.trim().is_empty() => Ok(()),
        Some(_) => Err(ShiplineError::InvalidStage {
            stage: stage.name.clone(),
            reason: "command is empty".to_string(),
        }),
        None => Err(ShiplineError::InvalidStage {
            stage: stage.name.clone(),
            reason: format!("'{}' action does not run a command", stage.tool_name()),
        }),
    }
}

/// Create the built-in executors, keyed by action name
pub fn create_default_executors(
    settings: &Settings,
) -> ShiplineResult<HashMap<String, Box<dyn Executor>>> {
    let mut executors: HashMap<String, Box<dyn Executor>> = HashMap::new();

    let shell = &settings.commands.shell;
    executors.insert("shell".to_string(), Box::new(ShellExecutor::new(shell)));
    executors.insert("scan".to_string(), Box::new(ScanExecutor::new(shell)));
    executors.insert(
        "publish".to_string(),
        Box::new(PublishExecutor::new(shell, &settings.registry)),
    );
    executors.insert(
        "record".to_string(),
        Box::new(RecordExecutor::from_settings(&settings.deploy)?),
    );

    Ok(executors)
}
