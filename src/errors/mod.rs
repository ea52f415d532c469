// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Error types
//!
//! Every failure inside a run surfaces as the owning stage's failure, so the
//! variants here double as the vocabulary of stage outcomes. Each variant
//! carries a diagnostic code and, where useful, a hint on how to fix it.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for shipline operations
pub type ShiplineResult<T> = Result<T, ShiplineError>;

/// Main error type for shipline
#[derive(Error, Debug, Diagnostic)]
pub enum ShiplineError {
    // ─────────────────────────────────────────────────────────────────────────
    // Graph Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Cyclic stage graph: {}", .stages.join(" → "))]
    #[diagnostic(
        code(shipline::cyclic_graph),
        help("Stages must form a directed acyclic graph; remove one of the listed edges")
    )]
    CyclicGraph { stages: Vec<String> },

    #[error("Stage '{stage}' depends on unknown stage '{dependency}'")]
    #[diagnostic(
        code(shipline::unknown_dependency),
        help("Check that '{dependency}' is defined in the graph")
    )]
    UnknownDependency { stage: String, dependency: String },

    #[error("Stage name '{stage}' is used more than once")]
    #[diagnostic(code(shipline::duplicate_stage))]
    DuplicateStage { stage: String },

    #[error("Stage '{stage}' is invalid: {reason}")]
    #[diagnostic(code(shipline::invalid_stage))]
    InvalidStage { stage: String, reason: String },

    #[error("Stage '{stage}' not found in graph")]
    #[diagnostic(code(shipline::stage_not_found))]
    StageNotFound { stage: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Trigger Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid trigger: {reason}")]
    #[diagnostic(
        code(shipline::invalid_trigger),
        help("Pass --event/--branch/--commit explicitly or run inside a CI environment")
    )]
    InvalidTrigger { reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Stage '{stage}' failed: {message}")]
    #[diagnostic(code(shipline::stage_execution))]
    StageExecution {
        stage: String,
        message: String,
        exit_code: Option<i32>,
        #[help]
        help: Option<String>,
    },

    #[error("Security gate blocked stage '{stage}': {summary}")]
    #[diagnostic(
        code(shipline::gate_blocked),
        help("Upgrade the affected packages or rebuild on a patched base image")
    )]
    GateBlocked { stage: String, summary: String },

    #[error("Registry '{registry}' rejected credentials: {reason}")]
    #[diagnostic(
        code(shipline::auth),
        help("Check the registry username/password environment variables")
    )]
    Auth { registry: String, reason: String },

    #[error("Executor not found for action: {tool}")]
    #[diagnostic(
        code(shipline::executor_not_found),
        help("Available executors: shell, scan, publish, record")
    )]
    ExecutorNotFound { tool: String },

    #[error("Tool '{tool}' execution failed: {error}")]
    #[diagnostic(code(shipline::tool_execution_failed))]
    ToolExecutionFailed {
        tool: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Artifact Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Artifact '{key}' was already produced by stage '{existing}'")]
    #[diagnostic(
        code(shipline::duplicate_artifact),
        help("Each artifact key must have exactly one producing stage")
    )]
    DuplicateArtifact { key: String, existing: String },

    #[error("Artifact '{key}' has not been produced")]
    #[diagnostic(
        code(shipline::missing_artifact),
        help("The producing stage was skipped, failed, or did not write its output")
    )]
    MissingArtifact { key: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Record Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to write '{path}': {error}")]
    #[diagnostic(code(shipline::write_error))]
    Write { path: PathBuf, error: String },

    #[error("Version control error: {message}")]
    #[diagnostic(code(shipline::vcs))]
    Vcs { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(shipline::config_not_found),
        help("Create .shipline.yaml or pass --config")
    )]
    ConfigNotFound { path: PathBuf },

    #[error("Invalid configuration: {reason}")]
    #[diagnostic(code(shipline::invalid_config))]
    InvalidConfig { reason: String },

    #[error("Could not read scan report '{path}': {message}")]
    #[diagnostic(code(shipline::scan_report))]
    ScanReport { path: PathBuf, message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(shipline::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(shipline::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(shipline::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(shipline::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(shipline::toml_error))]
    Toml { message: String },

    #[error("Glob pattern error: {message}")]
    #[diagnostic(code(shipline::glob_error))]
    GlobPattern { message: String },
}

impl From<std::io::Error> for ShiplineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for ShiplineError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for ShiplineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for ShiplineError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl From<glob::PatternError> for ShiplineError {
    fn from(e: glob::PatternError) -> Self {
        Self::GlobPattern { message: e.to_string() }
    }
}

impl ShiplineError {
    /// Create a stage failure from a collaborator's exit status and stderr
    pub fn stage_failed(stage: &str, exit_code: i32, stderr: &str) -> Self {
        Self::StageExecution {
            stage: stage.to_string(),
            message: format!("exited with status {}", exit_code),
            exit_code: Some(exit_code),
            help: Self::hint_from_stderr(stderr),
        }
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CyclicGraph { .. } => "cyclic_graph",
            Self::StageExecution { .. } | Self::ToolExecutionFailed { .. } => "stage_execution",
            Self::GateBlocked { .. } => "gate_blocked",
            Self::Auth { .. } => "auth",
            Self::DuplicateArtifact { .. } => "duplicate_artifact",
            Self::MissingArtifact { .. } => "missing_artifact",
            Self::Write { .. } => "write",
            Self::Vcs { .. } => "vcs",
            _ => "internal",
        }
    }

    fn hint_from_stderr(stderr: &str) -> Option<String> {
        let lowered = stderr.to_lowercase();
        if lowered.contains("diff in") || lowered.contains("rustfmt") {
            Some("Formatting differs; run the formatter locally and commit the result".into())
        } else if lowered.contains("could not compile") || lowered.contains("error[e") {
            Some("The build failed to compile; see the compiler output above".into())
        } else if lowered.contains("test result: failed") {
            Some("One or more tests failed".into())
        } else if lowered.contains("command not found") {
            Some("A required tool is not installed or not on PATH".into())
        } else {
            stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
        }
    }
}
