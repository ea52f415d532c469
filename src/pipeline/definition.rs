// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Stage definitions
//!
//! A stage is defined statically before any run and never changes during it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::conditions::RunCondition;

/// A single pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    /// Stage name (must be unique within the graph)
    pub name: String,

    /// Stage description
    #[serde(default)]
    pub description: Option<String>,

    /// External collaborator invoked by this stage
    pub action: Action,

    /// Stages that must succeed first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Predicate deciding whether the stage runs for a trigger
    #[serde(default)]
    pub condition: RunCondition,

    /// Artifacts this stage must produce on success
    #[serde(default)]
    pub produces: Vec<ArtifactOutput>,

    /// Artifact keys this stage reads
    #[serde(default)]
    pub consumes: Vec<String>,

    /// Environment variables for this stage
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Stage {
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            description: None,
            action,
            depends_on: Vec::new(),
            condition: RunCondition::Always,
            produces: Vec::new(),
            consumes: Vec::new(),
            env: HashMap::new(),
        }
    }

    /// A stage running `command` through the default shell
    pub fn shell(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(
            name,
            Action::Shell {
                command: command.into(),
                shell: default_shell(),
            },
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn depends_on(mut self, stages: &[&str]) -> Self {
        self.depends_on
            .extend(stages.iter().map(|s| s.to_string()));
        self
    }

    pub fn with_condition(mut self, condition: RunCondition) -> Self {
        self.condition = condition;
        self
    }

    pub fn produces(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.produces.push(ArtifactOutput {
            key: key.into(),
            path: path.into(),
        });
        self
    }

    pub fn consumes(mut self, key: impl Into<String>) -> Self {
        self.consumes.push(key.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Name of the executor that runs this stage
    pub fn tool_name(&self) -> &'static str {
        self.action.tool_name()
    }
}

/// Collaborator invoked by a stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Run a command; pass/fail by exit status
    Shell {
        command: String,
        #[serde(default = "default_shell")]
        shell: String,
    },

    /// Run a vulnerability scanner that writes a JSON report
    Scan {
        command: String,
        #[serde(default = "default_shell")]
        shell: String,
        report: PathBuf,
    },

    /// Push to the registry; requires credentials
    Publish {
        command: String,
        #[serde(default = "default_shell")]
        shell: String,
    },

    /// Write the primary tag into the deployment configuration and commit it
    Record,
}

impl Action {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Shell { .. } => "shell",
            Self::Scan { .. } => "scan",
            Self::Publish { .. } => "publish",
            Self::Record => "record",
        }
    }

    /// Command line, for actions that run one
    pub fn command(&self) -> Option<(&str, &str)> {
        match self {
            Self::Shell { command, shell }
            | Self::Scan { command, shell, .. }
            | Self::Publish { command, shell } => Some((shell, command)),
            Self::Record => None,
        }
    }
}

pub(crate) fn default_shell() -> String {
    "bash".to_string()
}

/// A file a stage leaves behind, published under `key`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOutput {
    pub key: String,
    /// Path or glob relative to the working directory; must match one file
    pub path: String,
}
