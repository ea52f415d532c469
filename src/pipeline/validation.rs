// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Pipeline validation
//!
//! Collects every problem in a stage list and settings at once, for the
//! `validate` command. [`JobGraph::new`] stops at the first structural error;
//! this reports all of them plus softer warnings.

use std::collections::{HashMap, HashSet};

use crate::conditions::RunCondition;
use crate::config::Settings;
use crate::errors::ShiplineError;
use crate::pipeline::{Action, JobGraph, Stage};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate stages against the given settings
    pub fn validate(stages: &[Stage], settings: &Settings) -> ValidationResult {
        let mut result = ValidationResult::new();

        if stages.is_empty() {
            result.add_error("Pipeline has no stages defined");
        }

        let mut seen_names = HashSet::new();
        for stage in stages {
            if !seen_names.insert(&stage.name) {
                result.add_error(&format!("Duplicate stage name: '{}'", stage.name));
            }
        }

        match JobGraph::new(stages.to_vec()) {
            Ok(_) | Err(ShiplineError::DuplicateStage { .. }) => {}
            Err(e) => result.add_error(&e.to_string()),
        }

        let producers: HashMap<&str, &str> = stages
            .iter()
            .flat_map(|s| s.produces.iter().map(move |o| (o.key.as_str(), s.name.as_str())))
            .collect();

        for stage in stages {
            Self::validate_stage(stage, stages, &producers, &mut result);
        }

        if let Err(e) = settings.validate() {
            result.add_error(&e.to_string());
        }

        result
    }

    /// Validate a single stage
    fn validate_stage(
        stage: &Stage,
        stages: &[Stage],
        producers: &HashMap<&str, &str>,
        result: &mut ValidationResult,
    ) {
        if let Some((shell, command)) = stage.action.command() {
            if command.trim().is_empty() {
                result.add_error(&format!("Stage '{}': command is empty", stage.name));
            }
            if shell.trim().is_empty() {
                result.add_error(&format!("Stage '{}': shell is empty", stage.name));
            }
        }

        let ancestors = Self::declared_ancestors(stage, stages);
        for key in &stage.consumes {
            let Some(producer) = producers.get(key.as_str()) else {
                continue;
            };
            if !ancestors.contains(producer) {
                result.add_warning(&format!(
                    "Stage '{}': consumes '{}' but does not depend on '{}'. \
                     The dependency will be added implicitly.",
                    stage.name, key, producer
                ));
            }
        }

        for output in &stage.produces {
            if output.path.trim().is_empty() {
                result.add_error(&format!(
                    "Stage '{}': artifact '{}' has an empty path",
                    stage.name, output.key
                ));
            }
        }

        let mutates_shared_state = matches!(stage.action, Action::Publish { .. } | Action::Record);
        if mutates_shared_state && stage.condition != RunCondition::NotProposedChange {
            result.add_warning(&format!(
                "Stage '{}' ({}) runs {}; proposed changes may publish or record",
                stage.name,
                stage.tool_name(),
                stage.condition
            ));
        }
    }

    /// Stages reachable through declared `depends_on` edges only
    fn declared_ancestors<'a>(stage: &'a Stage, stages: &'a [Stage]) -> HashSet<&'a str> {
        let mut seen = HashSet::new();
        let mut pending: Vec<&str> = stage.depends_on.iter().map(String::as_str).collect();

        while let Some(name) = pending.pop() {
            if !seen.insert(name) {
                continue;
            }
            if let Some(dep) = stages.iter().find(|s| s.name == name) {
                pending.extend(dep.depends_on.iter().map(String::as_str));
            }
        }

        seen
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
