// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! The standard delivery topology
//!
//! ```text
//!            ┌─ build ─┐
//!   lint ────┤         ├── containerize ── scan ── publish ── record
//!            └─ test ──┘
//! ```
//!
//! `publish` and `record` never run for proposed changes.

use crate::conditions::RunCondition;
use crate::config::Settings;
use crate::errors::ShiplineResult;
use crate::pipeline::{Action, JobGraph, Stage};

pub const LINT: &str = "lint";
pub const BUILD: &str = "build";
pub const TEST: &str = "test";
pub const CONTAINERIZE: &str = "containerize";
pub const SCAN: &str = "scan";
pub const PUBLISH: &str = "publish";
pub const RECORD: &str = "record";

/// Artifact key of the compiled binary
pub const BINARY_ARTIFACT: &str = "binary";
/// Artifact key of the packaged container image
pub const IMAGE_ARTIFACT: &str = "image";

/// Stages of the standard pipeline, commands taken from `settings`
pub fn standard_stages(settings: &Settings) -> Vec<Stage> {
    let commands = &settings.commands;
    let shell = |command: &str| Action::Shell {
        command: command.to_string(),
        shell: commands.shell.clone(),
    };

    vec![
        Stage::new(LINT, shell(&commands.lint))
            .with_description("Formatting and static analysis"),
        Stage::new(BUILD, shell(&commands.build))
            .with_description("Compile the release binary")
            .depends_on(&[LINT])
            .produces(BINARY_ARTIFACT, commands.binary_path.clone()),
        Stage::new(TEST, shell(&commands.test))
            .with_description("Run the test suite")
            .depends_on(&[LINT]),
        Stage::new(CONTAINERIZE, shell(&commands.containerize))
            .with_description("Build and tag the container image")
            .depends_on(&[BUILD, TEST])
            .produces(IMAGE_ARTIFACT, commands.image_path.clone()),
        Stage::new(
            SCAN,
            Action::Scan {
                command: commands.scan.clone(),
                shell: commands.shell.clone(),
                report: commands.scan_report.clone(),
            },
        )
        .with_description("Scan the image and apply the security gate")
        .depends_on(&[CONTAINERIZE])
        .consumes(IMAGE_ARTIFACT),
        Stage::new(
            PUBLISH,
            Action::Publish {
                command: commands.publish.clone(),
                shell: commands.shell.clone(),
            },
        )
        .with_description("Push every tag to the registry")
        .depends_on(&[SCAN])
        .consumes(IMAGE_ARTIFACT)
        .with_condition(RunCondition::NotProposedChange),
        Stage::new(RECORD, Action::Record)
            .with_description("Record the primary tag in the deployment configuration")
            .depends_on(&[PUBLISH])
            .with_condition(RunCondition::NotProposedChange),
    ]
}

/// The standard pipeline as a validated graph
pub fn standard_graph(settings: &Settings) -> ShiplineResult<JobGraph> {
    JobGraph::new(standard_stages(settings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerContext;

    #[test]
    fn test_standard_graph_shape() {
        let graph = standard_graph(&Settings::default()).unwrap();

        assert_eq!(graph.len(), 7);
        assert_eq!(
            graph.levels(),
            vec![
                vec![LINT.to_string()],
                vec![BUILD.to_string(), TEST.to_string()],
                vec![CONTAINERIZE.to_string()],
                vec![SCAN.to_string()],
                vec![PUBLISH.to_string()],
                vec![RECORD.to_string()],
            ]
        );
        assert!(graph.depends_on(RECORD, LINT));
        assert!(!graph.depends_on(TEST, BUILD));
    }

    #[test]
    fn test_plan_for_proposed_change() {
        let graph = standard_graph(&Settings::default()).unwrap();
        let ctx = TriggerContext::proposed_change("42", "main", "abc1234").unwrap();

        let skipped: Vec<String> = graph
            .plan(&ctx)
            .into_iter()
            .filter(|p| !p.runs)
            .map(|p| p.name)
            .collect();
        assert_eq!(skipped, vec![PUBLISH, RECORD]);
    }

    #[test]
    fn test_plan_for_push_runs_everything() {
        let graph = standard_graph(&Settings::default()).unwrap();
        let ctx = TriggerContext::direct_push("main", "9f8e7d6c").unwrap();
        assert!(graph.plan(&ctx).iter().all(|p| p.runs));
    }
}
