// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for shipline.

pub mod gate;
pub mod graph;
pub mod record;
pub mod run;
pub mod tags;
pub mod validate;

use clap::{Args, Parser, Subcommand};
use miette::Result;
use std::path::{Path, PathBuf};

use crate::config::{Settings, DEFAULT_CONFIG_FILE};
use crate::errors::{ShiplineError, ShiplineResult};
use crate::gate::Severity;
use crate::trigger::{EventKind, TriggerContext};

/// Delivery pipeline orchestrator
///
/// Runs lint → build/test → containerize → scan → publish → record for one
/// source-control event.
#[derive(Parser, Debug)]
#[clap(
    name = "shipline",
    version,
    about = "Delivery pipeline orchestrator: build, scan, publish and record container images",
    long_about = None,
    after_help = "Examples:\n\
        shipline run --event push --branch main --commit \"$SHA\"   Run for a push\n\
        shipline run --dry-run                                    Show which stages would run\n\
        shipline graph --format mermaid                           Render the stage graph\n\
        shipline gate scan-report.json                            Evaluate a scan report\n\n\
        See 'shipline <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Configuration file
    #[clap(
        short,
        long,
        global = true,
        env = "SHIPLINE_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline for a trigger
    Run {
        #[clap(flatten)]
        trigger: TriggerArgs,

        /// Show which stages would run without invoking anything
        #[clap(long)]
        dry_run: bool,

        /// Print the run outcome as JSON
        #[clap(long)]
        json: bool,
    },

    /// Show the stage graph
    Graph {
        /// Output format (text, dot, mermaid)
        #[clap(short, long, default_value = "text")]
        format: GraphFormat,
    },

    /// Validate the configuration and stage graph
    Validate,

    /// Print the tags derived for a trigger
    Tags {
        #[clap(flatten)]
        trigger: TriggerArgs,

        /// Print only the primary tag
        #[clap(long)]
        primary: bool,
    },

    /// Evaluate a scan report against the security gate
    Gate {
        /// Scanner JSON report (Trivy or native format)
        report: PathBuf,

        /// Lowest blocking severity (overrides configuration)
        #[clap(long)]
        threshold: Option<Severity>,

        /// Count findings that have no fix available
        #[clap(long)]
        include_unfixable: bool,
    },

    /// Write a tag into the deployment configuration
    Record {
        /// Tag value to record
        tag: String,

        /// Deployment configuration file (overrides configuration)
        #[clap(long)]
        file: Option<PathBuf>,

        /// Update the file without committing
        #[clap(long)]
        no_commit: bool,
    },
}

/// Trigger selection; falls back to the CI environment when no commit is given
#[derive(Args, Debug, Clone, Default)]
pub struct TriggerArgs {
    /// Event kind (push, proposed-change)
    #[clap(long, env = "SHIPLINE_EVENT")]
    pub event: Option<EventKind>,

    /// Branch pushed to, or target branch of a proposed change
    #[clap(long, env = "SHIPLINE_BRANCH")]
    pub branch: Option<String>,

    /// Commit id
    #[clap(long, env = "SHIPLINE_COMMIT")]
    pub commit: Option<String>,

    /// Proposed change id
    #[clap(long, env = "SHIPLINE_CHANGE_ID")]
    pub change_id: Option<String>,
}

impl TriggerArgs {
    /// Build the trigger context from flags, or the CI environment without `--commit`
    pub fn resolve(&self) -> ShiplineResult<TriggerContext> {
        let Some(commit) = &self.commit else {
            return TriggerContext::from_env();
        };

        let event = self.event.unwrap_or(if self.change_id.is_some() {
            EventKind::ProposedChange
        } else {
            EventKind::DirectPush
        });
        let branch = self.branch.clone().ok_or_else(|| ShiplineError::InvalidTrigger {
            reason: "--branch is required with --commit".into(),
        })?;

        match event {
            EventKind::DirectPush => TriggerContext::direct_push(branch, commit.as_str()),
            EventKind::ProposedChange => {
                let change_id =
                    self.change_id
                        .clone()
                        .ok_or_else(|| ShiplineError::InvalidTrigger {
                            reason: "--change-id is required for proposed changes".into(),
                        })?;
                TriggerContext::proposed_change(change_id, branch, commit.as_str())
            }
        }
    }
}

/// Load settings from `path`, falling back to defaults when it is absent
pub(crate) fn load_settings(path: &Path) -> Result<Settings> {
    Ok(Settings::load_or_default(path)?)
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_trigger_from_flags() {
        let args = TriggerArgs {
            branch: Some("main".into()),
            commit: Some("abc1234".into()),
            change_id: Some("42".into()),
            ..Default::default()
        };
        let ctx = args.resolve().unwrap();
        assert!(ctx.is_proposed_change());
        assert_eq!(ctx.proposed_change_id(), Some("42"));
    }

    #[test]
    fn test_trigger_requires_branch() {
        let args = TriggerArgs {
            commit: Some("abc1234".into()),
            ..Default::default()
        };
        assert!(matches!(
            args.resolve(),
            Err(ShiplineError::InvalidTrigger { .. })
        ));
    }

    #[test]
    fn test_proposed_change_requires_id() {
        let args = TriggerArgs {
            event: Some(EventKind::ProposedChange),
            branch: Some("main".into()),
            commit: Some("abc1234".into()),
            change_id: None,
        };
        assert!(args.resolve().is_err());
    }
}
