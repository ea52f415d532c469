// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Record command - write a tag into the deployment configuration

use colored::Colorize;
use miette::Result;
use std::path::{Path, PathBuf};

use super::load_settings;
use crate::commit::{deploy_file_path, CommitOutcome, StateCommitter};
use crate::utils::ok_mark;

/// Run the record command
pub async fn run(
    config_path: &Path,
    tag: &str,
    file: Option<PathBuf>,
    no_commit: bool,
    _verbose: bool,
) -> Result<()> {
    let mut settings = load_settings(config_path)?;
    if let Some(file) = file {
        settings.deploy.file = file;
    }
    if no_commit {
        settings.deploy.commit = false;
    }

    let working_dir = std::env::current_dir()
        .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;
    let path = deploy_file_path(&settings.deploy, &working_dir);

    let committer = StateCommitter::from_settings(&settings.deploy)?;
    match committer.apply(&path, tag).await? {
        CommitOutcome::NoOpNoChange => {
            println!("  {} {} already at {}", ok_mark(), path.display(), tag.bold());
        }
        outcome @ CommitOutcome::Committed { .. } => {
            println!("  {} {}: {}", ok_mark(), path.display(), outcome);
        }
    }

    Ok(())
}
