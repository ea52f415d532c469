// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Validate command - check configuration and the stage graph

use colored::Colorize;
use miette::Result;
use std::path::Path;

use crate::config::Settings;
use crate::executors::create_default_executors;
use crate::pipeline::{standard_stages, JobGraph, PipelineValidator, Scheduler};
use crate::utils::{fail_mark, ok_mark, warn_mark};

/// Run the validate command
pub async fn run(config_path: &Path, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let settings = if config_path.exists() {
        match Settings::from_file(config_path) {
            Ok(settings) => {
                println!("  {} {} is valid", ok_mark(), config_path.display());
                settings
            }
            Err(e) => {
                eprintln!("  {} Failed to load {}", fail_mark(), config_path.display());
                eprintln!();
                return Err(e.into());
            }
        }
    } else {
        println!(
            "  {} {} not found, using defaults",
            warn_mark(),
            config_path.display()
        );
        Settings::default()
    };

    let stages = standard_stages(&settings);
    let validation = PipelineValidator::validate(&stages, &settings);

    if !validation.errors.is_empty() {
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", fail_mark(), error);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            println!("  {} {}", warn_mark(), warning);
        }
    }

    let mut missing_tools = Vec::new();
    if validation.is_valid() {
        let graph = JobGraph::new(stages.clone())?;
        let scheduler = Scheduler::with_executors(create_default_executors(&settings)?);
        missing_tools = scheduler.check_tools(&graph).await;

        if !missing_tools.is_empty() {
            println!();
            println!("{}:", "Missing tools".yellow().bold());
            for tool in &missing_tools {
                println!("  {} {}", warn_mark(), tool);
            }
        }
    }

    if verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        println!("  Image: {}", settings.image_name());
        println!("  Deploy file: {}", settings.deploy.file.display());
        println!("  Workers: {}", settings.workers.0);
        println!("  Stages: {}", stages.len());
        for stage in &stages {
            let deps = if stage.depends_on.is_empty() {
                String::new()
            } else {
                format!(" [depends: {}]", stage.depends_on.join(", "))
            };
            println!("    - {} ({}){}", stage.name, stage.tool_name(), deps.dimmed());
        }
    }

    println!();

    if !validation.is_valid() {
        return Err(miette::miette!("Pipeline validation failed"));
    }

    if validation.has_warnings() || !missing_tools.is_empty() {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
    }
    Ok(())
}
