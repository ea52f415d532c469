// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Run command - execute the pipeline for one trigger

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::{load_settings, TriggerArgs};
use crate::executors::create_default_executors;
use crate::pipeline::{
    standard_stages, JobGraph, PipelineValidator, RunOutcome, RunStatus, Scheduler, StageStatus,
};
use crate::trigger::TriggerContext;
use crate::utils::{fail_mark, ok_mark, skip_mark, warn_mark};

/// Run the pipeline
pub async fn run(
    config_path: &Path,
    trigger: TriggerArgs,
    dry_run: bool,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let settings = load_settings(config_path)?;
    let ctx = trigger.resolve()?;

    let stages = standard_stages(&settings);
    let validation = PipelineValidator::validate(&stages, &settings);

    if !validation.is_valid() {
        eprintln!("{}", "Pipeline validation failed:".red().bold());
        for error in &validation.errors {
            eprintln!("  {} {}", fail_mark(), error);
        }
        return Err(miette::miette!("Pipeline configuration is invalid"));
    }

    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", warn_mark(), warning);
        }
        eprintln!();
    }

    let graph = JobGraph::new(stages)?;

    if dry_run {
        print_plan(&graph, &ctx);
        return Ok(());
    }

    let scheduler = Scheduler::with_executors(create_default_executors(&settings)?);

    let missing_tools = scheduler.check_tools(&graph).await;
    if !missing_tools.is_empty() {
        eprintln!("{}", "Missing required tools:".red().bold());
        for tool in &missing_tools {
            eprintln!("  {} {}", fail_mark(), tool);
        }
        return Err(miette::miette!("Required tools are not installed"));
    }

    let working_dir = std::env::current_dir()
        .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;

    if !json {
        println!();
        println!("{}: {}", "Trigger".bold(), ctx);
        println!("{}", "═".repeat(50));
    }

    let outcome = scheduler
        .execute(&graph, &ctx, &settings, &working_dir)
        .await?;

    if json {
        println!("{}", outcome_json(&outcome, &ctx));
    } else {
        print_outcome(&outcome, verbose);
    }

    outcome.into_result()?;
    Ok(())
}

fn print_plan(graph: &JobGraph, ctx: &TriggerContext) {
    println!();
    println!("{}: {}", "Trigger".bold(), ctx);
    println!("{}", "═".repeat(50));
    println!("Execution plan ({} stages):", graph.len());
    println!();

    for (i, planned) in graph.plan(ctx).iter().enumerate() {
        let tool = graph
            .stage(&planned.name)
            .map(|s| s.tool_name())
            .unwrap_or_default();
        match &planned.reason {
            None => println!("  {}. {} ({})", i + 1, planned.name.bold(), tool),
            Some(reason) => println!(
                "  {}. {} ({}) {}",
                i + 1,
                planned.name.dimmed(),
                tool,
                format!("[skip: {}]", reason).dimmed()
            ),
        }
    }
    println!();
}

fn print_outcome(outcome: &RunOutcome, verbose: bool) {
    for report in &outcome.stages {
        let timing = report
            .duration
            .map(|d| format!(" ({:.2}s)", d.as_secs_f64()))
            .unwrap_or_default();
        match &report.status {
            StageStatus::Succeeded => {
                println!("  {} {}{}", ok_mark(), report.name.bold(), timing.dimmed())
            }
            StageStatus::Failed => {
                println!("  {} {} failed{}", fail_mark(), report.name.bold(), timing.dimmed());
                if let Some(message) = &report.message {
                    println!("    {}", message.dimmed());
                }
            }
            StageStatus::Skipped(reason) => println!(
                "  {} {} {}",
                skip_mark(),
                report.name.dimmed(),
                format!("(skipped: {})", reason).dimmed()
            ),
            StageStatus::Pending | StageStatus::Running => {
                println!("  {} {}", "?".yellow(), report.name)
            }
        }
    }

    if let Some(verdict) = &outcome.gate {
        println!();
        let label = if verdict.passed() {
            "Gate passed".green()
        } else {
            "Gate blocked".red()
        };
        println!("{}: {}", label.bold(), verdict.message);
    }

    if verbose && !outcome.tags.is_empty() {
        println!();
        println!("{}: {}", "Tags".bold(), outcome.tags.values().join(", "));
    }

    println!();
    let seconds = outcome.duration.as_secs_f64();
    match outcome.status {
        RunStatus::Success => println!(
            "{}",
            format!("Pipeline completed successfully in {:.2}s", seconds).green()
        ),
        RunStatus::Skipped => println!("{}", "No stage ran for this trigger".yellow()),
        RunStatus::Failed => println!(
            "{}",
            format!(
                "Pipeline failed at '{}' after {:.2}s",
                outcome.failing_stage.as_deref().unwrap_or("?"),
                seconds
            )
            .red()
        ),
    }
}

fn outcome_json(outcome: &RunOutcome, ctx: &TriggerContext) -> serde_json::Value {
    serde_json::json!({
        "run_id": ctx.run_id(),
        "trigger": ctx,
        "status": outcome.status,
        "failing_stage": outcome.failing_stage,
        "error": outcome.error.as_ref().map(|e| serde_json::json!({
            "kind": e.kind(),
            "message": e.to_string(),
        })),
        "tags": outcome.tags.values(),
        "gate": outcome.gate,
        "stages": outcome.stages,
        "duration_ms": outcome.duration.as_millis() as u64,
    })
}
