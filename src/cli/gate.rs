// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Gate command - evaluate a scan report offline

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::load_settings;
use crate::errors::ShiplineError;
use crate::gate::{GateEvaluator, ScanReport, Severity};

/// Run the gate command
pub async fn run(
    config_path: &Path,
    report_path: &Path,
    threshold: Option<Severity>,
    include_unfixable: bool,
    verbose: bool,
) -> Result<()> {
    let settings = load_settings(config_path)?;
    let mut policy = settings.gate;
    if let Some(threshold) = threshold {
        policy.threshold = threshold;
    }
    if include_unfixable {
        policy.fixable_only = false;
    }

    let report = ScanReport::from_file(report_path)?;
    let result = report.summarize(policy.fixable_only);
    let verdict = GateEvaluator::evaluate(&result, &policy);

    if verbose {
        println!("{}:", "Findings".bold());
        for finding in &report.findings {
            let fix = finding.fixed_version.as_deref().unwrap_or("no fix");
            println!("  {} {} ({})", finding.severity, finding.id, fix.dimmed());
        }
        println!();
    }

    if verdict.passed() {
        println!("{} {}", "PASS".green().bold(), verdict.message);
        Ok(())
    } else {
        println!("{} {}", "BLOCK".red().bold(), verdict.message);
        Err(ShiplineError::GateBlocked {
            stage: "gate".to_string(),
            summary: verdict.message,
        }
        .into())
    }
}
