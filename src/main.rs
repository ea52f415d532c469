// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! shipline - Delivery Pipeline Orchestrator
//!
//! Build, scan, publish and record container images for one trigger.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipline::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shipline=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    shipline::utils::init_colors();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    let config = cli.config.as_path();

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            trigger,
            dry_run,
            json,
        } => shipline::cli::run::run(config, trigger, dry_run, json, cli.verbose).await,
        Commands::Graph { format } => {
            shipline::cli::graph::run(config, format, cli.verbose).await
        }
        Commands::Validate => shipline::cli::validate::run(config, cli.verbose).await,
        Commands::Tags { trigger, primary } => {
            shipline::cli::tags::run(config, trigger, primary, cli.verbose).await
        }
        Commands::Gate {
            report,
            threshold,
            include_unfixable,
        } => {
            shipline::cli::gate::run(config, &report, threshold, include_unfixable, cli.verbose)
                .await
        }
        Commands::Record {
            tag,
            file,
            no_commit,
        } => shipline::cli::record::run(config, &tag, file, no_commit, cli.verbose).await,
    }
}
