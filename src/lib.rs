// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! # shipline - Delivery Pipeline Orchestrator
//!
//! `shipline` runs the path from a source-control event to a recorded
//! deployment: lint, build and test, containerize, scan, publish, and record
//! the published image tag in a deployment configuration file.
//!
//! ## Features
//!
//! - **Stage graph** - Stages form a validated DAG; independent stages run concurrently
//! - **Conditional stages** - Proposed changes never publish or record
//! - **Deterministic tags** - Image tags derive from the trigger alone
//! - **Security gate** - Scan findings at or above a severity threshold stop the run
//! - **Artifact hand-off** - Stage outputs move between stages through a content-addressed store
//! - **Idempotent record** - Re-recording the same tag is a no-op
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the stage graph
//! shipline graph
//!
//! # Run for a push to main
//! shipline run --branch main --commit "$(git rev-parse HEAD)"
//!
//! # Evaluate a scanner report offline
//! shipline gate scan-report.json
//! ```

pub mod artifacts;
pub mod cli;
pub mod commit;
pub mod conditions;
pub mod config;
pub mod errors;
pub mod executors;
pub mod gate;
pub mod pipeline;
pub mod tags;
pub mod trigger;
pub mod utils;

// Re-export commonly used types
pub use artifacts::ArtifactStore;
pub use commit::StateCommitter;
pub use conditions::{ConditionalExecutor, RunCondition};
pub use config::Settings;
pub use errors::{ShiplineError, ShiplineResult};
pub use gate::GateEvaluator;
pub use pipeline::{JobGraph, RunOutcome, Scheduler, Stage};
pub use tags::TagResolver;
pub use trigger::TriggerContext;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
