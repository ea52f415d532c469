// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Pipeline definitions and execution
//!
//! This module defines stages, the validated job graph they form, the
//! standard delivery topology, and the scheduler that runs a graph for one
//! trigger.

mod dag;
mod definition;
mod scheduler;
pub mod topology;
mod validation;

pub use dag::{JobGraph, PlannedStage};
pub use definition::*;
pub use scheduler::{RunOutcome, RunStatus, Scheduler, SkipReason, StageReport, StageStatus};
pub use topology::{standard_graph, standard_stages};
pub use validation::{PipelineValidator, ValidationResult};
