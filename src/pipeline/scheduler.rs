// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Pipeline scheduler
//!
//! Walks a [`JobGraph`] for one trigger. Stages whose dependencies have all
//! settled are launched onto a bounded set of in-flight futures; the loop
//! only wakes when one of them completes. A failure (non-zero exit, unmet
//! output postcondition, gate block, typed collaborator error) marks every
//! transitive dependent as skipped before anything else is launched.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::artifacts::ArtifactStore;
use crate::conditions::ConditionalExecutor;
use crate::config::Settings;
use crate::errors::{ShiplineError, ShiplineResult};
use crate::executors::{ArtifactPayload, ExecutionResult, Executor, Invocation, ResolvedArtifact};
use crate::gate::{GateEvaluator, GateVerdict};
use crate::pipeline::{JobGraph, Stage};
use crate::tags::{TagResolver, TagSet};
use crate::trigger::TriggerContext;

/// Why a stage was never invoked
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Its run condition does not hold for the trigger
    Condition(String),
    /// A stage it depends on failed
    UpstreamFailed(String),
    /// An artifact it consumes was never produced
    MissingArtifact(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition(condition) => write!(f, "condition not met: {}", condition),
            Self::UpstreamFailed(stage) => write!(f, "upstream stage '{}' failed", stage),
            Self::MissingArtifact(key) => write!(f, "artifact '{}' was not produced", key),
        }
    }
}

/// Lifecycle of a stage within one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "skip", rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped(SkipReason),
}

impl StageStatus {
    /// Dependents may proceed past this stage
    fn is_settled_ok(&self) -> bool {
        matches!(
            self,
            Self::Succeeded
                | Self::Skipped(SkipReason::Condition(_))
                | Self::Skipped(SkipReason::MissingArtifact(_))
        )
    }

    fn is_failed(&self) -> bool {
        matches!(self, Self::Failed | Self::Skipped(SkipReason::UpstreamFailed(_)))
    }

    pub fn was_invoked(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Per-stage record of a run
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub name: String,
    pub status: StageStatus,
    pub duration: Option<Duration>,
    pub exit_code: Option<i32>,
    /// Failure description
    pub message: Option<String>,
}

impl StageReport {
    fn pending(stage: &Stage) -> Self {
        Self {
            name: stage.name.clone(),
            status: StageStatus::Pending,
            duration: None,
            exit_code: None,
            message: None,
        }
    }
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
    /// No stage was invoked at all
    Skipped,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// Terminal result of a run
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    /// First stage to fail, by completion order
    pub failing_stage: Option<String>,
    /// Error that failed `failing_stage`
    pub error: Option<ShiplineError>,
    /// Reports in graph declaration order
    pub stages: Vec<StageReport>,
    pub tags: TagSet,
    /// Security gate verdict, when a scan ran
    pub gate: Option<GateVerdict>,
    pub duration: Duration,
}

impl RunOutcome {
    /// Process exit code: 0 on success or an empty run, 1 on failure
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::Failed => 1,
            RunStatus::Success | RunStatus::Skipped => 0,
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn status_of(&self, name: &str) -> Option<&StageStatus> {
        self.stage(name).map(|s| &s.status)
    }

    /// Names of stages whose collaborator was invoked
    pub fn invoked(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.status.was_invoked())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Turn a failed run into its error
    pub fn into_result(mut self) -> ShiplineResult<Self> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

enum Readiness {
    Wait,
    Skip(SkipReason),
    Ready(Vec<ResolvedArtifact>),
}

/// DAG scheduler
pub struct Scheduler {
    /// Registered executors by action name
    executors: HashMap<String, Box<dyn Executor>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Scheduler with every executor in `executors` registered
    pub fn with_executors(executors: HashMap<String, Box<dyn Executor>>) -> Self {
        Self { executors }
    }

    /// Register an executor for an action
    pub fn register_executor(&mut self, name: &str, executor: Box<dyn Executor>) {
        self.executors.insert(name.to_string(), executor);
    }

    /// Execute the graph for one trigger
    ///
    /// Stage failures are reported in the returned [`RunOutcome`]; `Err` means
    /// the run could not be set up at all.
    pub async fn execute(
        &self,
        graph: &JobGraph,
        ctx: &TriggerContext,
        settings: &Settings,
        working_dir: &Path,
    ) -> ShiplineResult<RunOutcome> {
        let start = Instant::now();
        let tags = TagResolver::new(&settings.tags).resolve(ctx);
        let mut store = ArtifactStore::for_run(&settings.artifacts, working_dir, &ctx.run_id())?;

        tracing::info!(
            trigger = %ctx,
            run_id = %ctx.run_id(),
            tag = tags.primary().map(|t| t.value.as_str()).unwrap_or("-"),
            stages = graph.len(),
            "run started"
        );

        let mut outcome = self
            .drive(graph, ctx, settings, working_dir, &tags, &mut store)
            .await;
        outcome.duration = start.elapsed();

        if let Err(e) = store.close().await {
            tracing::warn!(error = %e, "could not remove run artifacts");
        }

        tracing::info!(
            status = %outcome.status,
            failing_stage = outcome.failing_stage.as_deref().unwrap_or("-"),
            duration_ms = outcome.duration.as_millis() as u64,
            "run finished"
        );

        Ok(outcome)
    }

    async fn drive(
        &self,
        graph: &JobGraph,
        ctx: &TriggerContext,
        settings: &Settings,
        working_dir: &Path,
        tags: &TagSet,
        store: &mut ArtifactStore,
    ) -> RunOutcome {
        let stages = graph.stages();
        let workers = settings.workers.0.max(1);
        let mut reports: Vec<StageReport> = stages.iter().map(StageReport::pending).collect();
        let mut failure: Option<(String, ShiplineError)> = None;
        let mut gate = None;
        let mut running = FuturesUnordered::new();

        loop {
            for &idx in graph.topological_order() {
                if running.len() >= workers {
                    break;
                }
                if reports[idx].status != StageStatus::Pending {
                    continue;
                }

                let stage = &stages[idx];
                match Self::readiness(graph, idx, &reports, ctx, store) {
                    Readiness::Wait => {}
                    Readiness::Skip(reason) => {
                        match reason {
                            SkipReason::Condition(_) => {
                                tracing::info!(stage = %stage.name, %reason, "stage skipped")
                            }
                            _ => tracing::warn!(stage = %stage.name, %reason, "stage skipped"),
                        }
                        reports[idx].status = StageStatus::Skipped(reason);
                    }
                    Readiness::Ready(inputs) => {
                        tracing::info!(stage = %stage.name, action = stage.tool_name(), "stage started");
                        reports[idx].status = StageStatus::Running;

                        let executor = self.executors.get(stage.tool_name());
                        running.push(async move {
                            let invocation = Invocation {
                                trigger: ctx,
                                tags,
                                settings,
                                working_dir,
                                inputs: &inputs,
                            };
                            let started = Instant::now();
                            let result = match executor {
                                Some(executor) => match executor.validate_stage(stage) {
                                    Ok(()) => executor.execute(stage, &invocation).await,
                                    Err(e) => Err(e),
                                },
                                None => Err(ShiplineError::ExecutorNotFound {
                                    tool: stage.tool_name().to_string(),
                                }),
                            };
                            (idx, result, started.elapsed())
                        });
                    }
                }
            }

            let Some((idx, result, duration)) = running.next().await else {
                break;
            };

            let stage = &stages[idx];
            reports[idx].duration = Some(duration);
            if let Ok(exec) = &result {
                reports[idx].exit_code = Some(exec.exit_code);
            }

            match Self::accept(stage, result, settings, store, &mut gate).await {
                Ok(()) => {
                    tracing::info!(
                        stage = %stage.name,
                        duration_ms = duration.as_millis() as u64,
                        "stage succeeded"
                    );
                    reports[idx].status = StageStatus::Succeeded;
                }
                Err(error) => {
                    tracing::warn!(stage = %stage.name, %error, "stage failed");
                    reports[idx].status = StageStatus::Failed;
                    reports[idx].message = Some(error.to_string());

                    for dependent in graph.transitive_dependents(&stage.name) {
                        if reports[dependent].status == StageStatus::Pending {
                            reports[dependent].status = StageStatus::Skipped(
                                SkipReason::UpstreamFailed(stage.name.clone()),
                            );
                        }
                    }

                    if failure.is_none() {
                        failure = Some((stage.name.clone(), error));
                    }
                }
            }
        }

        let status = if failure.is_some() {
            RunStatus::Failed
        } else if reports.iter().any(|r| r.status.was_invoked()) {
            RunStatus::Success
        } else {
            RunStatus::Skipped
        };
        let (failing_stage, error) = match failure {
            Some((stage, error)) => (Some(stage), Some(error)),
            None => (None, None),
        };

        RunOutcome {
            status,
            failing_stage,
            error,
            stages: reports,
            tags: tags.clone(),
            gate,
            duration: Duration::ZERO,
        }
    }

    /// Decide what to do with a pending stage
    fn readiness(
        graph: &JobGraph,
        idx: usize,
        reports: &[StageReport],
        ctx: &TriggerContext,
        store: &ArtifactStore,
    ) -> Readiness {
        let stage = &graph.stages()[idx];
        let dependencies = graph.dependency_indices(idx);

        if let Some(&failed) = dependencies.iter().find(|&&d| reports[d].status.is_failed()) {
            let origin = match &reports[failed].status {
                StageStatus::Skipped(SkipReason::UpstreamFailed(origin)) => origin.clone(),
                _ => reports[failed].name.clone(),
            };
            return Readiness::Skip(SkipReason::UpstreamFailed(origin));
        }

        if !dependencies.iter().all(|&d| reports[d].status.is_settled_ok()) {
            return Readiness::Wait;
        }

        if !ConditionalExecutor::should_run(stage, ctx) {
            return Readiness::Skip(SkipReason::Condition(stage.condition.to_string()));
        }

        let mut inputs = Vec::with_capacity(stage.consumes.len());
        for key in &stage.consumes {
            match store.handle(key) {
                Ok(handle) => inputs.push(ResolvedArtifact {
                    key: key.clone(),
                    location: handle.location.clone(),
                }),
                Err(_) => return Readiness::Skip(SkipReason::MissingArtifact(key.clone())),
            }
        }

        Readiness::Ready(inputs)
    }

    /// Check a completed stage's postconditions and publish its outputs
    async fn accept(
        stage: &Stage,
        result: ShiplineResult<ExecutionResult>,
        settings: &Settings,
        store: &mut ArtifactStore,
        gate: &mut Option<GateVerdict>,
    ) -> ShiplineResult<()> {
        let exec = result?;
        if !exec.success {
            return Err(ShiplineError::stage_failed(
                &stage.name,
                exec.exit_code,
                &exec.stderr,
            ));
        }

        if let Some(missing) = stage
            .produces
            .iter()
            .find(|o| !exec.outputs.iter().any(|p| p.key == o.key))
        {
            return Err(ShiplineError::StageExecution {
                stage: stage.name.clone(),
                message: format!("expected artifact '{}' was not produced", missing.key),
                exit_code: None,
                help: Some(format!("Check that the stage writes '{}'", missing.path)),
            });
        }

        if let Some(report) = &exec.scan {
            let scan = report.summarize(settings.gate.fixable_only);
            let verdict = GateEvaluator::evaluate(&scan, &settings.gate);
            tracing::info!(
                stage = %stage.name,
                decision = ?verdict.decision,
                "{}",
                verdict.message
            );
            let blocked = !verdict.passed();
            let summary = verdict.message.clone();
            *gate = Some(verdict);
            if blocked {
                return Err(ShiplineError::GateBlocked {
                    stage: stage.name.clone(),
                    summary,
                });
            }
        }

        for output in &exec.outputs {
            if stage.produces.iter().any(|o| o.key == output.key) {
                match &output.payload {
                    ArtifactPayload::Bytes(bytes) => {
                        store.put(&output.key, &stage.name, bytes).await?;
                    }
                    ArtifactPayload::File(path) => {
                        store.put_file(&output.key, &stage.name, path).await?;
                    }
                }
            }
        }

        Ok(())
    }

    /// Actions used by the graph that have no available executor
    pub async fn check_tools(&self, graph: &JobGraph) -> Vec<String> {
        let mut tools: Vec<&str> = graph.stages().iter().map(|s| s.tool_name()).collect();
        tools.sort_unstable();
        tools.dedup();

        let mut missing = Vec::new();
        for tool in tools {
            let available = match self.executors.get(tool) {
                Some(executor) => executor.check_available().await.unwrap_or(false),
                None => false,
            };
            if !available {
                missing.push(tool.to_string());
            }
        }
        missing
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
