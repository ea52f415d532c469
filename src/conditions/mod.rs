// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Conditional stage execution
//!
//! Run predicates live on the stage as data, and every gated stage is decided
//! by the same [`ConditionalExecutor::should_run`], so the rule that proposed
//! changes never publish or record is enforced in one place.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pipeline::Stage;
use crate::trigger::{EventKind, TriggerContext};

/// Predicate over the trigger context deciding whether a stage runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunCondition {
    /// Always run (default)
    #[default]
    Always,
    /// Run unless the trigger is a proposed change
    NotProposedChange,
}

impl RunCondition {
    /// Evaluate the predicate; pure
    pub fn holds(&self, ctx: &TriggerContext) -> bool {
        match self {
            Self::Always => true,
            Self::NotProposedChange => ctx.event_kind() != EventKind::ProposedChange,
        }
    }
}

impl fmt::Display for RunCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::NotProposedChange => write!(f, "not on proposed changes"),
        }
    }
}

/// Decides whether a candidate stage runs for a trigger
pub struct ConditionalExecutor;

impl ConditionalExecutor {
    pub fn should_run(stage: &Stage, ctx: &TriggerContext) -> bool {
        let run = stage.condition.holds(ctx);
        if !run {
            tracing::debug!(stage = %stage.name, condition = %stage.condition, "condition not met");
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push() -> TriggerContext {
        TriggerContext::direct_push("main", "abc1234").unwrap()
    }

    fn change() -> TriggerContext {
        TriggerContext::proposed_change("42", "main", "abc1234").unwrap()
    }

    #[test]
    fn test_not_proposed_change() {
        assert!(RunCondition::NotProposedChange.holds(&push()));
        assert!(!RunCondition::NotProposedChange.holds(&change()));
    }

    #[test]
    fn test_always() {
        assert!(RunCondition::Always.holds(&push()));
        assert!(RunCondition::Always.holds(&change()));
    }

    #[test]
    fn test_should_run_uses_stage_condition() {
        let stage = Stage::shell("publish", "true").with_condition(RunCondition::NotProposedChange);
        assert!(ConditionalExecutor::should_run(&stage, &push()));
        assert!(!ConditionalExecutor::should_run(&stage, &change()));
    }

    #[test]
    fn test_parse_condition_yaml() {
        let cond: RunCondition = serde_yaml::from_str("not_proposed_change").unwrap();
        assert_eq!(cond, RunCondition::NotProposedChange);
        let cond: RunCondition = serde_yaml::from_str("always").unwrap();
        assert_eq!(cond, RunCondition::Always);
    }
}
