// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Trigger context
//!
//! The event that started a run, captured once and threaded by reference to
//! every stage. Nothing downstream reads ambient CI variables directly; they
//! are folded into a [`TriggerContext`] here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::{ShiplineError, ShiplineResult};

/// Kind of source-control event that started the run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A direct update to a tracked branch
    DirectPush,
    /// A proposed change (pull/merge request) against a tracked branch
    ProposedChange,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectPush => write!(f, "push"),
            Self::ProposedChange => write!(f, "proposed-change"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "push" | "direct-push" | "direct_push" => Ok(Self::DirectPush),
            "proposed-change" | "proposed_change" | "pull_request" | "pull-request"
            | "pr" | "merge_request" => Ok(Self::ProposedChange),
            _ => Err(format!("Unknown event kind: {}", s)),
        }
    }
}

/// Immutable description of the event that started a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TriggerContext {
    event_kind: EventKind,
    branch_name: String,
    commit_id: String,
    proposed_change_id: Option<String>,
}

impl TriggerContext {
    /// A direct update to `branch` at `commit`
    pub fn direct_push(
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> ShiplineResult<Self> {
        let ctx = Self {
            event_kind: EventKind::DirectPush,
            branch_name: branch.into(),
            commit_id: commit.into(),
            proposed_change_id: None,
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// A proposed change `change_id` against `target_branch` at `commit`
    pub fn proposed_change(
        change_id: impl Into<String>,
        target_branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> ShiplineResult<Self> {
        let ctx = Self {
            event_kind: EventKind::ProposedChange,
            branch_name: target_branch.into(),
            commit_id: commit.into(),
            proposed_change_id: Some(change_id.into()),
        };
        ctx.validate()?;
        Ok(ctx)
    }

    /// Build a context from the current process environment
    pub fn from_env() -> ShiplineResult<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// Build a context from GitHub-Actions-style variables
    ///
    /// `GITHUB_EVENT_NAME` selects the event kind. For proposed changes the
    /// change id is taken from `GITHUB_REF` (`refs/pull/<id>/merge`) and the
    /// target branch from `GITHUB_BASE_REF`.
    pub fn from_env_map(vars: &HashMap<String, String>) -> ShiplineResult<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let event = get("GITHUB_EVENT_NAME").ok_or_else(|| ShiplineError::InvalidTrigger {
            reason: "GITHUB_EVENT_NAME is not set".into(),
        })?;
        let commit = get("GITHUB_SHA").ok_or_else(|| ShiplineError::InvalidTrigger {
            reason: "GITHUB_SHA is not set".into(),
        })?;

        match event {
            "pull_request" | "pull_request_target" => {
                let change_id = get("GITHUB_REF")
                    .and_then(|r| r.strip_prefix("refs/pull/"))
                    .and_then(|r| r.split('/').next())
                    .ok_or_else(|| ShiplineError::InvalidTrigger {
                        reason: "GITHUB_REF does not name a pull request".into(),
                    })?;
                let target = get("GITHUB_BASE_REF").ok_or_else(|| {
                    ShiplineError::InvalidTrigger {
                        reason: "GITHUB_BASE_REF is not set".into(),
                    }
                })?;
                Self::proposed_change(change_id, target, commit)
            }
            "push" => {
                let branch = get("GITHUB_REF_NAME")
                    .or_else(|| get("GITHUB_REF").and_then(|r| r.strip_prefix("refs/heads/")))
                    .ok_or_else(|| ShiplineError::InvalidTrigger {
                        reason: "GITHUB_REF_NAME is not set".into(),
                    })?;
                Self::direct_push(branch, commit)
            }
            other => Err(ShiplineError::InvalidTrigger {
                reason: format!("unsupported event '{}'", other),
            }),
        }
    }

    fn validate(&self) -> ShiplineResult<()> {
        if self.commit_id.is_empty() {
            return Err(ShiplineError::InvalidTrigger {
                reason: "commit id is empty".into(),
            });
        }
        if self.commit_id.chars().any(char::is_whitespace) {
            return Err(ShiplineError::InvalidTrigger {
                reason: format!("commit id '{}' contains whitespace", self.commit_id),
            });
        }
        if self.branch_name.trim().is_empty() {
            return Err(ShiplineError::InvalidTrigger {
                reason: "branch name is empty".into(),
            });
        }
        if let Some(id) = &self.proposed_change_id {
            if id.trim().is_empty() {
                return Err(ShiplineError::InvalidTrigger {
                    reason: "proposed change id is empty".into(),
                });
            }
        }
        Ok(())
    }

    pub fn event_kind(&self) -> EventKind {
        self.event_kind
    }

    /// Branch updated by a push, or the target branch of a proposed change
    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }

    pub fn proposed_change_id(&self) -> Option<&str> {
        self.proposed_change_id.as_deref()
    }

    pub fn is_proposed_change(&self) -> bool {
        self.event_kind == EventKind::ProposedChange
    }

    /// Deterministic identifier for this run
    pub fn run_id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.event_kind.to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(self.branch_name.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.commit_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.proposed_change_id.as_deref().unwrap_or("").as_bytes());
        hasher.finalize().to_hex().as_str()[..16].to_string()
    }

    /// Variables exported to every collaborator invocation
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("SHIPLINE_EVENT".to_string(), self.event_kind.to_string()),
            ("SHIPLINE_BRANCH".to_string(), self.branch_name.clone()),
            ("SHIPLINE_COMMIT".to_string(), self.commit_id.clone()),
        ];
        if let Some(id) = &self.proposed_change_id {
            vars.push(("SHIPLINE_CHANGE_ID".to_string(), id.clone()));
        }
        vars
    }
}

impl fmt::Display for TriggerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.proposed_change_id {
            Some(id) => write!(
                f,
                "proposed change #{} → {} @ {}",
                id, self.branch_name, self.commit_id
            ),
            None => write!(f, "push to {} @ {}", self.branch_name, self.commit_id),
        }
    }
}
