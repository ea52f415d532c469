// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Security gate
//!
//! Turns a vulnerability scan into a pass/block decision. A block is reported
//! as the scanning stage's failure, so it propagates through the scheduler like
//! any other failed stage.

mod report;

pub use report::{Finding, ScanReport};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Vulnerability severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Parse a scanner severity label; unrecognised labels map to `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "low" | "negligible" => Self::Low,
            "medium" | "moderate" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "UNKNOWN"),
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::from_label(s) {
            Self::Unknown if !s.eq_ignore_ascii_case("unknown") => {
                Err(format!("Unknown severity: {}", s))
            }
            severity => Ok(severity),
        }
    }
}

/// Summarised scanner output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    /// Number of findings per severity
    pub severity_counts: BTreeMap<Severity, u32>,
    /// Counts include only findings with an available fix
    pub fixable_only: bool,
}

impl ScanResult {
    pub fn count(&self, severity: Severity) -> u32 {
        self.severity_counts.get(&severity).copied().unwrap_or(0)
    }

    /// Counts at or above `threshold`, zero entries dropped
    pub fn at_or_above(&self, threshold: Severity) -> BTreeMap<Severity, u32> {
        self.severity_counts
            .range(threshold..)
            .filter(|(_, count)| **count > 0)
            .map(|(s, c)| (*s, *c))
            .collect()
    }
}

/// Severity policy applied to a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatePolicy {
    /// Lowest severity that blocks
    pub threshold: Severity,
    /// Ignore findings that have no fix available
    pub fixable_only: bool,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            threshold: Severity::High,
            fixable_only: true,
        }
    }
}

/// Gate decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateDecision {
    Pass,
    Block,
}

/// Decision plus the findings that caused it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateVerdict {
    pub decision: GateDecision,
    /// Counts at or above the threshold (empty on pass)
    pub blocking: BTreeMap<Severity, u32>,
    pub message: String,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.decision == GateDecision::Pass
    }
}

/// Evaluates scan results against a policy
pub struct GateEvaluator;

impl GateEvaluator {
    /// Block when any counted finding is at or above the policy threshold
    ///
    /// When the policy tracks fixable findings only, the result must have been
    /// summarised the same way (see [`ScanReport::summarize`]); counts from an
    /// unfiltered result are taken at face value.
    pub fn evaluate(result: &ScanResult, policy: &GatePolicy) -> GateVerdict {
        let blocking = result.at_or_above(policy.threshold);

        if blocking.is_empty() {
            return GateVerdict {
                decision: GateDecision::Pass,
                blocking,
                message: format!("No findings at or above {}", policy.threshold),
            };
        }

        let summary = blocking
            .iter()
            .rev()
            .map(|(severity, count)| format!("{} {}", count, severity))
            .collect::<Vec<_>>()
            .join(", ");
        let qualifier = if result.fixable_only { "fixable " } else { "" };

        GateVerdict {
            decision: GateDecision::Block,
            blocking,
            message: format!("{}{} finding(s): {}", qualifier, policy.threshold, summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(counts: &[(Severity, u32)], fixable_only: bool) -> ScanResult {
        ScanResult {
            severity_counts: counts.iter().copied().collect(),
            fixable_only,
        }
    }

    #[test]
    fn test_critical_fixable_blocks() {
        let verdict = GateEvaluator::evaluate(
            &result(&[(Severity::Critical, 1)], true),
            &GatePolicy::default(),
        );
        assert_eq!(verdict.decision, GateDecision::Block);
        assert_eq!(verdict.blocking.get(&Severity::Critical), Some(&1));
        assert!(verdict.message.contains("1 CRITICAL"));
    }

    #[test]
    fn test_high_blocks() {
        let verdict = GateEvaluator::evaluate(
            &result(&[(Severity::High, 3), (Severity::Low, 9)], true),
            &GatePolicy::default(),
        );
        assert!(!verdict.passed());
        assert!(!verdict.blocking.contains_key(&Severity::Low));
    }

    #[test]
    fn test_no_high_or_critical_passes() {
        let verdict = GateEvaluator::evaluate(
            &result(&[(Severity::Medium, 12), (Severity::Low, 40)], true),
            &GatePolicy::default(),
        );
        assert!(verdict.passed());
        assert!(verdict.blocking.is_empty());
    }

    #[test]
    fn test_zero_counts_pass() {
        let verdict = GateEvaluator::evaluate(
            &result(&[(Severity::Critical, 0), (Severity::High, 0)], true),
            &GatePolicy::default(),
        );
        assert!(verdict.passed());
    }

    #[test]
    fn test_empty_result_passes() {
        let verdict = GateEvaluator::evaluate(&ScanResult::default(), &GatePolicy::default());
        assert!(verdict.passed());
    }

    #[test]
    fn test_critical_threshold_ignores_high() {
        let policy = GatePolicy {
            threshold: Severity::Critical,
            fixable_only: true,
        };
        let verdict = GateEvaluator::evaluate(&result(&[(Severity::High, 5)], true), &policy);
        assert!(verdict.passed());
    }

    #[test]
    fn test_severity_ordering_and_parsing() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!(Severity::from_label("moderate"), Severity::Medium);
        assert!("severe".parse::<Severity>().is_err());
    }
}
