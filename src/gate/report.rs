// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 shipline contributors

//! Scanner report parsing
//!
//! Accepts Trivy-style JSON (`Results[].Vulnerabilities[]`) or the native
//! `{"findings": [...]}` shape.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use super::{ScanResult, Severity};
use crate::errors::{ShiplineError, ShiplineResult};

/// One vulnerability finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    #[serde(deserialize_with = "severity_label")]
    pub severity: Severity,
    /// Version that fixes the finding, if one exists
    #[serde(default)]
    pub fixed_version: Option<String>,
}

impl Finding {
    pub fn is_fixable(&self) -> bool {
        self.fixed_version
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty())
    }
}

/// Scanners disagree on casing, so any label goes through `from_label`
fn severity_label<'de, D>(deserializer: D) -> Result<Severity, D::Error>
where
    D: Deserializer<'de>,
{
    let label = String::deserialize(deserializer)?;
    Ok(Severity::from_label(&label))
}

/// Raw findings from one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub findings: Vec<Finding>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyReport {
    #[serde(default)]
    results: Vec<TrivyTarget>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TrivyTarget {
    #[serde(default)]
    vulnerabilities: Option<Vec<TrivyVulnerability>>,
}

#[derive(Deserialize)]
struct TrivyVulnerability {
    #[serde(rename = "VulnerabilityID", default)]
    id: String,
    #[serde(rename = "Severity", default)]
    severity: String,
    #[serde(rename = "FixedVersion", default)]
    fixed_version: Option<String>,
}

impl ScanReport {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self { findings }
    }

    /// Parse a report from JSON text
    pub fn from_json(json: &str) -> ShiplineResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;

        if value.get("findings").is_some() {
            return serde_json::from_value(value).map_err(Into::into);
        }

        let trivy: TrivyReport = serde_json::from_value(value)?;
        let findings = trivy
            .results
            .into_iter()
            .flat_map(|t| t.vulnerabilities.unwrap_or_default())
            .map(|v| Finding {
                id: v.id,
                severity: Severity::from_label(&v.severity),
                fixed_version: v.fixed_version,
            })
            .collect();

        Ok(Self { findings })
    }

    /// Read and parse a report file
    pub fn from_file(path: &Path) -> ShiplineResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ShiplineError::ScanReport {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::from_json(&content).map_err(|e| ShiplineError::ScanReport {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Count findings per severity, optionally only those with a fix
    pub fn summarize(&self, fixable_only: bool) -> ScanResult {
        let mut result = ScanResult {
            fixable_only,
            ..ScanResult::default()
        };

        for finding in &self.findings {
            if fixable_only && !finding.is_fixable() {
                continue;
            }
            *result.severity_counts.entry(finding.severity).or_insert(0) += 1;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIVY: &str = r#"{
        "SchemaVersion": 2,
        "ArtifactName": "image.tar",
        "Results": [
            {
                "Target": "debian 12",
                "Vulnerabilities": [
                    {"VulnerabilityID": "CVE-2024-0001", "Severity": "CRITICAL", "FixedVersion": "1.2.3"},
                    {"VulnerabilityID": "CVE-2024-0002", "Severity": "HIGH", "FixedVersion": ""},
                    {"VulnerabilityID": "CVE-2024-0003", "Severity": "LOW"}
                ]
            },
            { "Target": "app", "Vulnerabilities": null }
        ]
    }"#;

    #[test]
    fn test_parse_trivy_report() {
        let report = ScanReport::from_json(TRIVY).unwrap();
        assert_eq!(report.findings.len(), 3);
        assert_eq!(report.findings[0].severity, Severity::Critical);
        assert!(report.findings[0].is_fixable());
        assert!(!report.findings[1].is_fixable());
    }

    #[test]
    fn test_native_report_accepts_any_casing() {
        let report = ScanReport::from_json(
            r#"{"findings":[
                {"id":"CVE-1","severity":"CRITICAL","fixed_version":"1.2"},
                {"id":"CVE-2","severity":"High"},
                {"id":"CVE-3","severity":"weird"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(report.findings[0].severity, Severity::Critical);
        assert_eq!(report.findings[1].severity, Severity::High);
        assert_eq!(report.findings[2].severity, Severity::Unknown);
        assert_eq!(report.summarize(true).count(Severity::Critical), 1);
    }

    #[test]
    fn test_summarize_fixable_only() {
        let report = ScanReport::from_json(TRIVY).unwrap();

        let fixable = report.summarize(true);
        assert!(fixable.fixable_only);
        assert_eq!(fixable.count(Severity::Critical), 1);
        assert_eq!(fixable.count(Severity::High), 0);
        assert_eq!(fixable.count(Severity::Low), 0);

        let all = report.summarize(false);
        assert_eq!(all.count(Severity::High), 1);
        assert_eq!(all.count(Severity::Low), 1);
    }

    #[test]
    fn test_parse_native_report() {
        let json = r#"{"findings": [{"id": "GHSA-1", "severity": "high", "fixed_version": "2.0"}]}"#;
        let report = ScanReport::from_json(json).unwrap();
        assert_eq!(report.findings[0].severity, Severity::High);
    }

    #[test]
    fn test_empty_trivy_report() {
        let report = ScanReport::from_json(r#"{"SchemaVersion": 2}"#).unwrap();
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let err = ScanReport::from_file(Path::new("/nonexistent/report.json")).unwrap_err();
        assert!(matches!(err, ShiplineError::ScanReport { .. }));
    }
}
