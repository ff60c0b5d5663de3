//! Query selectors and response payloads

use crate::store::Metrics;
use crate::structure::{BranchView, StructureError, StructureResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which commits a structure query projects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureSelector {
    /// Newest commit of every repository
    Latest,
    Commit(String),
    /// Union of two commits, e.g. `abc-def`
    Compare(String, String),
}

impl StructureSelector {
    /// Parse `h` or `h1-h2`.
    pub fn parse(commits: &str) -> StructureResult<Self> {
        let commits = commits.trim();
        if commits.is_empty() {
            return Err(StructureError::InvalidArgument(
                "commit selector must not be empty".to_string(),
            ));
        }
        match commits.split_once('-') {
            Some((first, second)) if !first.is_empty() && !second.is_empty() => {
                Ok(Self::Compare(first.to_string(), second.to_string()))
            }
            Some(_) => Err(StructureError::InvalidArgument(format!(
                "malformed commit range: {}",
                commits
            ))),
            None => Ok(Self::Commit(commits.to_string())),
        }
    }

    pub fn hashes(&self) -> Vec<&str> {
        match self {
            Self::Latest => Vec::new(),
            Self::Commit(hash) => vec![hash.as_str()],
            Self::Compare(first, second) if first == second => vec![first.as_str()],
            Self::Compare(first, second) => vec![first.as_str(), second.as_str()],
        }
    }
}

/// Branches of the repository an application lives in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationCommitTree {
    pub name: String,
    pub branches: Vec<BranchView>,
}

/// Start of a trace and how many spans it holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamp {
    pub epoch_nano: i64,
    pub span_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitSummary {
    pub hash: String,
    pub repository_name: String,
    pub branch_name: String,
    pub author: Option<String>,
    pub commit_date: Option<DateTime<Utc>>,
    pub file_count: usize,
    pub tags: Vec<String>,
}

// ============================================================================
// Code metrics
// ============================================================================

/// Rendered in place of a metric the analysis did not report
pub const UNKNOWN_METRIC: &str = "UNKNOWN";

fn metric(metrics: &Metrics, key: &str) -> String {
    metrics
        .get(key)
        .map_or_else(|| UNKNOWN_METRIC.to_string(), |value| value.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub loc: String,
    pub cyclomatic_complexity: String,
}

impl From<&Metrics> for FileMetrics {
    fn from(metrics: &Metrics) -> Self {
        Self {
            loc: metric(metrics, "loc"),
            cyclomatic_complexity: metric(metrics, "cyclomatic_complexity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub loc: String,
    #[serde(rename = "LCOM4")]
    pub lcom4: String,
    pub cyclomatic_complexity_weighted: String,
    pub cyclomatic_complexity: String,
}

impl From<&Metrics> for ClassMetrics {
    fn from(metrics: &Metrics) -> Self {
        Self {
            loc: metric(metrics, "loc"),
            lcom4: metric(metrics, "LCOM4"),
            cyclomatic_complexity_weighted: metric(metrics, "cyclomatic_complexity_weighted"),
            cyclomatic_complexity: metric(metrics, "cyclomatic_complexity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodMetrics {
    pub loc: String,
    #[serde(rename = "nestedBlockDepth")]
    pub nested_block_depth: String,
    pub cyclomatic_complexity: String,
}

impl From<&Metrics> for MethodMetrics {
    fn from(metrics: &Metrics) -> Self {
        Self {
            loc: metric(metrics, "loc"),
            nested_block_depth: metric(metrics, "nestedBlockDepth"),
            cyclomatic_complexity: metric(metrics, "cyclomatic_complexity"),
        }
    }
}

/// Metrics of one application at one commit.
///
/// Keys are `/`-joined node paths below the application root: `src/A.java`
/// for a file, `src/A.java/A` for a class (inner classes append their own
/// name) and the owner's key plus `/run` for a function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationMetrics {
    pub file_metrics: BTreeMap<String, FileMetrics>,
    pub class_metrics: BTreeMap<String, ClassMetrics>,
    pub method_metrics: BTreeMap<String, MethodMetrics>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector() {
        assert_eq!(
            StructureSelector::parse("abc").unwrap(),
            StructureSelector::Commit("abc".to_string())
        );
        assert_eq!(
            StructureSelector::parse("abc-def").unwrap(),
            StructureSelector::Compare("abc".to_string(), "def".to_string())
        );
        assert!(StructureSelector::parse("abc-").is_err());
        assert!(StructureSelector::parse("").is_err());
    }

    #[test]
    fn test_compare_same_commit_loads_once() {
        let selector = StructureSelector::Compare("a".to_string(), "a".to_string());
        assert_eq!(selector.hashes(), vec!["a"]);
    }

    #[test]
    fn test_timestamp_serializes_camel_case() {
        let json = serde_json::to_value(Timestamp {
            epoch_nano: 5,
            span_count: 2,
        })
        .unwrap();
        assert_eq!(json["epochNano"], 5);
        assert_eq!(json["spanCount"], 2);
    }

    #[test]
    fn test_missing_metrics_render_unknown() {
        let mut metrics = Metrics::new();
        metrics.insert("loc".to_string(), 42.0);
        metrics.insert("LCOM4".to_string(), 1.5);

        let json = serde_json::to_value(ClassMetrics::from(&metrics)).unwrap();
        assert_eq!(json["loc"], "42");
        assert_eq!(json["LCOM4"], "1.5");
        assert_eq!(json["cyclomatic_complexity"], UNKNOWN_METRIC);

        let json = serde_json::to_value(MethodMetrics::from(&Metrics::new())).unwrap();
        assert_eq!(json["nestedBlockDepth"], UNKNOWN_METRIC);
    }
}
