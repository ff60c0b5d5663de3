//! Ingestion fact payloads

use crate::store::{ClassType, Language, Metrics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Announces a repository, its current branch and where applications live in it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryState {
    pub landscape_token: String,
    /// Upstream name; only the last `/` segment is kept
    pub repository_name: String,
    pub branch_name: String,
    /// Application name -> directory path inside the repository ("" = root)
    #[serde(default)]
    pub application_paths: BTreeMap<String, String>,
}

/// Reply to a [`RepositoryState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryStateResponse {
    pub branch_name: String,
    /// Latest fully ingested commit of the branch, empty if none
    pub commit_id: String,
}

/// Content hash plus repository-relative path of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIdentifier {
    pub hash: String,
    pub path: String,
}

impl FileIdentifier {
    pub fn new(hash: &str, path: &str) -> Self {
        Self {
            hash: hash.to_string(),
            path: path.to_string(),
        }
    }
}

/// One commit with its file changes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitFact {
    pub landscape_token: String,
    pub repository_name: String,
    #[serde(default)]
    pub branch_name: String,
    pub commit_hash: String,
    /// Empty or `NONE` for root commits
    #[serde(default)]
    pub parent_commit_hash: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commit_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub added_files: Vec<FileIdentifier>,
    #[serde(default)]
    pub modified_files: Vec<FileIdentifier>,
    #[serde(default)]
    pub unchanged_files: Vec<FileIdentifier>,
}

/// Static-analysis details of every file revision with a given hash
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileDetailFact {
    pub landscape_token: String,
    pub repository_name: String,
    pub file_hash: String,
    pub language: Language,
    pub package_name: Option<String>,
    pub import_names: Vec<String>,
    pub metrics: Metrics,
    pub last_editor: Option<String>,
    pub added_lines: u32,
    pub modified_lines: u32,
    pub deleted_lines: u32,
    pub classes: Vec<ClassData>,
    pub functions: Vec<FunctionData>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassData {
    /// Fully-qualified class name
    pub name: String,
    #[serde(rename = "type")]
    pub class_type: ClassType,
    pub modifiers: Vec<String>,
    pub implemented_interfaces: Vec<String>,
    pub annotations: Vec<String>,
    pub enum_values: Vec<String>,
    pub super_classes: Vec<String>,
    pub fields: Vec<FieldData>,
    pub inner_classes: Vec<ClassData>,
    pub functions: Vec<FunctionData>,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FunctionData {
    pub name: String,
    pub return_type: Option<String>,
    pub is_constructor: bool,
    pub annotations: Vec<String>,
    pub modifiers: Vec<String>,
    pub outgoing_method_calls: Vec<String>,
    pub parameters: Vec<ParameterData>,
    pub start_line: u32,
    pub end_line: u32,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterData {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldData {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub modifiers: Vec<String>,
}

/// One recorded call of an instrumented application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanFact {
    pub landscape_token: String,
    pub application_name: String,
    pub trace_id: String,
    pub span_id: String,
    #[serde(default)]
    pub parent_span_id: Option<String>,
    /// e.g. `net.example.app.MyClass.myMethod`
    pub function_fqn: String,
    /// Epoch nanoseconds
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub commit_id: Option<String>,
}
