//! Graph node models for the versioned structure store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Identity & copy-on-write sets
// ============================================================================

/// Stable arena identifier of a node. Allocated once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Relationship set with copy-on-write semantics.
///
/// Inserting never mutates the shared set: a new set is built and swapped in,
/// so any [`CowSet::snapshot`] handed out earlier stays unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CowSet<T: Ord>(Arc<BTreeSet<T>>);

impl<T: Ord + Clone> CowSet<T> {
    pub fn new() -> Self {
        Self(Arc::new(BTreeSet::new()))
    }

    /// Add a value. Returns false (and keeps the current set) if already present.
    pub fn insert(&mut self, value: T) -> bool {
        if self.0.contains(&value) {
            return false;
        }
        let mut next = (*self.0).clone();
        next.insert(value);
        self.0 = Arc::new(next);
        true
    }

    /// Union with another set, swapping in a single new set if anything is missing.
    pub fn merge_from(&mut self, other: &CowSet<T>) {
        if Arc::ptr_eq(&self.0, &other.0) || other.0.is_subset(&self.0) {
            return;
        }
        let mut next = (*self.0).clone();
        next.extend(other.0.iter().cloned());
        self.0 = Arc::new(next);
    }

    pub fn contains(&self, value: &T) -> bool {
        self.0.contains(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The current immutable set.
    pub fn snapshot(&self) -> Arc<BTreeSet<T>> {
        Arc::clone(&self.0)
    }
}

impl<T: Ord + Clone> Default for CowSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone> FromIterator<T> for CowSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl<T: Ord + Serialize> Serialize for CowSet<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.as_ref().serialize(serializer)
    }
}

impl<'de, T: Ord + Deserialize<'de>> Deserialize<'de> for CowSet<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeSet::<T>::deserialize(deserializer).map(|set| CowSet(Arc::new(set)))
    }
}

/// Named numeric metrics (loc, cyclomatic complexity, ...)
pub type Metrics = BTreeMap<String, f64>;

// ============================================================================
// Enums
// ============================================================================

/// Source language of a file revision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Language {
    Java,
    Javascript,
    Typescript,
    Python,
    Plaintext,
    #[default]
    #[serde(rename = "LANGUAGE_UNSPECIFIED", alias = "UNSPECIFIED")]
    Unspecified,
}

/// Kind of a class-like declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassType {
    Class,
    AbstractClass,
    Interface,
    Enum,
    Record,
    #[default]
    Unspecified,
}

// ============================================================================
// Source-control nodes
// ============================================================================

/// A source repository, scoped to a landscape token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryNode {
    pub id: NodeId,
    pub token: String,
    pub name: String,
    /// Directory named after the repository; every tracked path hangs below it
    pub root_directory: NodeId,
    #[serde(default)]
    pub commits: CowSet<NodeId>,
    #[serde(default)]
    pub branches: CowSet<NodeId>,
}

impl RepositoryNode {
    pub fn new(id: NodeId, token: &str, name: &str, root_directory: NodeId) -> Self {
        Self {
            id,
            token: token.to_string(),
            name: name.to_string(),
            root_directory,
            commits: CowSet::new(),
            branches: CowSet::new(),
        }
    }
}

/// A branch, scoped to its repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchNode {
    pub id: NodeId,
    pub name: String,
    pub repository: NodeId,
}

/// A commit, keyed by hash within a landscape token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitNode {
    pub id: NodeId,
    pub token: String,
    pub hash: String,
    pub author: Option<String>,
    pub author_date: Option<DateTime<Utc>>,
    pub commit_date: Option<DateTime<Utc>>,
    pub branch: Option<NodeId>,
    #[serde(default)]
    pub parents: CowSet<NodeId>,
    #[serde(default)]
    pub file_revisions: CowSet<NodeId>,
    #[serde(default)]
    pub tags: CowSet<NodeId>,
}

impl CommitNode {
    pub fn new(id: NodeId, token: &str, hash: &str) -> Self {
        Self {
            id,
            token: token.to_string(),
            hash: hash.to_string(),
            author: None,
            author_date: None,
            commit_date: None,
            branch: None,
            parents: CowSet::new(),
            file_revisions: CowSet::new(),
            tags: CowSet::new(),
        }
    }
}

/// A named tag attached to commits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagNode {
    pub id: NodeId,
    pub name: String,
}

// ============================================================================
// File tree nodes
// ============================================================================

/// A directory in a repository or application tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub subdirectories: CowSet<NodeId>,
    #[serde(default)]
    pub file_revisions: CowSet<NodeId>,
    /// Set by the store together with the containment edge
    pub parent: Option<NodeId>,
}

impl DirectoryNode {
    pub fn new(id: NodeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            subdirectories: CowSet::new(),
            file_revisions: CowSet::new(),
            parent: None,
        }
    }
}

/// One revision of a file, identified by content hash and path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRevisionNode {
    pub id: NodeId,
    /// Content hash; absent for files discovered only through traces
    pub hash: Option<String>,
    pub name: String,
    #[serde(default)]
    pub has_file_data: bool,
    #[serde(default)]
    pub language: Language,
    pub package_name: Option<String>,
    #[serde(default)]
    pub import_names: CowSet<String>,
    #[serde(default)]
    pub metrics: Metrics,
    pub last_editor: Option<String>,
    #[serde(default)]
    pub added_lines: u32,
    #[serde(default)]
    pub modified_lines: u32,
    #[serde(default)]
    pub deleted_lines: u32,
    #[serde(default)]
    pub classes: CowSet<NodeId>,
    #[serde(default)]
    pub functions: CowSet<NodeId>,
    /// Set by the store together with the containment edge
    pub parent: Option<NodeId>,
}

impl FileRevisionNode {
    pub fn new(id: NodeId, name: &str) -> Self {
        Self {
            id,
            hash: None,
            name: name.to_string(),
            has_file_data: false,
            language: Language::Unspecified,
            package_name: None,
            import_names: CowSet::new(),
            metrics: Metrics::new(),
            last_editor: None,
            added_lines: 0,
            modified_lines: 0,
            deleted_lines: 0,
            classes: CowSet::new(),
            functions: CowSet::new(),
            parent: None,
        }
    }
}

// ============================================================================
// Code structure nodes
// ============================================================================

/// A class, interface, enum or record declared in a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClazzNode {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub class_type: ClassType,
    #[serde(default)]
    pub modifiers: CowSet<String>,
    #[serde(default)]
    pub implemented_interfaces: CowSet<String>,
    #[serde(default)]
    pub annotations: CowSet<String>,
    #[serde(default)]
    pub enum_values: CowSet<String>,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub functions: CowSet<NodeId>,
    #[serde(default)]
    pub fields: CowSet<FieldValue>,
    #[serde(default)]
    pub inner_classes: CowSet<NodeId>,
    #[serde(default)]
    pub super_classes: CowSet<NodeId>,
}

impl ClazzNode {
    pub fn new(id: NodeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            class_type: ClassType::Unspecified,
            modifiers: CowSet::new(),
            implemented_interfaces: CowSet::new(),
            annotations: CowSet::new(),
            enum_values: CowSet::new(),
            metrics: Metrics::new(),
            functions: CowSet::new(),
            fields: CowSet::new(),
            inner_classes: CowSet::new(),
            super_classes: CowSet::new(),
        }
    }
}

/// A function or method
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionNode {
    pub id: NodeId,
    pub name: String,
    /// Fully-qualified name, recorded for functions discovered through traces
    pub fqn: Option<String>,
    pub return_type: Option<String>,
    #[serde(default)]
    pub is_constructor: bool,
    #[serde(default)]
    pub annotations: CowSet<String>,
    #[serde(default)]
    pub modifiers: CowSet<String>,
    #[serde(default)]
    pub outgoing_calls: CowSet<String>,
    #[serde(default)]
    pub metrics: Metrics,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub end_line: u32,
    #[serde(default)]
    pub parameters: CowSet<ParameterValue>,
}

impl FunctionNode {
    pub fn new(id: NodeId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            fqn: None,
            return_type: None,
            is_constructor: false,
            annotations: CowSet::new(),
            modifiers: CowSet::new(),
            outgoing_calls: CowSet::new(),
            metrics: Metrics::new(),
            start_line: 0,
            end_line: 0,
            parameters: CowSet::new(),
        }
    }
}

/// A function parameter (value record, stored inside its function)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParameterValue {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

/// A class field (value record, stored inside its class)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldValue {
    pub name: String,
    pub type_name: String,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

// ============================================================================
// Runtime nodes
// ============================================================================

/// A deployed application, rooted at a directory of a repository tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationNode {
    pub id: NodeId,
    pub token: String,
    pub name: String,
    pub root_directory: NodeId,
    pub repository: Option<NodeId>,
}

/// A distributed trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceNode {
    pub id: NodeId,
    pub token: String,
    pub trace_id: String,
    /// Epoch nanoseconds of the earliest span
    pub start_time: i64,
    /// Epoch nanoseconds of the latest span end
    pub end_time: i64,
    #[serde(default)]
    pub spans: CowSet<NodeId>,
}

/// A single recorded call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanNode {
    pub id: NodeId,
    pub token: String,
    pub span_id: String,
    pub start_time: i64,
    pub end_time: i64,
    pub parent_span: Option<NodeId>,
    pub function: Option<NodeId>,
    pub application: Option<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cow_set_snapshot_is_not_affected_by_insert() {
        let mut set = CowSet::new();
        set.insert(NodeId(1));
        let before = set.snapshot();

        assert!(set.insert(NodeId(2)));
        assert_eq!(before.len(), 1);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_cow_set_duplicate_insert_keeps_set() {
        let mut set = CowSet::new();
        set.insert("a".to_string());
        let before = set.snapshot();

        assert!(!set.insert("a".to_string()));
        assert!(Arc::ptr_eq(&before, &set.snapshot()));
    }

    #[test]
    fn test_cow_set_serializes_as_sequence() {
        let set: CowSet<NodeId> = [NodeId(3), NodeId(1)].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "[1,3]");

        let back: CowSet<NodeId> = serde_json::from_str(&json).unwrap();
        assert!(back.contains(&NodeId(3)));
    }

    #[test]
    fn test_language_accepts_wire_names() {
        let lang: Language = serde_json::from_str("\"JAVA\"").unwrap();
        assert_eq!(lang, Language::Java);
        let lang: Language = serde_json::from_str("\"LANGUAGE_UNSPECIFIED\"").unwrap();
        assert_eq!(lang, Language::Unspecified);
        let lang: Language = serde_json::from_str("\"UNSPECIFIED\"").unwrap();
        assert_eq!(lang, Language::Unspecified);
    }

    #[test]
    fn test_unspecified_language_serializes_wire_name() {
        let json = serde_json::to_string(&Language::default()).unwrap();
        assert_eq!(json, "\"LANGUAGE_UNSPECIFIED\"");
        let back: Language = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Language::Unspecified);
    }
}
