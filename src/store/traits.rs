//! GraphStore trait definition
//!
//! Abstract interface of the versioned structure graph. Keyed nodes
//! (repository, branch, commit, tag, application, trace, span) are created
//! through `merge_*`, which returns the canonical stored node when another
//! writer got there first. Unkeyed nodes (directories, files, classes,
//! functions) are written through `save_*`.
//!
//! `save_*` updates properties. Relationship sets are only ever extended:
//! the stored sets are unioned with the ones on the saved node, so a save
//! built from a stale read never drops an edge merged in the meantime.

use crate::store::models::*;
use anyhow::Result;
use async_trait::async_trait;

/// Typed containment/reference edges between nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    RepositoryCommit,
    RepositoryBranch,
    CommitParent,
    CommitFile,
    CommitTag,
    /// Also sets the child's parent back-reference
    DirectorySubdirectory,
    /// Also sets the file's parent back-reference
    DirectoryFile,
    FileClass,
    FileFunction,
    ClassFunction,
    ClassInnerClass,
    ClassSuperClass,
    TraceSpan,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Allocate a fresh node id
    fn allocate_id(&self) -> NodeId;

    // ========================================================================
    // Repository operations
    // ========================================================================

    /// Insert a repository unless one with the same (token, name) exists
    async fn merge_repository(&self, repository: RepositoryNode) -> Result<RepositoryNode>;

    async fn get_repository(&self, id: NodeId) -> Result<Option<RepositoryNode>>;

    async fn find_repository(&self, token: &str, name: &str) -> Result<Option<RepositoryNode>>;

    /// All repositories of a landscape, ordered by name
    async fn list_repositories(&self, token: &str) -> Result<Vec<RepositoryNode>>;

    /// The repository whose commit set contains the commit
    async fn find_repository_of_commit(&self, commit: NodeId) -> Result<Option<RepositoryNode>>;

    // ========================================================================
    // Branch operations
    // ========================================================================

    /// Insert a branch unless one with the same (repository, name) exists
    async fn merge_branch(&self, branch: BranchNode) -> Result<BranchNode>;

    async fn get_branch(&self, id: NodeId) -> Result<Option<BranchNode>>;

    async fn find_branch(&self, repository: NodeId, name: &str) -> Result<Option<BranchNode>>;

    // ========================================================================
    // Commit operations
    // ========================================================================

    /// Insert a commit unless one with the same (token, hash) exists
    async fn merge_commit(&self, commit: CommitNode) -> Result<CommitNode>;

    async fn save_commit(&self, commit: &CommitNode) -> Result<()>;

    async fn get_commit(&self, id: NodeId) -> Result<Option<CommitNode>>;

    async fn find_commit(&self, token: &str, hash: &str) -> Result<Option<CommitNode>>;

    // ========================================================================
    // Tag operations
    // ========================================================================

    /// Insert a tag unless one with the same name exists
    async fn merge_tag(&self, tag: TagNode) -> Result<TagNode>;

    async fn get_tag(&self, id: NodeId) -> Result<Option<TagNode>>;

    // ========================================================================
    // Directory & file operations
    // ========================================================================

    async fn save_directory(&self, directory: &DirectoryNode) -> Result<()>;

    async fn get_directory(&self, id: NodeId) -> Result<Option<DirectoryNode>>;

    async fn save_file(&self, file: &FileRevisionNode) -> Result<()>;

    async fn get_file(&self, id: NodeId) -> Result<Option<FileRevisionNode>>;

    /// File revisions with the given content hash contained in any commit of
    /// the repository, ordered by id
    async fn find_files_by_hash(
        &self,
        repository: NodeId,
        hash: &str,
    ) -> Result<Vec<FileRevisionNode>>;

    // ========================================================================
    // Class & function operations
    // ========================================================================

    async fn save_class(&self, class: &ClazzNode) -> Result<()>;

    async fn get_class(&self, id: NodeId) -> Result<Option<ClazzNode>>;

    async fn save_function(&self, function: &FunctionNode) -> Result<()>;

    async fn get_function(&self, id: NodeId) -> Result<Option<FunctionNode>>;

    /// A function with the given FQN referenced by a span of the landscape
    async fn find_traced_function(&self, token: &str, fqn: &str) -> Result<Option<FunctionNode>>;

    // ========================================================================
    // Application operations
    // ========================================================================

    /// Insert an application unless one with the same (token, name) exists
    async fn merge_application(&self, application: ApplicationNode) -> Result<ApplicationNode>;

    async fn save_application(&self, application: &ApplicationNode) -> Result<()>;

    async fn find_application(&self, token: &str, name: &str)
        -> Result<Option<ApplicationNode>>;

    async fn list_applications(&self, token: &str) -> Result<Vec<ApplicationNode>>;

    // ========================================================================
    // Trace & span operations
    // ========================================================================

    /// Insert a trace unless one with the same (token, trace id) exists
    async fn merge_trace(&self, trace: TraceNode) -> Result<TraceNode>;

    async fn save_trace(&self, trace: &TraceNode) -> Result<()>;

    async fn find_trace(&self, token: &str, trace_id: &str) -> Result<Option<TraceNode>>;

    async fn list_traces(&self, token: &str) -> Result<Vec<TraceNode>>;

    /// Insert a span unless one with the same (token, span id) exists
    async fn merge_span(&self, span: SpanNode) -> Result<SpanNode>;

    async fn save_span(&self, span: &SpanNode) -> Result<()>;

    async fn get_span(&self, id: NodeId) -> Result<Option<SpanNode>>;

    async fn find_span(&self, token: &str, span_id: &str) -> Result<Option<SpanNode>>;

    // ========================================================================
    // Edges & durability
    // ========================================================================

    /// Merge an edge. Returns true if it did not exist yet.
    /// Fails if either endpoint is unknown.
    async fn merge_edge(&self, relation: Relation, from: NodeId, to: NodeId) -> Result<bool>;

    /// Make all writes so far durable
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}
