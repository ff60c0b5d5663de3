//! In-memory arena implementation of GraphStore.
//!
//! Every node kind lives in its own `tokio::sync::RwLock<BTreeMap<NodeId, T>>`.
//! An operation touching two collections locks them in field declaration
//! order. The whole arena can be written to and restored from a JSON snapshot.

use crate::store::models::*;
use crate::store::traits::{GraphStore, Relation};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

/// Arena-backed graph store
pub struct MemoryGraphStore {
    next_id: AtomicU64,
    pub repositories: RwLock<BTreeMap<NodeId, RepositoryNode>>,
    pub branches: RwLock<BTreeMap<NodeId, BranchNode>>,
    pub commits: RwLock<BTreeMap<NodeId, CommitNode>>,
    pub tags: RwLock<BTreeMap<NodeId, TagNode>>,
    pub directories: RwLock<BTreeMap<NodeId, DirectoryNode>>,
    pub files: RwLock<BTreeMap<NodeId, FileRevisionNode>>,
    pub classes: RwLock<BTreeMap<NodeId, ClazzNode>>,
    pub functions: RwLock<BTreeMap<NodeId, FunctionNode>>,
    pub applications: RwLock<BTreeMap<NodeId, ApplicationNode>>,
    pub traces: RwLock<BTreeMap<NodeId, TraceNode>>,
    pub spans: RwLock<BTreeMap<NodeId, SpanNode>>,
    snapshot_path: Option<PathBuf>,
    /// Held for the whole snapshot write; flushes share one temporary file
    persist_lock: Mutex<()>,
}

/// Serializable image of the whole arena
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub next_id: u64,
    #[serde(default)]
    pub repositories: Vec<RepositoryNode>,
    #[serde(default)]
    pub branches: Vec<BranchNode>,
    #[serde(default)]
    pub commits: Vec<CommitNode>,
    #[serde(default)]
    pub tags: Vec<TagNode>,
    #[serde(default)]
    pub directories: Vec<DirectoryNode>,
    #[serde(default)]
    pub files: Vec<FileRevisionNode>,
    #[serde(default)]
    pub classes: Vec<ClazzNode>,
    #[serde(default)]
    pub functions: Vec<FunctionNode>,
    #[serde(default)]
    pub applications: Vec<ApplicationNode>,
    #[serde(default)]
    pub traces: Vec<TraceNode>,
    #[serde(default)]
    pub spans: Vec<SpanNode>,
}

/// Node counts per kind
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub repositories: usize,
    pub branches: usize,
    pub commits: usize,
    pub tags: usize,
    pub directories: usize,
    pub files: usize,
    pub classes: usize,
    pub functions: usize,
    pub applications: usize,
    pub traces: usize,
    pub spans: usize,
}

fn index<T>(nodes: Vec<T>, id: impl Fn(&T) -> NodeId) -> BTreeMap<NodeId, T> {
    nodes.into_iter().map(|n| (id(&n), n)).collect()
}

async fn ensure_exists<T: Send + Sync>(
    map: &RwLock<BTreeMap<NodeId, T>>,
    id: NodeId,
    kind: &str,
) -> Result<()> {
    if map.read().await.contains_key(&id) {
        Ok(())
    } else {
        bail!("{} {} not found", kind, id)
    }
}

fn link<T>(
    map: &mut BTreeMap<NodeId, T>,
    from: NodeId,
    kind: &str,
    add: impl FnOnce(&mut T) -> bool,
) -> Result<bool> {
    match map.get_mut(&from) {
        Some(node) => Ok(add(node)),
        None => bail!("{} {} not found", kind, from),
    }
}

impl MemoryGraphStore {
    /// Create a new empty store without durability.
    pub fn new() -> Self {
        Self::from_snapshot(GraphSnapshot::default())
    }

    /// Rebuild a store from a snapshot image.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let GraphSnapshot {
            next_id,
            repositories,
            branches,
            commits,
            tags,
            directories,
            files,
            classes,
            functions,
            applications,
            traces,
            spans,
        } = snapshot;

        let store = Self {
            next_id: AtomicU64::new(next_id.max(1)),
            repositories: RwLock::new(index(repositories, |n| n.id)),
            branches: RwLock::new(index(branches, |n| n.id)),
            commits: RwLock::new(index(commits, |n| n.id)),
            tags: RwLock::new(index(tags, |n| n.id)),
            directories: RwLock::new(index(directories, |n| n.id)),
            files: RwLock::new(index(files, |n| n.id)),
            classes: RwLock::new(index(classes, |n| n.id)),
            functions: RwLock::new(index(functions, |n| n.id)),
            applications: RwLock::new(index(applications, |n| n.id)),
            traces: RwLock::new(index(traces, |n| n.id)),
            spans: RwLock::new(index(spans, |n| n.id)),
            snapshot_path: None,
            persist_lock: Mutex::new(()),
        };
        let highest = store.highest_id();
        store.next_id.fetch_max(highest + 1, Ordering::SeqCst);
        store
    }

    /// Open a store persisted at `path`. A missing file yields an empty store.
    /// Every [`GraphStore::flush`] rewrites the file.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut store = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
                tracing::info!("Loaded graph snapshot from {}", path.display());
                Self::from_snapshot(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No snapshot at {}, starting empty", path.display());
                Self::new()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read snapshot {}", path.display()))
            }
        };
        store.snapshot_path = Some(path);
        Ok(store)
    }

    // Ids are only read at construction, before the store is shared.
    fn highest_id(&self) -> u64 {
        fn max_key<T>(map: &RwLock<BTreeMap<NodeId, T>>) -> u64 {
            map.try_read()
                .ok()
                .and_then(|m| m.keys().next_back().map(|id| id.0))
                .unwrap_or(0)
        }
        [
            max_key(&self.repositories),
            max_key(&self.branches),
            max_key(&self.commits),
            max_key(&self.tags),
            max_key(&self.directories),
            max_key(&self.files),
            max_key(&self.classes),
            max_key(&self.functions),
            max_key(&self.applications),
            max_key(&self.traces),
            max_key(&self.spans),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    /// Capture the current contents.
    pub async fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            next_id: self.next_id.load(Ordering::SeqCst),
            repositories: self.repositories.read().await.values().cloned().collect(),
            branches: self.branches.read().await.values().cloned().collect(),
            commits: self.commits.read().await.values().cloned().collect(),
            tags: self.tags.read().await.values().cloned().collect(),
            directories: self.directories.read().await.values().cloned().collect(),
            files: self.files.read().await.values().cloned().collect(),
            classes: self.classes.read().await.values().cloned().collect(),
            functions: self.functions.read().await.values().cloned().collect(),
            applications: self.applications.read().await.values().cloned().collect(),
            traces: self.traces.read().await.values().cloned().collect(),
            spans: self.spans.read().await.values().cloned().collect(),
        }
    }

    /// Write a snapshot to `path` (via a temporary file and rename).
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.snapshot().await;
        let bytes = serde_json::to_vec(&snapshot)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        tracing::debug!("Persisted graph snapshot to {}", path.display());
        Ok(())
    }

    pub async fn stats(&self) -> StoreStats {
        StoreStats {
            repositories: self.repositories.read().await.len(),
            branches: self.branches.read().await.len(),
            commits: self.commits.read().await.len(),
            tags: self.tags.read().await.len(),
            directories: self.directories.read().await.len(),
            files: self.files.read().await.len(),
            classes: self.classes.read().await.len(),
            functions: self.functions.read().await.len(),
            applications: self.applications.read().await.len(),
            traces: self.traces.read().await.len(),
            spans: self.spans.read().await.len(),
        }
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    fn allocate_id(&self) -> NodeId {
        NodeId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    // ========================================================================
    // Repository operations
    // ========================================================================

    async fn merge_repository(&self, repository: RepositoryNode) -> Result<RepositoryNode> {
        let mut repositories = self.repositories.write().await;
        if let Some(existing) = repositories
            .values()
            .find(|r| r.token == repository.token && r.name == repository.name)
        {
            return Ok(existing.clone());
        }
        repositories.insert(repository.id, repository.clone());
        Ok(repository)
    }

    async fn get_repository(&self, id: NodeId) -> Result<Option<RepositoryNode>> {
        Ok(self.repositories.read().await.get(&id).cloned())
    }

    async fn find_repository(&self, token: &str, name: &str) -> Result<Option<RepositoryNode>> {
        Ok(self
            .repositories
            .read()
            .await
            .values()
            .find(|r| r.token == token && r.name == name)
            .cloned())
    }

    async fn list_repositories(&self, token: &str) -> Result<Vec<RepositoryNode>> {
        let mut repositories: Vec<RepositoryNode> = self
            .repositories
            .read()
            .await
            .values()
            .filter(|r| r.token == token)
            .cloned()
            .collect();
        repositories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(repositories)
    }

    async fn find_repository_of_commit(&self, commit: NodeId) -> Result<Option<RepositoryNode>> {
        Ok(self
            .repositories
            .read()
            .await
            .values()
            .find(|r| r.commits.contains(&commit))
            .cloned())
    }

    // ========================================================================
    // Branch operations
    // ========================================================================

    async fn merge_branch(&self, branch: BranchNode) -> Result<BranchNode> {
        let mut branches = self.branches.write().await;
        if let Some(existing) = branches
            .values()
            .find(|b| b.repository == branch.repository && b.name == branch.name)
        {
            return Ok(existing.clone());
        }
        branches.insert(branch.id, branch.clone());
        Ok(branch)
    }

    async fn get_branch(&self, id: NodeId) -> Result<Option<BranchNode>> {
        Ok(self.branches.read().await.get(&id).cloned())
    }

    async fn find_branch(&self, repository: NodeId, name: &str) -> Result<Option<BranchNode>> {
        Ok(self
            .branches
            .read()
            .await
            .values()
            .find(|b| b.repository == repository && b.name == name)
            .cloned())
    }

    // ========================================================================
    // Commit operations
    // ========================================================================

    async fn merge_commit(&self, commit: CommitNode) -> Result<CommitNode> {
        let mut commits = self.commits.write().await;
        if let Some(existing) = commits
            .values()
            .find(|c| c.token == commit.token && c.hash == commit.hash)
        {
            return Ok(existing.clone());
        }
        commits.insert(commit.id, commit.clone());
        Ok(commit)
    }

    async fn save_commit(&self, commit: &CommitNode) -> Result<()> {
        let mut commits = self.commits.write().await;
        let mut next = commit.clone();
        if let Some(stored) = commits.get(&commit.id) {
            next.parents.merge_from(&stored.parents);
            next.file_revisions.merge_from(&stored.file_revisions);
            next.tags.merge_from(&stored.tags);
        }
        commits.insert(next.id, next);
        Ok(())
    }

    async fn get_commit(&self, id: NodeId) -> Result<Option<CommitNode>> {
        Ok(self.commits.read().await.get(&id).cloned())
    }

    async fn find_commit(&self, token: &str, hash: &str) -> Result<Option<CommitNode>> {
        Ok(self
            .commits
            .read()
            .await
            .values()
            .find(|c| c.token == token && c.hash == hash)
            .cloned())
    }

    // ========================================================================
    // Tag operations
    // ========================================================================

    async fn merge_tag(&self, tag: TagNode) -> Result<TagNode> {
        let mut tags = self.tags.write().await;
        if let Some(existing) = tags.values().find(|t| t.name == tag.name) {
            return Ok(existing.clone());
        }
        tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn get_tag(&self, id: NodeId) -> Result<Option<TagNode>> {
        Ok(self.tags.read().await.get(&id).cloned())
    }

    // ========================================================================
    // Directory & file operations
    // ========================================================================

    async fn save_directory(&self, directory: &DirectoryNode) -> Result<()> {
        let mut directories = self.directories.write().await;
        let mut next = directory.clone();
        if let Some(stored) = directories.get(&directory.id) {
            next.subdirectories.merge_from(&stored.subdirectories);
            next.file_revisions.merge_from(&stored.file_revisions);
            next.parent = next.parent.or(stored.parent);
        }
        directories.insert(next.id, next);
        Ok(())
    }

    async fn get_directory(&self, id: NodeId) -> Result<Option<DirectoryNode>> {
        Ok(self.directories.read().await.get(&id).cloned())
    }

    async fn save_file(&self, file: &FileRevisionNode) -> Result<()> {
        let mut files = self.files.write().await;
        let mut next = file.clone();
        if let Some(stored) = files.get(&file.id) {
            next.import_names.merge_from(&stored.import_names);
            next.classes.merge_from(&stored.classes);
            next.functions.merge_from(&stored.functions);
            next.parent = next.parent.or(stored.parent);
        }
        files.insert(next.id, next);
        Ok(())
    }

    async fn get_file(&self, id: NodeId) -> Result<Option<FileRevisionNode>> {
        Ok(self.files.read().await.get(&id).cloned())
    }

    async fn find_files_by_hash(
        &self,
        repository: NodeId,
        hash: &str,
    ) -> Result<Vec<FileRevisionNode>> {
        let commit_ids: Vec<NodeId> = match self.repositories.read().await.get(&repository) {
            Some(repo) => repo.commits.iter().copied().collect(),
            None => return Ok(Vec::new()),
        };

        let file_ids: BTreeSet<NodeId> = {
            let commits = self.commits.read().await;
            commit_ids
                .iter()
                .filter_map(|id| commits.get(id))
                .flat_map(|c| c.file_revisions.iter().copied())
                .collect()
        };

        let files = self.files.read().await;
        Ok(file_ids
            .iter()
            .filter_map(|id| files.get(id))
            .filter(|f| f.hash.as_deref() == Some(hash))
            .cloned()
            .collect())
    }

    // ========================================================================
    // Class & function operations
    // ========================================================================

    async fn save_class(&self, class: &ClazzNode) -> Result<()> {
        let mut classes = self.classes.write().await;
        let mut next = class.clone();
        if let Some(stored) = classes.get(&class.id) {
            next.functions.merge_from(&stored.functions);
            next.fields.merge_from(&stored.fields);
            next.inner_classes.merge_from(&stored.inner_classes);
            next.super_classes.merge_from(&stored.super_classes);
        }
        classes.insert(next.id, next);
        Ok(())
    }

    async fn get_class(&self, id: NodeId) -> Result<Option<ClazzNode>> {
        Ok(self.classes.read().await.get(&id).cloned())
    }

    async fn save_function(&self, function: &FunctionNode) -> Result<()> {
        self.functions
            .write()
            .await
            .insert(function.id, function.clone());
        Ok(())
    }

    async fn get_function(&self, id: NodeId) -> Result<Option<FunctionNode>> {
        Ok(self.functions.read().await.get(&id).cloned())
    }

    async fn find_traced_function(&self, token: &str, fqn: &str) -> Result<Option<FunctionNode>> {
        let traced: BTreeSet<NodeId> = self
            .spans
            .read()
            .await
            .values()
            .filter(|s| s.token == token)
            .filter_map(|s| s.function)
            .collect();

        let functions = self.functions.read().await;
        Ok(traced
            .iter()
            .filter_map(|id| functions.get(id))
            .find(|f| f.fqn.as_deref() == Some(fqn))
            .cloned())
    }

    // ========================================================================
    // Application operations
    // ========================================================================

    async fn merge_application(&self, application: ApplicationNode) -> Result<ApplicationNode> {
        let mut applications = self.applications.write().await;
        if let Some(existing) = applications
            .values()
            .find(|a| a.token == application.token && a.name == application.name)
        {
            return Ok(existing.clone());
        }
        applications.insert(application.id, application.clone());
        Ok(application)
    }

    async fn save_application(&self, application: &ApplicationNode) -> Result<()> {
        self.applications
            .write()
            .await
            .insert(application.id, application.clone());
        Ok(())
    }

    async fn find_application(
        &self,
        token: &str,
        name: &str,
    ) -> Result<Option<ApplicationNode>> {
        Ok(self
            .applications
            .read()
            .await
            .values()
            .find(|a| a.token == token && a.name == name)
            .cloned())
    }

    async fn list_applications(&self, token: &str) -> Result<Vec<ApplicationNode>> {
        Ok(self
            .applications
            .read()
            .await
            .values()
            .filter(|a| a.token == token)
            .cloned()
            .collect())
    }

    // ========================================================================
    // Trace & span operations
    // ========================================================================

    async fn merge_trace(&self, trace: TraceNode) -> Result<TraceNode> {
        let mut traces = self.traces.write().await;
        if let Some(existing) = traces
            .values()
            .find(|t| t.token == trace.token && t.trace_id == trace.trace_id)
        {
            return Ok(existing.clone());
        }
        traces.insert(trace.id, trace.clone());
        Ok(trace)
    }

    async fn save_trace(&self, trace: &TraceNode) -> Result<()> {
        let mut traces = self.traces.write().await;
        let mut next = trace.clone();
        if let Some(stored) = traces.get(&trace.id) {
            next.spans.merge_from(&stored.spans);
        }
        traces.insert(next.id, next);
        Ok(())
    }

    async fn find_trace(&self, token: &str, trace_id: &str) -> Result<Option<TraceNode>> {
        Ok(self
            .traces
            .read()
            .await
            .values()
            .find(|t| t.token == token && t.trace_id == trace_id)
            .cloned())
    }

    async fn list_traces(&self, token: &str) -> Result<Vec<TraceNode>> {
        Ok(self
            .traces
            .read()
            .await
            .values()
            .filter(|t| t.token == token)
            .cloned()
            .collect())
    }

    async fn merge_span(&self, span: SpanNode) -> Result<SpanNode> {
        let mut spans = self.spans.write().await;
        if let Some(existing) = spans
            .values()
            .find(|s| s.token == span.token && s.span_id == span.span_id)
        {
            return Ok(existing.clone());
        }
        spans.insert(span.id, span.clone());
        Ok(span)
    }

    async fn save_span(&self, span: &SpanNode) -> Result<()> {
        self.spans.write().await.insert(span.id, span.clone());
        Ok(())
    }

    async fn get_span(&self, id: NodeId) -> Result<Option<SpanNode>> {
        Ok(self.spans.read().await.get(&id).cloned())
    }

    async fn find_span(&self, token: &str, span_id: &str) -> Result<Option<SpanNode>> {
        Ok(self
            .spans
            .read()
            .await
            .values()
            .find(|s| s.token == token && s.span_id == span_id)
            .cloned())
    }

    // ========================================================================
    // Edges & durability
    // ========================================================================

    async fn merge_edge(&self, relation: Relation, from: NodeId, to: NodeId) -> Result<bool> {
        match relation {
            Relation::RepositoryCommit => {
                ensure_exists(&self.commits, to, "commit").await?;
                let mut repositories = self.repositories.write().await;
                link(&mut repositories, from, "repository", |r| r.commits.insert(to))
            }
            Relation::RepositoryBranch => {
                ensure_exists(&self.branches, to, "branch").await?;
                let mut repositories = self.repositories.write().await;
                link(&mut repositories, from, "repository", |r| r.branches.insert(to))
            }
            Relation::CommitParent => {
                let mut commits = self.commits.write().await;
                if !commits.contains_key(&to) {
                    bail!("commit {} not found", to);
                }
                link(&mut commits, from, "commit", |c| c.parents.insert(to))
            }
            Relation::CommitFile => {
                ensure_exists(&self.files, to, "file revision").await?;
                let mut commits = self.commits.write().await;
                link(&mut commits, from, "commit", |c| c.file_revisions.insert(to))
            }
            Relation::CommitTag => {
                ensure_exists(&self.tags, to, "tag").await?;
                let mut commits = self.commits.write().await;
                link(&mut commits, from, "commit", |c| c.tags.insert(to))
            }
            Relation::DirectorySubdirectory => {
                if from == to {
                    bail!("directory {} cannot contain itself", from);
                }
                let mut directories = self.directories.write().await;
                let current_parent = match directories.get(&to) {
                    Some(child) => child.parent,
                    None => bail!("directory {} not found", to),
                };
                if let Some(parent) = current_parent.filter(|p| *p != from) {
                    bail!("directory {} already belongs to {}", to, parent);
                }
                let added = link(&mut directories, from, "directory", |d| {
                    d.subdirectories.insert(to)
                })?;
                if let Some(child) = directories.get_mut(&to) {
                    child.parent = Some(from);
                }
                Ok(added)
            }
            Relation::DirectoryFile => {
                let mut directories = self.directories.write().await;
                let mut files = self.files.write().await;
                let current_parent = match files.get(&to) {
                    Some(file) => file.parent,
                    None => bail!("file revision {} not found", to),
                };
                if let Some(parent) = current_parent.filter(|p| *p != from) {
                    bail!("file revision {} already belongs to {}", to, parent);
                }
                let added = link(&mut directories, from, "directory", |d| {
                    d.file_revisions.insert(to)
                })?;
                if let Some(file) = files.get_mut(&to) {
                    file.parent = Some(from);
                }
                Ok(added)
            }
            Relation::FileClass => {
                ensure_exists(&self.classes, to, "class").await?;
                let mut files = self.files.write().await;
                link(&mut files, from, "file revision", |f| f.classes.insert(to))
            }
            Relation::FileFunction => {
                ensure_exists(&self.functions, to, "function").await?;
                let mut files = self.files.write().await;
                link(&mut files, from, "file revision", |f| f.functions.insert(to))
            }
            Relation::ClassFunction => {
                ensure_exists(&self.functions, to, "function").await?;
                let mut classes = self.classes.write().await;
                link(&mut classes, from, "class", |c| c.functions.insert(to))
            }
            Relation::ClassInnerClass => {
                let mut classes = self.classes.write().await;
                if !classes.contains_key(&to) {
                    bail!("class {} not found", to);
                }
                link(&mut classes, from, "class", |c| c.inner_classes.insert(to))
            }
            Relation::ClassSuperClass => {
                let mut classes = self.classes.write().await;
                if !classes.contains_key(&to) {
                    bail!("class {} not found", to);
                }
                link(&mut classes, from, "class", |c| c.super_classes.insert(to))
            }
            Relation::TraceSpan => {
                ensure_exists(&self.spans, to, "span").await?;
                let mut traces = self.traces.write().await;
                link(&mut traces, from, "trace", |t| t.spans.insert(to))
            }
        }
    }

    async fn flush(&self) -> Result<()> {
        match &self.snapshot_path {
            Some(path) => self.persist(path).await,
            None => Ok(()),
        }
    }
}
