//! Path resolution over the directory/file tree.
//!
//! A path such as `src/main/App.java` is resolved segment by segment below a
//! root directory. Resolution returns the deepest node already in the graph
//! plus the segments still missing; creation appends exactly those segments.
//! Together they keep every directory prefix unique even when files are
//! ingested one at a time.

use crate::store::{DirectoryNode, FileRevisionNode, GraphStore, NodeId, Relation};
use crate::structure::error::{StructureError, StructureResult};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Node found at the end of the longest matched prefix
#[derive(Debug, Clone)]
pub enum ResolvedNode {
    Directory(DirectoryNode),
    File(FileRevisionNode),
}

impl ResolvedNode {
    pub fn id(&self) -> NodeId {
        match self {
            ResolvedNode::Directory(d) => d.id,
            ResolvedNode::File(f) => f.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResolvedNode::Directory(d) => &d.name,
            ResolvedNode::File(f) => &f.name,
        }
    }
}

/// Outcome of [`PathResolver::resolve`]
#[derive(Debug, Clone)]
pub struct PathResolution {
    pub existing: ResolvedNode,
    /// Segments below `existing` that are not in the graph yet
    pub remaining: Vec<String>,
}

impl PathResolution {
    pub fn is_complete(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// Which file revisions may terminate a resolution
#[derive(Debug, Clone, Copy)]
pub enum ResolutionScope {
    /// Any file with a matching name
    Unscoped,
    /// Only files already contained in this commit
    Commit(NodeId),
}

/// Split a slash-delimited path into its non-empty segments.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Longest-prefix resolution and suffix creation
pub struct PathResolver {
    store: Arc<dyn GraphStore>,
}

impl PathResolver {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Find the deepest existing node whose name path is a prefix of `segments`.
    ///
    /// Directories match every segment but the last; a file only matches the
    /// last one. Same-named siblings are all explored and the deepest match
    /// wins, ties going to the lowest node id.
    pub async fn resolve(
        &self,
        root: NodeId,
        segments: &[String],
        scope: ResolutionScope,
    ) -> StructureResult<PathResolution> {
        let Some((file_name, _)) = segments.split_last() else {
            return Err(StructureError::InvalidArgument(
                "path must contain at least a file name".to_string(),
            ));
        };

        let root_dir = self.store.get_directory(root).await?.ok_or_else(|| {
            StructureError::ResolutionEmpty(format!("root directory {} does not exist", root))
        })?;

        let allowed: Option<Arc<BTreeSet<NodeId>>> = match scope {
            ResolutionScope::Unscoped => None,
            ResolutionScope::Commit(commit_id) => {
                let commit = self.store.get_commit(commit_id).await?.ok_or_else(|| {
                    StructureError::NotFound(format!("commit {} does not exist", commit_id))
                })?;
                Some(commit.file_revisions.snapshot())
            }
        };

        let last = segments.len() - 1;
        let mut best = ResolvedNode::Directory(root_dir.clone());
        let mut best_depth = 0usize;
        let mut consider = |node: ResolvedNode, depth: usize| {
            if depth > best_depth || (depth == best_depth && node.id() < best.id()) {
                best = node;
                best_depth = depth;
            }
        };

        // depth = number of segments consumed by the directory on the stack
        let mut stack = vec![(root_dir, 0usize)];
        while let Some((dir, depth)) = stack.pop() {
            if depth == last {
                let file_ids: Vec<NodeId> = dir.file_revisions.iter().copied().collect();
                for file_id in file_ids {
                    if let Some(allowed) = &allowed {
                        if !allowed.contains(&file_id) {
                            continue;
                        }
                    }
                    let Some(file) = self.store.get_file(file_id).await? else {
                        continue;
                    };
                    if &file.name == file_name {
                        consider(ResolvedNode::File(file), depth + 1);
                    }
                }
                continue;
            }

            let child_ids: Vec<NodeId> = dir.subdirectories.iter().copied().collect();
            for child_id in child_ids {
                let Some(child) = self.store.get_directory(child_id).await? else {
                    continue;
                };
                if child.name == segments[depth] {
                    consider(ResolvedNode::Directory(child.clone()), depth + 1);
                    stack.push((child, depth + 1));
                }
            }
        }

        Ok(PathResolution {
            existing: best,
            remaining: segments[best_depth..].to_vec(),
        })
    }

    /// Create the missing suffix below `start`: one directory per segment but
    /// the last, then a file revision named after the last segment.
    pub async fn create(
        &self,
        start: NodeId,
        remaining: &[String],
    ) -> StructureResult<FileRevisionNode> {
        let Some((file_name, dir_names)) = remaining.split_last() else {
            return Err(StructureError::InvalidArgument(
                "nothing left to create below an existing file".to_string(),
            ));
        };

        let mut parent = start;
        for name in dir_names {
            let dir = DirectoryNode::new(self.store.allocate_id(), name);
            self.store.save_directory(&dir).await?;
            self.store
                .merge_edge(Relation::DirectorySubdirectory, parent, dir.id)
                .await?;
            parent = dir.id;
        }

        let mut file = FileRevisionNode::new(self.store.allocate_id(), file_name);
        self.store.save_file(&file).await?;
        self.store
            .merge_edge(Relation::DirectoryFile, parent, file.id)
            .await?;
        file.parent = Some(parent);

        tracing::debug!(
            "Created {} directories and file {} below {}",
            dir_names.len(),
            file.name,
            start
        );
        Ok(file)
    }

    /// Resolve `segments` and create whatever is missing.
    /// A complete match returns the existing file unchanged.
    pub async fn resolve_or_create(
        &self,
        root: NodeId,
        segments: &[String],
        scope: ResolutionScope,
    ) -> StructureResult<FileRevisionNode> {
        let resolution = self.resolve(root, segments, scope).await?;
        if !resolution.is_complete() {
            return self
                .create(resolution.existing.id(), &resolution.remaining)
                .await;
        }
        match resolution.existing {
            ResolvedNode::File(file) => Ok(file),
            ResolvedNode::Directory(dir) => Err(StructureError::InvalidArgument(format!(
                "path ends at directory {}",
                dir.name
            ))),
        }
    }

    /// Walk (and extend) a directory-only chain below `root`.
    /// An empty chain yields the root itself.
    pub async fn ensure_directories(
        &self,
        root: NodeId,
        segments: &[String],
    ) -> StructureResult<DirectoryNode> {
        let mut current = self.store.get_directory(root).await?.ok_or_else(|| {
            StructureError::ResolutionEmpty(format!("root directory {} does not exist", root))
        })?;

        for name in segments {
            let mut next = None;
            for child_id in current.subdirectories.iter().copied().collect::<Vec<_>>() {
                if let Some(child) = self.store.get_directory(child_id).await? {
                    if &child.name == name {
                        next = Some(child);
                        break;
                    }
                }
            }

            current = match next {
                Some(child) => child,
                None => {
                    let mut dir = DirectoryNode::new(self.store.allocate_id(), name);
                    self.store.save_directory(&dir).await?;
                    self.store
                        .merge_edge(Relation::DirectorySubdirectory, current.id, dir.id)
                        .await?;
                    dir.parent = Some(current.id);
                    dir
                }
            };
        }

        Ok(current)
    }

    /// Path of a file below its root directory, e.g. `["src", "App.java"]`.
    pub async fn relative_path(&self, file: &FileRevisionNode) -> StructureResult<Vec<String>> {
        let mut names = vec![file.name.clone()];
        let mut visited = BTreeSet::new();
        let mut next = file.parent;

        while let Some(dir_id) = next {
            if !visited.insert(dir_id) {
                break;
            }
            let Some(dir) = self.store.get_directory(dir_id).await? else {
                break;
            };
            // the parentless directory is the root and not part of the path
            if dir.parent.is_none() {
                break;
            }
            names.push(dir.name);
            next = dir.parent;
        }

        names.reverse();
        Ok(names)
    }
}
