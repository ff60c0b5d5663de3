//! Bounded-depth hydration of a single commit.
//!
//! A commit's file tree is rebuilt from its file revisions upward instead of
//! walking the repository history: the directory chain above every file is
//! loaded once, then each file is loaded together with its classes and
//! functions (commit -> file -> class -> function).

use crate::store::{
    ClazzNode, CommitNode, DirectoryNode, FileRevisionNode, FunctionNode, GraphStore, NodeId,
};
use crate::structure::commits::CommitGraph;
use crate::structure::error::{StructureError, StructureResult};
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct HydratedClass {
    pub class: ClazzNode,
    pub functions: Vec<FunctionNode>,
}

#[derive(Debug, Clone)]
pub struct HydratedFile {
    pub file: FileRevisionNode,
    pub classes: Vec<HydratedClass>,
    /// Functions declared outside any class
    pub functions: Vec<FunctionNode>,
}

/// One commit with its files and every directory above them
#[derive(Debug, Clone)]
pub struct HydratedCommit {
    pub commit: CommitNode,
    pub files: Vec<HydratedFile>,
    pub directories: BTreeMap<NodeId, DirectoryNode>,
}

impl HydratedCommit {
    pub fn directory(&self, id: NodeId) -> Option<&DirectoryNode> {
        self.directories.get(&id)
    }

    pub fn parent_of(&self, file: &FileRevisionNode) -> Option<&DirectoryNode> {
        file.parent.and_then(|id| self.directory(id))
    }

    /// Directory chain above a file, nearest first, ending at its root.
    pub fn ancestors(&self, file: &FileRevisionNode) -> Vec<&DirectoryNode> {
        let mut chain: Vec<&DirectoryNode> = Vec::new();
        let mut next = self.parent_of(file);
        while let Some(dir) = next {
            if chain.iter().any(|d| d.id == dir.id) {
                break;
            }
            chain.push(dir);
            next = dir.parent.and_then(|id| self.directory(id));
        }
        chain
    }
}

/// Reconstructs commit snapshots from the store
pub struct VersionedLoader {
    store: Arc<dyn GraphStore>,
    commits: CommitGraph,
}

impl VersionedLoader {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            commits: CommitGraph::new(store.clone()),
            store,
        }
    }

    /// Hydrate the commit `hash` of landscape `token`.
    pub async fn load_commit(&self, hash: &str, token: &str) -> StructureResult<HydratedCommit> {
        let commit = self
            .store
            .find_commit(token, hash)
            .await?
            .ok_or_else(|| StructureError::NotFound(format!("commit {}", hash)))?;
        self.hydrate(commit).await
    }

    /// Hydrate the newest commit of every repository of the landscape.
    /// Repositories without commits are skipped.
    pub async fn load_latest_per_repository(
        &self,
        token: &str,
    ) -> StructureResult<Vec<HydratedCommit>> {
        let mut loaded = Vec::new();
        for repository in self.store.list_repositories(token).await? {
            match self.commits.find_most_recent_commit(&repository).await? {
                Some(commit) => loaded.push(self.hydrate(commit).await?),
                None => tracing::debug!("Repository {} has no commits yet", repository.name),
            }
        }
        Ok(loaded)
    }

    async fn hydrate(&self, commit: CommitNode) -> StructureResult<HydratedCommit> {
        let mut files = Vec::with_capacity(commit.file_revisions.len());
        for id in commit.file_revisions.iter() {
            match self.store.get_file(*id).await? {
                Some(file) => files.push(file),
                None => tracing::warn!("Commit {} references missing file {}", commit.hash, id),
            }
        }

        let directories = self.load_directory_chains(&files).await?;
        let files = try_join_all(files.into_iter().map(|file| self.hydrate_file(file))).await?;

        tracing::debug!(
            "Hydrated commit {} with {} files and {} directories",
            commit.hash,
            files.len(),
            directories.len()
        );
        Ok(HydratedCommit {
            commit,
            files,
            directories,
        })
    }

    // Walks back-references upward; stops at directories already loaded so
    // shared ancestors are fetched once.
    async fn load_directory_chains(
        &self,
        files: &[FileRevisionNode],
    ) -> StructureResult<BTreeMap<NodeId, DirectoryNode>> {
        let mut directories = BTreeMap::new();
        for file in files {
            let mut next = file.parent;
            while let Some(id) = next {
                if directories.contains_key(&id) {
                    break;
                }
                let Some(dir) = self.store.get_directory(id).await? else {
                    break;
                };
                next = dir.parent;
                directories.insert(id, dir);
            }
        }
        Ok(directories)
    }

    async fn hydrate_file(&self, file: FileRevisionNode) -> StructureResult<HydratedFile> {
        let mut classes = Vec::with_capacity(file.classes.len());
        for id in file.classes.iter() {
            if let Some(class) = self.store.get_class(*id).await? {
                let functions = self.load_functions(class.functions.iter().copied()).await?;
                classes.push(HydratedClass { class, functions });
            }
        }
        let functions = self.load_functions(file.functions.iter().copied()).await?;

        Ok(HydratedFile {
            file,
            classes,
            functions,
        })
    }

    async fn load_functions(
        &self,
        ids: impl Iterator<Item = NodeId>,
    ) -> StructureResult<Vec<FunctionNode>> {
        let mut functions = Vec::new();
        for id in ids {
            if let Some(function) = self.store.get_function(id).await? {
                functions.push(function);
            }
        }
        Ok(functions)
    }
}
