//! Repository, branch, commit and tag bookkeeping.

use crate::store::{
    BranchNode, CommitNode, DirectoryNode, GraphStore, NodeId, Relation, RepositoryNode, TagNode,
};
use crate::structure::error::{StructureError, StructureResult};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Parent hash meaning "no parent"
pub const NO_PARENT: &str = "NONE";

/// Branch assumed for commits whose branch is unknown
pub const DEFAULT_BRANCH: &str = "main";

/// Get-or-create access to the commit graph of a landscape
pub struct CommitGraph {
    store: Arc<dyn GraphStore>,
}

impl CommitGraph {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    // ========================================================================
    // Repositories & branches
    // ========================================================================

    /// Return the repository, creating it together with its root directory.
    pub async fn get_or_create_repository(
        &self,
        name: &str,
        token: &str,
    ) -> StructureResult<RepositoryNode> {
        if let Some(repository) = self.store.find_repository(token, name).await? {
            return Ok(repository);
        }
        self.create_repository(name, token).await
    }

    // Only the caller whose merge inserted the repository saves the root, so a
    // lost race leaves no orphan directory behind.
    async fn create_repository(&self, name: &str, token: &str) -> StructureResult<RepositoryNode> {
        let root = DirectoryNode::new(self.store.allocate_id(), name);
        let repository = self
            .store
            .merge_repository(RepositoryNode::new(
                self.store.allocate_id(),
                token,
                name,
                root.id,
            ))
            .await?;
        if repository.root_directory != root.id {
            return Ok(repository);
        }

        self.store.save_directory(&root).await?;
        tracing::info!("Registered repository {} for landscape {}", name, token);
        Ok(repository)
    }

    pub async fn find_repository(&self, name: &str, token: &str) -> StructureResult<RepositoryNode> {
        self.store
            .find_repository(token, name)
            .await?
            .ok_or_else(|| StructureError::NotFound(format!("repository {}", name)))
    }

    pub async fn get_or_create_branch(
        &self,
        name: &str,
        repository_name: &str,
        token: &str,
    ) -> StructureResult<BranchNode> {
        let repository = self.find_repository(repository_name, token).await?;
        self.get_or_create_branch_in(&repository, name).await
    }

    pub async fn get_or_create_branch_in(
        &self,
        repository: &RepositoryNode,
        name: &str,
    ) -> StructureResult<BranchNode> {
        if let Some(branch) = self.store.find_branch(repository.id, name).await? {
            return Ok(branch);
        }

        let branch = self
            .store
            .merge_branch(BranchNode {
                id: self.store.allocate_id(),
                name: name.to_string(),
                repository: repository.id,
            })
            .await?;
        self.store
            .merge_edge(Relation::RepositoryBranch, repository.id, branch.id)
            .await?;
        Ok(branch)
    }

    // ========================================================================
    // Commits & tags
    // ========================================================================

    pub async fn get_or_create_commit(&self, hash: &str, token: &str) -> StructureResult<CommitNode> {
        if let Some(commit) = self.store.find_commit(token, hash).await? {
            return Ok(commit);
        }
        let commit = CommitNode::new(self.store.allocate_id(), token, hash);
        Ok(self.store.merge_commit(commit).await?)
    }

    pub async fn update_commit(&self, commit: &CommitNode) -> StructureResult<()> {
        Ok(self.store.save_commit(commit).await?)
    }

    /// Put the commit on `branch` and fill in whichever of author and dates are known.
    pub async fn assign_branch(
        &self,
        commit: &mut CommitNode,
        branch: &BranchNode,
        author: Option<String>,
        author_date: Option<DateTime<Utc>>,
        commit_date: Option<DateTime<Utc>>,
    ) -> StructureResult<()> {
        commit.branch = Some(branch.id);
        if author.is_some() {
            commit.author = author;
        }
        commit.author_date = author_date.or(commit.author_date);
        commit.commit_date = commit_date.or(commit.commit_date);
        self.update_commit(commit).await
    }

    pub async fn add_to_repository(
        &self,
        repository: NodeId,
        commit: NodeId,
    ) -> StructureResult<bool> {
        Ok(self
            .store
            .merge_edge(Relation::RepositoryCommit, repository, commit)
            .await?)
    }

    pub async fn add_parent(&self, commit: NodeId, parent: NodeId) -> StructureResult<bool> {
        Ok(self
            .store
            .merge_edge(Relation::CommitParent, commit, parent)
            .await?)
    }

    pub async fn attach_file(&self, commit: NodeId, file: NodeId) -> StructureResult<bool> {
        Ok(self.store.merge_edge(Relation::CommitFile, commit, file).await?)
    }

    pub async fn get_or_create_tag(&self, name: &str) -> StructureResult<TagNode> {
        let tag = TagNode {
            id: self.store.allocate_id(),
            name: name.to_string(),
        };
        Ok(self.store.merge_tag(tag).await?)
    }

    pub async fn tag_commit(&self, commit: NodeId, name: &str) -> StructureResult<TagNode> {
        let tag = self.get_or_create_tag(name).await?;
        self.store
            .merge_edge(Relation::CommitTag, commit, tag.id)
            .await?;
        Ok(tag)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Commits contained in the repository, in creation order
    pub async fn commits_of(&self, repository: &RepositoryNode) -> StructureResult<Vec<CommitNode>> {
        let mut commits = Vec::with_capacity(repository.commits.len());
        for id in repository.commits.iter() {
            if let Some(commit) = self.store.get_commit(*id).await? {
                commits.push(commit);
            }
        }
        Ok(commits)
    }

    pub async fn branch_name(&self, commit: &CommitNode) -> StructureResult<Option<String>> {
        match commit.branch {
            Some(id) => Ok(self.store.get_branch(id).await?.map(|b| b.name)),
            None => Ok(None),
        }
    }

    /// Oldest commit of the branch whose every file carries extended data.
    ///
    /// Commits without files never qualify. Equal commit dates are ordered by
    /// hash; commits without a date sort first.
    pub async fn find_latest_fully_ingested(
        &self,
        repository_name: &str,
        token: &str,
        branch_name: &str,
    ) -> StructureResult<Option<CommitNode>> {
        let Some(repository) = self.store.find_repository(token, repository_name).await? else {
            return Ok(None);
        };
        let Some(branch) = self.store.find_branch(repository.id, branch_name).await? else {
            return Ok(None);
        };

        let mut candidates = Vec::new();
        for commit in self.commits_of(&repository).await? {
            if commit.branch != Some(branch.id) || commit.file_revisions.is_empty() {
                continue;
            }
            if self.all_files_have_data(&commit).await? {
                candidates.push(commit);
            }
        }

        Ok(candidates
            .into_iter()
            .min_by(|a, b| (a.commit_date, &a.hash).cmp(&(b.commit_date, &b.hash))))
    }

    /// Newest commit of the repository (ties broken by the smaller hash)
    pub async fn find_most_recent_commit(
        &self,
        repository: &RepositoryNode,
    ) -> StructureResult<Option<CommitNode>> {
        Ok(self
            .commits_of(repository)
            .await?
            .into_iter()
            .max_by(|a, b| {
                a.commit_date
                    .cmp(&b.commit_date)
                    .then_with(|| b.hash.cmp(&a.hash))
            }))
    }

    async fn all_files_have_data(&self, commit: &CommitNode) -> StructureResult<bool> {
        for id in commit.file_revisions.iter() {
            match self.store.get_file(*id).await? {
                Some(file) if file.has_file_data => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}
