//! Read side: structure, commit-tree, timestamp and latest-commit queries

use super::models::*;
use crate::store::{ClazzNode, CommitNode, FileRevisionNode, GraphStore, NodeId, RepositoryNode};
use crate::structure::{
    CommitGraph, CommitRecord, CommitTreeBuilder, FlatLandscape, HydratedCommit, StructureError,
    StructureProjector, StructureResult, VersionedLoader,
};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub struct QueryService {
    store: Arc<dyn GraphStore>,
    commits: CommitGraph,
    loader: VersionedLoader,
    projector: StructureProjector,
}

impl QueryService {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            commits: CommitGraph::new(store.clone()),
            loader: VersionedLoader::new(store.clone()),
            projector: StructureProjector::new(store.clone()),
            store,
        }
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Project the selected commits of a landscape.
    pub async fn structure(
        &self,
        token: &str,
        selector: &StructureSelector,
    ) -> StructureResult<FlatLandscape> {
        let hydrated = match selector {
            StructureSelector::Latest => self.loader.load_latest_per_repository(token).await?,
            _ => {
                let mut loaded = Vec::new();
                for hash in selector.hashes() {
                    loaded.push(self.loader.load_commit(hash, token).await?);
                }
                loaded
            }
        };

        let landscape = self.projector.project(token, &hydrated).await?;
        if landscape.is_empty() {
            return Err(StructureError::NotFound(format!(
                "no structure for landscape {}",
                token
            )));
        }
        Ok(landscape)
    }

    // ========================================================================
    // Commit tree
    // ========================================================================

    /// Branches and branch points of the repository behind an application.
    pub async fn commit_tree(
        &self,
        token: &str,
        application: &str,
    ) -> StructureResult<ApplicationCommitTree> {
        let app = self
            .store
            .find_application(token, application)
            .await?
            .ok_or_else(|| StructureError::NotFound(format!("application {}", application)))?;

        let Some(repository_id) = app.repository else {
            return Ok(ApplicationCommitTree {
                name: app.name,
                branches: Vec::new(),
            });
        };
        let repository = self
            .store
            .get_repository(repository_id)
            .await?
            .ok_or_else(|| StructureError::NotFound(format!("repository {}", repository_id)))?;

        let (records, branch_of) = self.commit_records(&repository).await?;
        Ok(ApplicationCommitTree {
            name: app.name,
            branches: CommitTreeBuilder::build_tree(&records, &branch_of),
        })
    }

    async fn commit_records(
        &self,
        repository: &RepositoryNode,
    ) -> StructureResult<(Vec<CommitRecord>, HashMap<String, String>)> {
        let commits = self.commits.commits_of(repository).await?;
        let in_repository: HashMap<_, _> = commits.iter().map(|c| (c.id, c.hash.clone())).collect();

        let mut records = Vec::with_capacity(commits.len());
        let mut branch_of = HashMap::new();
        for commit in &commits {
            let mut parents = Vec::with_capacity(commit.parents.len());
            for parent_id in commit.parents.iter() {
                if let Some(hash) = in_repository.get(parent_id) {
                    parents.push(hash.clone());
                    continue;
                }
                // parents outside the repository still carry a branch
                if let Some(parent) = self.store.get_commit(*parent_id).await? {
                    if let Some(branch) = self.commits.branch_name(&parent).await? {
                        branch_of.insert(parent.hash.clone(), branch);
                    }
                    parents.push(parent.hash);
                }
            }

            records.push(CommitRecord {
                hash: commit.hash.clone(),
                commit_date: commit.commit_date,
                branch: self.commits.branch_name(commit).await?,
                parents,
            });
        }
        Ok((records, branch_of))
    }

    // ========================================================================
    // Code metrics
    // ========================================================================

    /// File, class and function metrics of an application at one commit.
    /// Files of the commit outside the application root are left out.
    pub async fn metrics(
        &self,
        token: &str,
        application: &str,
        commit_hash: &str,
    ) -> StructureResult<ApplicationMetrics> {
        let app = self
            .store
            .find_application(token, application)
            .await?
            .ok_or_else(|| StructureError::NotFound(format!("application {}", application)))?;
        let hydrated = self.loader.load_commit(commit_hash, token).await?;

        let mut metrics = ApplicationMetrics::default();
        for file in &hydrated.files {
            let Some(path) = path_below(&hydrated, &file.file, app.root_directory) else {
                continue;
            };
            metrics
                .file_metrics
                .insert(path.clone(), FileMetrics::from(&file.file.metrics));
            for function in &file.functions {
                metrics.method_metrics.insert(
                    format!("{}/{}", path, function.name),
                    MethodMetrics::from(&function.metrics),
                );
            }

            let mut seen: BTreeSet<NodeId> = BTreeSet::new();
            let mut pending: Vec<(String, ClazzNode)> = file
                .classes
                .iter()
                .map(|c| (path.clone(), c.class.clone()))
                .collect();
            while let Some((owner, class)) = pending.pop() {
                if !seen.insert(class.id) {
                    continue;
                }
                let key = format!("{}/{}", owner, class.name);
                metrics
                    .class_metrics
                    .insert(key.clone(), ClassMetrics::from(&class.metrics));
                for id in class.functions.iter() {
                    if let Some(function) = self.store.get_function(*id).await? {
                        metrics.method_metrics.insert(
                            format!("{}/{}", key, function.name),
                            MethodMetrics::from(&function.metrics),
                        );
                    }
                }
                for id in class.inner_classes.iter() {
                    if let Some(inner) = self.store.get_class(*id).await? {
                        pending.push((key.clone(), inner));
                    }
                }
            }
        }
        Ok(metrics)
    }

    // ========================================================================
    // Timestamps
    // ========================================================================

    /// One entry per trace, oldest first; `(now, 0)` for a landscape without traces.
    pub async fn timestamps(&self, token: &str) -> StructureResult<Vec<Timestamp>> {
        let mut timestamps: Vec<Timestamp> = self
            .store
            .list_traces(token)
            .await?
            .into_iter()
            .map(|trace| Timestamp {
                epoch_nano: trace.start_time,
                span_count: trace.spans.len(),
            })
            .collect();

        if timestamps.is_empty() {
            let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
            return Ok(vec![Timestamp {
                epoch_nano: now,
                span_count: 0,
            }]);
        }

        timestamps.sort_by_key(|t| (t.epoch_nano, t.span_count));
        Ok(timestamps)
    }

    // ========================================================================
    // Latest commit
    // ========================================================================

    pub async fn latest_commit(
        &self,
        token: &str,
        repository: &str,
        branch: &str,
    ) -> StructureResult<CommitSummary> {
        let commit = self
            .commits
            .find_latest_fully_ingested(repository, token, branch)
            .await?
            .ok_or_else(|| {
                StructureError::NotFound(format!(
                    "no fully ingested commit on {}/{}",
                    repository, branch
                ))
            })?;
        self.summarize(repository, branch, commit).await
    }

    async fn summarize(
        &self,
        repository: &str,
        branch: &str,
        commit: CommitNode,
    ) -> StructureResult<CommitSummary> {
        let mut tags = Vec::with_capacity(commit.tags.len());
        for id in commit.tags.iter() {
            if let Some(tag) = self.store.get_tag(*id).await? {
                tags.push(tag.name);
            }
        }
        tags.sort();

        Ok(CommitSummary {
            file_count: commit.file_revisions.len(),
            hash: commit.hash,
            repository_name: repository.to_string(),
            branch_name: branch.to_string(),
            author: commit.author,
            commit_date: commit.commit_date,
            tags,
        })
    }
}

/// `/`-joined path of `file` below directory `root`, if it lies below it.
fn path_below(hydrated: &HydratedCommit, file: &FileRevisionNode, root: NodeId) -> Option<String> {
    let chain = hydrated.ancestors(file);
    let depth = chain.iter().position(|d| d.id == root)?;
    let mut segments: Vec<&str> = chain[..depth]
        .iter()
        .rev()
        .map(|d| d.name.as_str())
        .collect();
    segments.push(&file.name);
    Some(segments.join("/"))
}
