//! Ingestion of repository, commit, file-detail and span facts

use super::facts::*;
use crate::store::{
    ApplicationNode, ClazzNode, CommitNode, DirectoryNode, FieldValue, FileRevisionNode,
    FunctionNode, GraphStore, NodeId, ParameterValue, Relation, RepositoryNode, SpanNode,
    TraceNode,
};
use crate::structure::{
    split_path, CommitGraph, PathResolver, ResolutionScope, ResolvedNode, StructureError,
    StructureResult, DEFAULT_BRANCH, NO_PARENT,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;

/// Root directory name of applications known only from traces
pub const DYNAMIC_ROOT: &str = "*";

/// Keep the last `/` segment of an upstream repository name.
pub fn repository_display_name(upstream: &str) -> &str {
    let trimmed = upstream.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Applies ingestion facts to the store
pub struct IngestionService {
    store: Arc<dyn GraphStore>,
    commits: CommitGraph,
    resolver: PathResolver,
}

impl IngestionService {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            commits: CommitGraph::new(store.clone()),
            resolver: PathResolver::new(store.clone()),
            store,
        }
    }

    // ========================================================================
    // Repository state
    // ========================================================================

    /// Register repository, branch and application roots.
    /// Returns the latest fully ingested commit of the branch, or "".
    pub async fn ingest_repository_state(
        &self,
        state: &RepositoryState,
    ) -> StructureResult<RepositoryStateResponse> {
        let token = &state.landscape_token;
        let name = repository_display_name(&state.repository_name);
        if name.is_empty() {
            return Err(StructureError::InvalidArgument(
                "repository name must not be empty".to_string(),
            ));
        }
        let branch_name = if state.branch_name.is_empty() {
            DEFAULT_BRANCH
        } else {
            state.branch_name.as_str()
        };

        let repository = self.commits.get_or_create_repository(name, token).await?;
        self.commits
            .get_or_create_branch_in(&repository, branch_name)
            .await?;

        for (application, path) in &state.application_paths {
            let root = self
                .resolver
                .ensure_directories(repository.root_directory, &split_path(path))
                .await?;
            self.register_application(token, application, root.id, repository.id)
                .await?;
        }

        let latest = self
            .commits
            .find_latest_fully_ingested(name, token, branch_name)
            .await?;

        Ok(RepositoryStateResponse {
            branch_name: branch_name.to_string(),
            commit_id: latest.map(|c| c.hash).unwrap_or_default(),
        })
    }

    async fn register_application(
        &self,
        token: &str,
        name: &str,
        root: NodeId,
        repository: NodeId,
    ) -> StructureResult<ApplicationNode> {
        let mut application = self
            .store
            .merge_application(ApplicationNode {
                id: self.store.allocate_id(),
                token: token.to_string(),
                name: name.to_string(),
                root_directory: root,
                repository: Some(repository),
            })
            .await?;

        if application.root_directory != root || application.repository != Some(repository) {
            tracing::info!("Moving application {} to directory {}", name, root);
            application.root_directory = root;
            application.repository = Some(repository);
            self.store.save_application(&application).await?;
        }
        Ok(application)
    }

    // ========================================================================
    // Commits
    // ========================================================================

    /// Record a commit of a registered repository with all its files.
    pub async fn ingest_commit(&self, fact: &CommitFact) -> StructureResult<CommitNode> {
        let token = &fact.landscape_token;
        if fact.commit_hash.is_empty() {
            return Err(StructureError::InvalidArgument(
                "commit hash must not be empty".to_string(),
            ));
        }

        let name = repository_display_name(&fact.repository_name);
        let repository = self
            .store
            .find_repository(token, name)
            .await?
            .ok_or_else(|| {
                StructureError::FailedPrecondition(format!(
                    "repository {} has not been registered for landscape {}",
                    name, token
                ))
            })?;

        let branch_name = if fact.branch_name.is_empty() {
            DEFAULT_BRANCH
        } else {
            fact.branch_name.as_str()
        };
        let branch = self
            .commits
            .get_or_create_branch_in(&repository, branch_name)
            .await?;

        let mut commit = self
            .commits
            .get_or_create_commit(&fact.commit_hash, token)
            .await?;
        self.commits
            .assign_branch(
                &mut commit,
                &branch,
                fact.author.clone(),
                fact.author_date,
                fact.commit_date,
            )
            .await?;
        self.commits.add_to_repository(repository.id, commit.id).await?;

        if let Some(parent_hash) = non_empty(&fact.parent_commit_hash).filter(|h| *h != NO_PARENT)
        {
            let parent = self.commits.get_or_create_commit(parent_hash, token).await?;
            self.commits.add_parent(commit.id, parent.id).await?;
        }

        for tag in &fact.tags {
            self.commits.tag_commit(commit.id, tag).await?;
        }

        let files = fact
            .added_files
            .iter()
            .chain(&fact.modified_files)
            .chain(&fact.unchanged_files);
        for identifier in files {
            self.attach_static_file(&repository, commit.id, identifier)
                .await?;
        }

        tracing::debug!(
            "Ingested commit {} of {} ({} added, {} modified, {} unchanged)",
            fact.commit_hash,
            name,
            fact.added_files.len(),
            fact.modified_files.len(),
            fact.unchanged_files.len()
        );

        Ok(self
            .store
            .get_commit(commit.id)
            .await?
            .unwrap_or(commit))
    }

    // A revision is identified by (hash, path) inside the repository; only if
    // none exists is a new one resolved and created below the repository root.
    async fn attach_static_file(
        &self,
        repository: &RepositoryNode,
        commit: NodeId,
        identifier: &FileIdentifier,
    ) -> StructureResult<FileRevisionNode> {
        let segments = split_path(&identifier.path);
        if segments.is_empty() {
            return Err(StructureError::InvalidArgument(format!(
                "file {} has an empty path",
                identifier.hash
            )));
        }

        let file = match self
            .find_revision(repository, &identifier.hash, &segments)
            .await?
        {
            Some(file) => file,
            None => {
                let resolution = self
                    .resolver
                    .resolve(
                        repository.root_directory,
                        &segments,
                        ResolutionScope::Commit(commit),
                    )
                    .await?;
                let mut file = match resolution.existing {
                    ResolvedNode::Directory(dir) => {
                        self.resolver.create(dir.id, &resolution.remaining).await?
                    }
                    // same path already in this commit under another hash
                    ResolvedNode::File(other) => {
                        let parent = other.parent.unwrap_or(repository.root_directory);
                        self.resolver
                            .create(parent, &segments[segments.len() - 1..])
                            .await?
                    }
                };
                file.hash = Some(identifier.hash.clone());
                self.store.save_file(&file).await?;
                file
            }
        };

        self.commits.attach_file(commit, file.id).await?;
        Ok(file)
    }

    async fn find_revision(
        &self,
        repository: &RepositoryNode,
        hash: &str,
        segments: &[String],
    ) -> StructureResult<Option<FileRevisionNode>> {
        for file in self.store.find_files_by_hash(repository.id, hash).await? {
            if self.resolver.relative_path(&file).await? == segments {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // File details
    // ========================================================================

    /// Attach static-analysis data to every revision with the fact's hash.
    /// Returns the number of revisions updated.
    pub async fn ingest_file_detail(&self, fact: &FileDetailFact) -> StructureResult<usize> {
        let token = &fact.landscape_token;
        let name = repository_display_name(&fact.repository_name);
        let repository = self
            .store
            .find_repository(token, name)
            .await?
            .ok_or_else(|| {
                StructureError::FailedPrecondition(format!(
                    "repository {} has not been registered for landscape {}",
                    name, token
                ))
            })?;

        let revisions = self
            .store
            .find_files_by_hash(repository.id, &fact.file_hash)
            .await?;
        if revisions.is_empty() {
            return Err(StructureError::FailedPrecondition(format!(
                "no file revision with hash {} in repository {}",
                fact.file_hash, name
            )));
        }

        // structure created for one revision is shared by the others
        let mut created_classes: HashMap<String, NodeId> = HashMap::new();
        let mut created_functions: HashMap<String, NodeId> = HashMap::new();
        let count = revisions.len();

        for mut file in revisions {
            let existing_classes = self.classes_by_name(&file).await?;
            let mut class_ids: HashMap<&str, NodeId> = HashMap::new();
            for class in &fact.classes {
                let id = match existing_classes
                    .get(&class.name)
                    .or_else(|| created_classes.get(&class.name))
                    .copied()
                {
                    Some(id) => id,
                    None => {
                        let id = self.create_class(class).await?;
                        created_classes.insert(class.name.clone(), id);
                        id
                    }
                };
                self.store
                    .merge_edge(Relation::FileClass, file.id, id)
                    .await?;
                class_ids.insert(class.name.as_str(), id);
            }
            self.link_super_classes(&fact.classes, &class_ids).await?;

            let existing_functions = self.functions_by_name(file.functions.iter().copied()).await?;
            for function in &fact.functions {
                let id = match existing_functions
                    .get(&function.name)
                    .or_else(|| created_functions.get(&function.name))
                    .copied()
                {
                    Some(id) => id,
                    None => {
                        let id = self.create_function(function).await?;
                        created_functions.insert(function.name.clone(), id);
                        id
                    }
                };
                self.store
                    .merge_edge(Relation::FileFunction, file.id, id)
                    .await?;
            }

            // flag last, so a half-written revision never counts as complete
            file.language = fact.language;
            file.package_name = fact.package_name.clone();
            for import in &fact.import_names {
                file.import_names.insert(import.clone());
            }
            file.metrics
                .extend(fact.metrics.iter().map(|(k, v)| (k.clone(), *v)));
            file.last_editor = fact.last_editor.clone();
            file.added_lines = fact.added_lines;
            file.modified_lines = fact.modified_lines;
            file.deleted_lines = fact.deleted_lines;
            file.has_file_data = true;
            self.store.save_file(&file).await?;
        }

        tracing::debug!(
            "Ingested file details for hash {} ({} revisions)",
            fact.file_hash,
            count
        );
        Ok(count)
    }

    async fn classes_by_name(
        &self,
        file: &FileRevisionNode,
    ) -> StructureResult<HashMap<String, NodeId>> {
        let mut by_name = HashMap::new();
        for id in file.classes.iter() {
            if let Some(class) = self.store.get_class(*id).await? {
                by_name.entry(class.name).or_insert(*id);
            }
        }
        Ok(by_name)
    }

    async fn functions_by_name(
        &self,
        ids: impl Iterator<Item = NodeId>,
    ) -> StructureResult<HashMap<String, NodeId>> {
        let mut by_name = HashMap::new();
        for id in ids {
            if let Some(function) = self.store.get_function(id).await? {
                by_name.entry(function.name).or_insert(id);
            }
        }
        Ok(by_name)
    }

    fn create_class<'a>(&'a self, data: &'a ClassData) -> BoxFuture<'a, StructureResult<NodeId>> {
        async move {
            let mut class = ClazzNode::new(self.store.allocate_id(), &data.name);
            class.class_type = data.class_type;
            class.modifiers = data.modifiers.iter().cloned().collect();
            class.implemented_interfaces = data.implemented_interfaces.iter().cloned().collect();
            class.annotations = data.annotations.iter().cloned().collect();
            class.enum_values = data.enum_values.iter().cloned().collect();
            class.metrics = data.metrics.clone();
            class.fields = data
                .fields
                .iter()
                .map(|f| FieldValue {
                    name: f.name.clone(),
                    type_name: f.type_name.clone(),
                    modifiers: f.modifiers.clone(),
                })
                .collect();
            self.store.save_class(&class).await?;

            for function in &data.functions {
                let id = self.create_function(function).await?;
                self.store
                    .merge_edge(Relation::ClassFunction, class.id, id)
                    .await?;
            }
            for inner in &data.inner_classes {
                let id = self.create_class(inner).await?;
                self.store
                    .merge_edge(Relation::ClassInnerClass, class.id, id)
                    .await?;
            }
            Ok(class.id)
        }
        .boxed()
    }

    async fn create_function(&self, data: &FunctionData) -> StructureResult<NodeId> {
        let mut function = FunctionNode::new(self.store.allocate_id(), &data.name);
        function.return_type = data.return_type.clone();
        function.is_constructor = data.is_constructor;
        function.annotations = data.annotations.iter().cloned().collect();
        function.modifiers = data.modifiers.iter().cloned().collect();
        function.outgoing_calls = data.outgoing_method_calls.iter().cloned().collect();
        function.metrics = data.metrics.clone();
        function.start_line = data.start_line;
        function.end_line = data.end_line;
        function.parameters = data
            .parameters
            .iter()
            .map(|p| ParameterValue {
                name: p.name.clone(),
                type_name: p.type_name.clone(),
                modifiers: p.modifiers.clone(),
            })
            .collect();
        self.store.save_function(&function).await?;
        Ok(function.id)
    }

    // Only superclasses declared in the same file can be linked.
    async fn link_super_classes(
        &self,
        classes: &[ClassData],
        ids: &HashMap<&str, NodeId>,
    ) -> StructureResult<()> {
        for class in classes {
            let Some(class_id) = ids.get(class.name.as_str()) else {
                continue;
            };
            for super_name in &class.super_classes {
                match ids.get(super_name.as_str()) {
                    Some(super_id) if super_id != class_id => {
                        self.store
                            .merge_edge(Relation::ClassSuperClass, *class_id, *super_id)
                            .await?;
                    }
                    _ => tracing::trace!("Superclass {} of {} not in file", super_name, class.name),
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Spans
    // ========================================================================

    /// Record a span and place its function in the application's file tree.
    ///
    /// Failing to place the function (e.g. a missing root directory) is logged
    /// and the span is still recorded.
    pub async fn ingest_span(&self, fact: &SpanFact) -> StructureResult<SpanNode> {
        let token = &fact.landscape_token;
        if fact.trace_id.is_empty() || fact.span_id.is_empty() {
            return Err(StructureError::InvalidArgument(
                "trace id and span id must not be empty".to_string(),
            ));
        }

        let application = self
            .get_or_create_application(token, &fact.application_name)
            .await?;
        let function = self.place_function(&application, fact).await?;

        let trace = self
            .store
            .merge_trace(TraceNode {
                id: self.store.allocate_id(),
                token: token.to_string(),
                trace_id: fact.trace_id.clone(),
                start_time: fact.start_time,
                end_time: fact.end_time,
                spans: Default::default(),
            })
            .await?;

        let parent_span = match non_empty(&fact.parent_span_id) {
            Some(parent_id) => Some(self.get_or_create_span(token, parent_id).await?.id),
            None => None,
        };

        let mut span = self.get_or_create_span(token, &fact.span_id).await?;
        span.start_time = fact.start_time;
        span.end_time = fact.end_time;
        span.parent_span = parent_span.or(span.parent_span);
        span.function = Some(function.id);
        span.application = Some(application.id);
        self.store.save_span(&span).await?;
        self.store
            .merge_edge(Relation::TraceSpan, trace.id, span.id)
            .await?;

        self.refresh_trace_bounds(token, &fact.trace_id).await?;
        Ok(span)
    }

    async fn get_or_create_application(
        &self,
        token: &str,
        name: &str,
    ) -> StructureResult<ApplicationNode> {
        if let Some(application) = self.store.find_application(token, name).await? {
            return Ok(application);
        }

        let root = DirectoryNode::new(self.store.allocate_id(), DYNAMIC_ROOT);
        self.store.save_directory(&root).await?;
        let application = self
            .store
            .merge_application(ApplicationNode {
                id: self.store.allocate_id(),
                token: token.to_string(),
                name: name.to_string(),
                root_directory: root.id,
                repository: None,
            })
            .await?;
        tracing::info!("Discovered application {} from traces", name);
        Ok(application)
    }

    // Spans referenced as parents before their own fact arrives get a
    // placeholder that is completed later.
    async fn get_or_create_span(&self, token: &str, span_id: &str) -> StructureResult<SpanNode> {
        Ok(self
            .store
            .merge_span(SpanNode {
                id: self.store.allocate_id(),
                token: token.to_string(),
                span_id: span_id.to_string(),
                start_time: 0,
                end_time: 0,
                parent_span: None,
                function: None,
                application: None,
            })
            .await?)
    }

    /// `a.b.C.run` places function `run` in file `a/b/C` below the application
    /// root. Without a usable path the function is kept detached.
    async fn place_function(
        &self,
        application: &ApplicationNode,
        fact: &SpanFact,
    ) -> StructureResult<FunctionNode> {
        let token = &fact.landscape_token;
        let segments: Vec<String> = fact
            .function_fqn
            .split('.')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let Some((function_name, file_path)) = segments.split_last() else {
            return Err(StructureError::InvalidArgument(
                "function fqn must not be empty".to_string(),
            ));
        };

        let file = if file_path.is_empty() {
            None
        } else {
            match self
                .traced_file(application, file_path, non_empty(&fact.commit_id), token)
                .await
            {
                Ok(file) => Some(file),
                Err(StructureError::Store(e)) => return Err(StructureError::Store(e)),
                Err(e) => {
                    tracing::warn!(
                        "Could not place {} in application {}: {}",
                        fact.function_fqn,
                        application.name,
                        e
                    );
                    None
                }
            }
        };

        let Some(file) = file else {
            if let Some(existing) = self
                .store
                .find_traced_function(token, &fact.function_fqn)
                .await?
            {
                return Ok(existing);
            }
            return self.new_traced_function(function_name, &fact.function_fqn).await;
        };

        let existing = self.functions_by_name(file.functions.iter().copied()).await?;
        if let Some(id) = existing.get(function_name) {
            if let Some(function) = self.store.get_function(*id).await? {
                return Ok(function);
            }
        }

        let function = self
            .new_traced_function(function_name, &fact.function_fqn)
            .await?;
        self.store
            .merge_edge(Relation::FileFunction, file.id, function.id)
            .await?;
        Ok(function)
    }

    /// File a traced function lives in. A known commit is consulted read-only;
    /// anything not in it is resolved or created outside every commit.
    async fn traced_file(
        &self,
        application: &ApplicationNode,
        file_path: &[String],
        commit_hash: Option<&str>,
        token: &str,
    ) -> StructureResult<FileRevisionNode> {
        if let Some(hash) = commit_hash {
            if let Some(commit) = self.store.find_commit(token, hash).await? {
                let resolution = self
                    .resolver
                    .resolve(
                        application.root_directory,
                        file_path,
                        ResolutionScope::Commit(commit.id),
                    )
                    .await?;
                if let (true, ResolvedNode::File(file)) =
                    (resolution.is_complete(), resolution.existing)
                {
                    return Ok(file);
                }
            }
        }

        self.resolver
            .resolve_or_create(application.root_directory, file_path, ResolutionScope::Unscoped)
            .await
    }

    async fn new_traced_function(&self, name: &str, fqn: &str) -> StructureResult<FunctionNode> {
        let mut function = FunctionNode::new(self.store.allocate_id(), name);
        function.fqn = Some(fqn.to_string());
        self.store.save_function(&function).await?;
        Ok(function)
    }

    /// Recompute trace start/end as min/max over its spans
    async fn refresh_trace_bounds(&self, token: &str, trace_id: &str) -> StructureResult<()> {
        let Some(mut trace) = self.store.find_trace(token, trace_id).await? else {
            return Ok(());
        };

        let mut bounds: Option<(i64, i64)> = None;
        for id in trace.spans.iter() {
            if let Some(span) = self.store.get_span(*id).await? {
                bounds = Some(match bounds {
                    Some((start, end)) => (start.min(span.start_time), end.max(span.end_time)),
                    None => (span.start_time, span.end_time),
                });
            }
        }

        if let Some((start, end)) = bounds {
            if (start, end) != (trace.start_time, trace.end_time) {
                trace.start_time = start;
                trace.end_time = end;
                self.store.save_trace(&trace).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryGraphStore;
    use crate::test_helpers::{commit_fact, repository_state, span_fact};

    fn service() -> (Arc<MemoryGraphStore>, IngestionService) {
        let store = Arc::new(MemoryGraphStore::new());
        (store.clone(), IngestionService::new(store))
    }

    #[test]
    fn test_repository_display_name() {
        assert_eq!(repository_display_name("org/group/myrepo"), "myrepo");
        assert_eq!(repository_display_name("myrepo"), "myrepo");
        assert_eq!(repository_display_name("org/myrepo/"), "myrepo");
    }

    #[tokio::test]
    async fn test_commit_before_repository_state_fails() {
        let (_store, service) = service();
        let fact = commit_fact("myrepo", "commit1", None, &[("1", "src/File1.java")]);
        let result = service.ingest_commit(&fact).await;
        assert!(matches!(result, Err(StructureError::FailedPrecondition(_))));
    }

    #[tokio::test]
    async fn test_repository_state_creates_application_roots() {
        let (store, service) = service();
        let mut state = repository_state("org/myrepo", "main");
        state
            .application_paths
            .insert("backend".to_string(), "services/backend".to_string());
        state.application_paths.insert("whole".to_string(), String::new());

        let response = service.ingest_repository_state(&state).await.unwrap();
        assert_eq!(response.commit_id, "");
        assert_eq!(response.branch_name, "main");

        let repo = store.find_repository("tok", "myrepo").await.unwrap().unwrap();
        let whole = store.find_application("tok", "whole").await.unwrap().unwrap();
        assert_eq!(whole.root_directory, repo.root_directory);

        let backend = store.find_application("tok", "backend").await.unwrap().unwrap();
        let dir = store.get_directory(backend.root_directory).await.unwrap().unwrap();
        assert_eq!(dir.name, "backend");
        assert_eq!(backend.repository, Some(repo.id));
    }

    #[tokio::test]
    async fn test_commit_ingestion_is_idempotent() {
        let (store, service) = service();
        service
            .ingest_repository_state(&repository_state("myrepo", "main"))
            .await
            .unwrap();
        let mut fact = commit_fact("myrepo", "commit1", None, &[("1", "src/File1.java")]);
        fact.tags = vec!["v1".to_string()];

        service.ingest_commit(&fact).await.unwrap();
        let first = store.stats().await;
        let commit = service.ingest_commit(&fact).await.unwrap();
        let second = store.stats().await;

        assert_eq!(first, second);
        assert_eq!(commit.file_revisions.len(), 1);
        assert_eq!(commit.tags.len(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_file_reuses_revision() {
        let (store, service) = service();
        service
            .ingest_repository_state(&repository_state("myrepo", "main"))
            .await
            .unwrap();
        let c1 = service
            .ingest_commit(&commit_fact("myrepo", "c1", None, &[("1", "src/A.java")]))
            .await
            .unwrap();

        let mut second = commit_fact("myrepo", "c2", Some("c1"), &[]);
        second.unchanged_files = vec![FileIdentifier::new("1", "src/A.java")];
        let c2 = service.ingest_commit(&second).await.unwrap();

        assert_eq!(c1.file_revisions, c2.file_revisions);
        assert_eq!(store.stats().await.files, 1);
        let c1_id = store.find_commit("tok", "c1").await.unwrap().unwrap().id;
        assert!(c2.parents.contains(&c1_id));
    }

    #[tokio::test]
    async fn test_modified_file_becomes_sibling_revision() {
        let (store, service) = service();
        service
            .ingest_repository_state(&repository_state("myrepo", "main"))
            .await
            .unwrap();
        let c1 = service
            .ingest_commit(&commit_fact("myrepo", "c1", None, &[("1", "src/A.java")]))
            .await
            .unwrap();

        let mut second = commit_fact("myrepo", "c2", Some("c1"), &[]);
        second.modified_files = vec![FileIdentifier::new("2", "src/A.java")];
        let c2 = service.ingest_commit(&second).await.unwrap();

        assert_ne!(c1.file_revisions, c2.file_revisions);
        let old = store
            .get_file(*c1.file_revisions.iter().next().unwrap())
            .await
            .unwrap()
            .unwrap();
        let new = store
            .get_file(*c2.file_revisions.iter().next().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(old.parent, new.parent);
        assert_eq!(new.hash.as_deref(), Some("2"));
        // myrepo + src
        assert_eq!(store.stats().await.directories, 2);
    }

    #[tokio::test]
    async fn test_parent_none_sentinel_is_ignored() {
        let (store, service) = service();
        service
            .ingest_repository_state(&repository_state("myrepo", "main"))
            .await
            .unwrap();
        let commit = service
            .ingest_commit(&commit_fact("myrepo", "c1", Some("NONE"), &[]))
            .await
            .unwrap();
        assert!(commit.parents.is_empty());
        assert_eq!(store.stats().await.commits, 1);
    }

    #[tokio::test]
    async fn test_empty_file_path_is_rejected() {
        let (_store, service) = service();
        service
            .ingest_repository_state(&repository_state("myrepo", "main"))
            .await
            .unwrap();
        let fact = commit_fact("myrepo", "c1", None, &[("1", "/")]);
        let result = service.ingest_commit(&fact).await;
        assert!(matches!(result, Err(StructureError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_file_detail_unknown_hash_fails() {
        let (_store, service) = service();
        service
            .ingest_repository_state(&repository_state("myrepo", "main"))
            .await
            .unwrap();
        let fact = FileDetailFact {
            landscape_token: "tok".to_string(),
            repository_name: "myrepo".to_string(),
            file_hash: "missing".to_string(),
            ..Default::default()
        };
        let result = service.ingest_file_detail(&fact).await;
        assert!(matches!(result, Err(StructureError::FailedPrecondition(_))));
    }

    #[tokio::test]
    async fn test_file_detail_builds_structure_once() {
        let (store, service) = service();
        service
            .ingest_repository_state(&repository_state("myrepo", "main"))
            .await
            .unwrap();
        service
            .ingest_commit(&commit_fact("myrepo", "c1", None, &[("1", "src/App.java")]))
            .await
            .unwrap();

        let fact = FileDetailFact {
            landscape_token: "tok".to_string(),
            repository_name: "myrepo".to_string(),
            file_hash: "1".to_string(),
            package_name: Some("net.example".to_string()),
            import_names: vec!["java.util.List".to_string()],
            classes: vec![
                ClassData {
                    name: "net.example.Base".to_string(),
                    ..Default::default()
                },
                ClassData {
                    name: "net.example.App".to_string(),
                    super_classes: vec!["net.example.Base".to_string()],
                    fields: vec![FieldData {
                        name: "count".to_string(),
                        type_name: "int".to_string(),
                        modifiers: vec![],
                    }],
                    inner_classes: vec![ClassData {
                        name: "net.example.App.Inner".to_string(),
                        ..Default::default()
                    }],
                    functions: vec![FunctionData {
                        name: "run".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                },
            ],
            functions: vec![FunctionData {
                name: "helper".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };

        assert_eq!(service.ingest_file_detail(&fact).await.unwrap(), 1);
        let after_first = store.stats().await;
        service.ingest_file_detail(&fact).await.unwrap();
        assert_eq!(store.stats().await, after_first);
        assert_eq!(after_first.classes, 3);
        assert_eq!(after_first.functions, 2);

        let repo = store.find_repository("tok", "myrepo").await.unwrap().unwrap();
        let file = &store.find_files_by_hash(repo.id, "1").await.unwrap()[0];
        assert!(file.has_file_data);
        assert_eq!(file.package_name.as_deref(), Some("net.example"));
        assert_eq!(file.classes.len(), 2);
        assert_eq!(file.functions.len(), 1);

        let latest = service
            .ingest_repository_state(&repository_state("myrepo", "main"))
            .await
            .unwrap();
        assert_eq!(latest.commit_id, "c1");
    }

    #[tokio::test]
    async fn test_span_ingestion_is_idempotent() {
        let (store, service) = service();
        let fact = span_fact("trace-1", "span-1", "net.explorviz.helloworld.MyClass.myMethod");

        service.ingest_span(&fact).await.unwrap();
        service.ingest_span(&fact).await.unwrap();

        let stats = store.stats().await;
        assert_eq!(stats.applications, 1);
        assert_eq!(stats.traces, 1);
        assert_eq!(stats.spans, 1);
        assert_eq!(stats.files, 1);
        assert_eq!(stats.functions, 1);

        let application = store.find_application("tok", "app").await.unwrap().unwrap();
        let root = store
            .get_directory(application.root_directory)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.name, DYNAMIC_ROOT);
    }

    #[tokio::test]
    async fn test_span_links_parent_span_and_leaves_commits_alone() {
        let (store, service) = service();
        let mut parent = span_fact("trace-1", "span-1", "net.app.Main.main");
        parent.start_time = 100;
        parent.end_time = 900;
        let mut child = span_fact("trace-1", "span-2", "net.app.Service.call");
        child.parent_span_id = Some("span-1".to_string());
        child.commit_id = Some("c9".to_string());
        child.start_time = 50;
        child.end_time = 200;

        // child arrives first; the parent becomes a placeholder
        let child_span = service.ingest_span(&child).await.unwrap();
        service.ingest_span(&parent).await.unwrap();

        let parent_span = store.find_span("tok", "span-1").await.unwrap().unwrap();
        assert_eq!(child_span.parent_span, Some(parent_span.id));
        assert_eq!(parent_span.start_time, 100);

        // an unknown commit id is neither created nor given the traced file
        assert!(store.find_commit("tok", "c9").await.unwrap().is_none());
        assert_eq!(store.stats().await.files, 2);

        let trace = store.find_trace("tok", "trace-1").await.unwrap().unwrap();
        assert_eq!(trace.spans.len(), 2);
        assert_eq!((trace.start_time, trace.end_time), (50, 900));
    }

    #[tokio::test]
    async fn test_span_reuses_file_of_its_commit() {
        let (store, service) = service();
        let mut state = repository_state("myrepo", "main");
        state
            .application_paths
            .insert("app".to_string(), String::new());
        service.ingest_repository_state(&state).await.unwrap();
        service
            .ingest_commit(&commit_fact("myrepo", "c1", None, &[("1", "src/A")]))
            .await
            .unwrap();
        let files = store.stats().await.files;

        let mut fact = span_fact("trace-1", "span-1", "src.A.run");
        fact.commit_id = Some("c1".to_string());
        service.ingest_span(&fact).await.unwrap();
        let mut again = fact.clone();
        again.span_id = "span-2".to_string();
        service.ingest_span(&again).await.unwrap();

        assert_eq!(store.stats().await.files, files);
        let commit = store.find_commit("tok", "c1").await.unwrap().unwrap();
        assert_eq!(commit.file_revisions.len(), 1);
    }

    #[tokio::test]
    async fn test_span_without_path_keeps_detached_function() {
        let (store, service) = service();
        let fact = span_fact("trace-1", "span-1", "main");

        let first = service.ingest_span(&fact).await.unwrap();
        let mut again = fact.clone();
        again.span_id = "span-2".to_string();
        let second = service.ingest_span(&again).await.unwrap();

        assert_eq!(first.function, second.function);
        assert_eq!(store.stats().await.files, 0);
    }
}
