//! Fact builders and seeded scenarios for unit tests
#![allow(dead_code)]

use crate::ingest::*;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;

pub const TOKEN: &str = "tok";

/// `minutes` after a fixed base instant
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap() + Duration::minutes(minutes)
}

// ============================================================================
// Fact builders
// ============================================================================

pub fn repository_state(repository: &str, branch: &str) -> RepositoryState {
    RepositoryState {
        landscape_token: TOKEN.to_string(),
        repository_name: repository.to_string(),
        branch_name: branch.to_string(),
        application_paths: BTreeMap::new(),
    }
}

/// Commit on `main` adding `added` as (hash, path) pairs
pub fn commit_fact(
    repository: &str,
    hash: &str,
    parent: Option<&str>,
    added: &[(&str, &str)],
) -> CommitFact {
    CommitFact {
        landscape_token: TOKEN.to_string(),
        repository_name: repository.to_string(),
        branch_name: "main".to_string(),
        commit_hash: hash.to_string(),
        parent_commit_hash: parent.map(str::to_string),
        author: Some("alice".to_string()),
        author_date: None,
        commit_date: None,
        tags: Vec::new(),
        added_files: added
            .iter()
            .map(|(hash, path)| FileIdentifier::new(hash, path))
            .collect(),
        modified_files: Vec::new(),
        unchanged_files: Vec::new(),
    }
}

pub fn file_detail(repository: &str, hash: &str) -> FileDetailFact {
    FileDetailFact {
        landscape_token: TOKEN.to_string(),
        repository_name: repository.to_string(),
        file_hash: hash.to_string(),
        package_name: Some("net.example".to_string()),
        ..Default::default()
    }
}

/// Span of application `app`
pub fn span_fact(trace_id: &str, span_id: &str, function_fqn: &str) -> SpanFact {
    SpanFact {
        landscape_token: TOKEN.to_string(),
        application_name: "app".to_string(),
        trace_id: trace_id.to_string(),
        span_id: span_id.to_string(),
        parent_span_id: None,
        function_fqn: function_fqn.to_string(),
        start_time: 1_000,
        end_time: 2_000,
        commit_id: None,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

/// `myrepo` on `main` with application `app` at the repository root:
/// - `commit1` adds src/File1.java (1) and src/File2.java (2)
/// - `commit2` modifies 1 -> 11, adds src/File3.java (3), keeps 2
pub async fn ingest_scenario(service: &IngestionService) {
    let mut state = repository_state("myrepo", "main");
    state
        .application_paths
        .insert("app".to_string(), String::new());
    service.ingest_repository_state(&state).await.unwrap();

    let mut first = commit_fact(
        "myrepo",
        "commit1",
        None,
        &[("1", "src/File1.java"), ("2", "src/File2.java")],
    );
    first.commit_date = Some(at(0));
    service.ingest_commit(&first).await.unwrap();

    let mut second = commit_fact("myrepo", "commit2", Some("commit1"), &[("3", "src/File3.java")]);
    second.commit_date = Some(at(10));
    second.modified_files = vec![FileIdentifier::new("11", "src/File1.java")];
    second.unchanged_files = vec![FileIdentifier::new("2", "src/File2.java")];
    service.ingest_commit(&second).await.unwrap();
}
