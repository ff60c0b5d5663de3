//! Branch reconstruction from commit facts.

use crate::structure::commits::{DEFAULT_BRANCH, NO_PARENT};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Branch and commit a branch was forked from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchPoint {
    /// Branch of the forked-from commit
    pub name: String,
    pub commit_id: String,
}

impl BranchPoint {
    /// Sentinel for branches that start from nothing: `{"name": "NONE", "commitId": ""}`
    pub fn none() -> Self {
        Self {
            name: NO_PARENT.to_string(),
            commit_id: String::new(),
        }
    }
}

/// Ordered commits of one branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchView {
    pub name: String,
    pub commits: Vec<String>,
    pub branch_point: BranchPoint,
}

/// Input row: one commit with its branch and parents (in recorded order)
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub hash: String,
    pub commit_date: Option<DateTime<Utc>>,
    pub branch: Option<String>,
    pub parents: Vec<String>,
}

struct BranchDraft {
    name: String,
    commits: Vec<String>,
    point: Option<BranchPoint>,
}

/// Builds per-branch views and branch points.
///
/// Commits are visited by commit date, then hash; commits without a date go
/// first. For every branch the first commit that either has no parent or
/// whose parent lives on a different branch fixes its branch point. Branches
/// come out in the order of their earliest commit.
pub struct CommitTreeBuilder;

impl CommitTreeBuilder {
    /// `branch_of` resolves branches of parents that are not in `commits`;
    /// anything still unknown counts as the default branch.
    pub fn build_tree(
        commits: &[CommitRecord],
        branch_of: &HashMap<String, String>,
    ) -> Vec<BranchView> {
        let known: HashMap<&str, &str> = commits
            .iter()
            .filter_map(|c| c.branch.as_deref().map(|b| (c.hash.as_str(), b)))
            .collect();
        let lookup = |hash: &str| -> String {
            known
                .get(hash)
                .map(|b| b.to_string())
                .or_else(|| branch_of.get(hash).cloned())
                .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
        };

        let mut ordered: Vec<&CommitRecord> = commits.iter().collect();
        ordered.sort_by(|a, b| (a.commit_date, &a.hash).cmp(&(b.commit_date, &b.hash)));

        let mut drafts: Vec<BranchDraft> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for commit in ordered {
            let branch = commit.branch.as_deref().unwrap_or(DEFAULT_BRANCH);
            let position = *positions.entry(branch.to_string()).or_insert_with(|| {
                drafts.push(BranchDraft {
                    name: branch.to_string(),
                    commits: Vec::new(),
                    point: None,
                });
                drafts.len() - 1
            });
            let draft = &mut drafts[position];
            draft.commits.push(commit.hash.clone());

            if draft.point.is_some() {
                continue;
            }
            if commit.parents.is_empty() {
                draft.point = Some(BranchPoint::none());
                continue;
            }
            draft.point = commit.parents.iter().find_map(|parent| {
                let parent_branch = lookup(parent);
                (parent_branch != branch).then(|| BranchPoint {
                    name: parent_branch,
                    commit_id: parent.clone(),
                })
            });
        }

        drafts
            .into_iter()
            .map(|d| BranchView {
                name: d.name,
                commits: d.commits,
                branch_point: d.point.unwrap_or_else(BranchPoint::none),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(hash: &str, day: u32, branch: Option<&str>, parents: &[&str]) -> CommitRecord {
        CommitRecord {
            hash: hash.to_string(),
            commit_date: Some(Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()),
            branch: branch.map(str::to_string),
            parents: parents.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_linear_history_on_main() {
        let commits = vec![
            record("commit2", 2, Some("main"), &["commit1"]),
            record("commit1", 1, Some("main"), &[]),
        ];
        let tree = CommitTreeBuilder::build_tree(&commits, &HashMap::new());

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].name, "main");
        assert_eq!(tree[0].commits, vec!["commit1", "commit2"]);
        assert_eq!(tree[0].branch_point, BranchPoint::none());
    }

    #[test]
    fn test_feature_branch_points_at_fork() {
        let commits = vec![
            record("a", 1, Some("main"), &[]),
            record("b", 2, Some("main"), &["a"]),
            record("f1", 3, Some("feature"), &["b"]),
            record("f2", 4, Some("feature"), &["f1"]),
        ];
        let tree = CommitTreeBuilder::build_tree(&commits, &HashMap::new());

        assert_eq!(tree.len(), 2);
        let feature = &tree[1];
        assert_eq!(feature.name, "feature");
        assert_eq!(feature.commits, vec!["f1", "f2"]);
        assert_eq!(
            feature.branch_point,
            BranchPoint {
                name: "main".to_string(),
                commit_id: "b".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_branch_defaults_to_main() {
        let commits = vec![record("a", 1, None, &[])];
        let tree = CommitTreeBuilder::build_tree(&commits, &HashMap::new());
        assert_eq!(tree[0].name, "main");
    }

    #[test]
    fn test_parent_outside_input_uses_lookup() {
        let commits = vec![record("f1", 5, Some("feature"), &["old"])];
        let mut branch_of = HashMap::new();
        branch_of.insert("old".to_string(), "release".to_string());

        let tree = CommitTreeBuilder::build_tree(&commits, &branch_of);
        assert_eq!(tree[0].branch_point.commit_id, "old");
        assert_eq!(tree[0].branch_point.name, "release");
    }

    #[test]
    fn test_first_branch_point_wins() {
        // m1 is a merge commit from "other" on a branch whose point is already set
        let commits = vec![
            record("root", 1, Some("main"), &[]),
            record("o1", 2, Some("other"), &["root"]),
            record("m1", 3, Some("main"), &["root", "o1"]),
        ];
        let tree = CommitTreeBuilder::build_tree(&commits, &HashMap::new());
        assert_eq!(tree[0].name, "main");
        assert_eq!(tree[0].branch_point, BranchPoint::none());
    }

    #[test]
    fn test_equal_dates_are_ordered_by_hash() {
        let commits = vec![
            record("bbb", 1, Some("main"), &[]),
            record("aaa", 1, Some("main"), &[]),
        ];
        let first = CommitTreeBuilder::build_tree(&commits, &HashMap::new());
        let reversed: Vec<CommitRecord> = commits.into_iter().rev().collect();
        let second = CommitTreeBuilder::build_tree(&reversed, &HashMap::new());

        assert_eq!(first, second);
        assert_eq!(first[0].commits, vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_branch_point_serializes_camel_case() {
        let view = BranchView {
            name: "main".to_string(),
            commits: vec![],
            branch_point: BranchPoint::none(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(
            json["branchPoint"],
            serde_json::json!({"name": "NONE", "commitId": ""})
        );

        let fork = serde_json::to_value(BranchPoint {
            name: "main".to_string(),
            commit_id: "b".to_string(),
        })
        .unwrap();
        assert_eq!(fork, serde_json::json!({"name": "main", "commitId": "b"}));
    }
}
