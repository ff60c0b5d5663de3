//! Versioned structure core
//!
//! - [`resolver`] - longest-prefix path resolution and suffix creation
//! - [`commits`] - repository/branch/commit/tag get-or-create
//! - [`loader`] - bounded-depth hydration of one commit
//! - [`tree`] - per-branch commit lists and branch points
//! - [`projector`] - hydrated commits to [`landscape::FlatLandscape`]

pub mod commits;
pub mod error;
pub mod landscape;
pub mod loader;
pub mod projector;
pub mod resolver;
pub mod tree;

pub use commits::{CommitGraph, DEFAULT_BRANCH, NO_PARENT};
pub use error::{StructureError, StructureResult};
pub use landscape::FlatLandscape;
pub use loader::{HydratedClass, HydratedCommit, HydratedFile, VersionedLoader};
pub use projector::StructureProjector;
pub use resolver::{split_path, PathResolution, PathResolver, ResolutionScope, ResolvedNode};
pub use tree::{BranchPoint, BranchView, CommitRecord, CommitTreeBuilder};
