//! Fact ingestion
//!
//! Repository states, commits, file details and spans arrive as
//! self-contained facts and are merged into the graph idempotently.

pub mod facts;
pub mod service;

pub use facts::*;
pub use service::{repository_display_name, IngestionService, DYNAMIC_ROOT};
