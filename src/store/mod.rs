//! Versioned structure graph
//!
//! Typed node models, the async [`GraphStore`] interface and its in-process
//! arena implementation with JSON snapshot durability.

pub mod memory;
pub mod models;
pub mod traits;

pub use memory::{GraphSnapshot, MemoryGraphStore, StoreStats};
pub use models::*;
pub use traits::{GraphStore, Relation};
