//! Storage implementations for the enrichment library.
//!
//! Available backends:
//! - `MemorySeenStore` / `MemoryRecordLog` - in-memory (tests, development)
//! - `JsonlSeenStore` / `JsonlRecordLog` - JSON-lines files on disk

pub mod jsonl;
pub mod memory;

pub use jsonl::{JsonlRecordLog, JsonlSeenStore};
pub use memory::{MemoryRecordLog, MemorySeenStore};
