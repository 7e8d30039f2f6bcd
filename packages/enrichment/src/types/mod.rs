//! Domain types for the enrichment pipeline.

pub mod attributes;
pub mod config;
pub mod posting;
pub mod raw;
pub mod result;
