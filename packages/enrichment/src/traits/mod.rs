//! Core trait abstractions for the enrichment library.
//!
//! These traits are the seams where applications plug in model backends,
//! language models, and storage.

pub mod backend;
pub mod language;
pub mod store;
