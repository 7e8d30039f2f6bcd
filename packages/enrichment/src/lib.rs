//! Job Posting Enrichment Library
//!
//! Takes raw job postings from a scraper, normalizes them, tags their
//! language, drops postings already seen in earlier runs, and asks a language
//! model for structured hiring attributes (seniority, remote policy, skills,
//! salary range).
//!
//! # Design Philosophy
//!
//! - Identity is the content fingerprint, not the listing site's id
//! - Recorded before extracted: a crash never causes a double extraction
//! - Per-posting failures are counted, never fatal
//! - Models sit behind traits; the pipeline never knows which one it has
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use enrichment::{
//!     Classifier, DedupIndex, JsonlRecordLog, JsonlSeenStore, Normalizer, Orchestrator,
//!     Pipeline, PipelineConfig, WhatlangModel, ExtractionConfig,
//! };
//! use enrichment::testing::MockBackend;
//!
//! let classifier = Classifier::new(Arc::new(WhatlangModel::new()));
//! let orchestrator = Orchestrator::new(Arc::new(MockBackend::new()), ExtractionConfig::default());
//! let pipeline = Pipeline::new(Normalizer::new(), classifier, PipelineConfig::default())
//!     .with_orchestrator(orchestrator);
//!
//! let mut index = DedupIndex::load(Box::new(JsonlSeenStore::in_dir("output")))?;
//! let mut log = JsonlRecordLog::in_dir("output");
//! let result = pipeline.run(records, &mut index, &mut log).await?;
//! println!("{} extracted", result.counts.extracted);
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Core trait abstractions (ExtractionBackend, LanguageModel, stores)
//! - [`types`] - Postings, attributes, configuration and run results
//! - [`pipeline`] - Normalize, classify, dedup and extract stages plus the coordinator
//! - [`backends`] - Cloud and local extraction backends, rate limiting
//! - [`detectors`] - Language model implementations
//! - [`stores`] - Dedup index and record log storage (JSONL, memory)
//! - [`report`] - Flat report rows
//! - [`security`] - Credential handling
//! - [`testing`] - Mock implementations for testing

pub mod backends;
pub mod detectors;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod security;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use backends::{CloudBackend, LocalBackend, RateLimitedBackend};
pub use detectors::WhatlangModel;
pub use error::{
    BackendError, BackendResult, EnrichmentError, ExtractError, RecordError, Result, RunAborted,
};
pub use pipeline::{
    Classifier, DedupIndex, Extraction, FixedClock, Normalizer, Orchestrator, Pipeline,
    RetryPolicy, SystemClock,
};
pub use report::{column_title, Row, COLUMNS};
pub use security::{ApiFlavor, BackendCredentials, SecretString};
pub use stores::{JsonlRecordLog, JsonlSeenStore, MemoryRecordLog, MemorySeenStore};
pub use traits::{
    backend::{Completion, CompletionRequest, ExtractionBackend},
    language::{LanguageModel, Prediction},
    store::{IndexEntry, RecordLog, SeenStore},
};
pub use types::{
    attributes::{RemotePolicy, Seniority, StructuredAttributes},
    config::{
        ClassifierConfig, ExperienceLevel, ExtractionConfig, JobType, PipelineConfig,
        SearchSettings,
    },
    posting::{JobCriteria, LanguageTag, Posting, PostingStatus},
    raw::RawPosting,
    result::{EnrichmentResult, FailureKind, ItemFailure, RunCounts, RunSummary},
};
