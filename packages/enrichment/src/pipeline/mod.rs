//! Enrichment pipeline stages.
//!
//! The pipeline runs, per posting:
//! - Normalization (raw record → posting, fingerprint)
//! - Language classification
//! - Deduplication against the persistent index
//! - Attribute extraction with schema repair and backoff
//! - Batched persistence to the record log (coordinator)

pub mod classify;
pub mod coordinator;
pub mod dedup;
pub mod extract;
pub mod fingerprint;
pub mod normalize;
pub mod prompts;
pub mod retry;

pub use classify::Classifier;
pub use coordinator::Pipeline;
pub use dedup::DedupIndex;
pub use extract::{parse_attributes, Extraction, Orchestrator};
pub use fingerprint::{fingerprint, DESCRIPTION_PREFIX_CHARS};
pub use normalize::{Clock, FixedClock, Normalizer, SystemClock};
pub use prompts::{
    attributes_schema, extraction_request, repair_request, EXTRACT_PROMPT, REPAIR_PROMPT,
    SYSTEM_PROMPT,
};
pub use retry::{RetryDecision, RetryPolicy};
