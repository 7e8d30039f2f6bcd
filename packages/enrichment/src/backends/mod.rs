//! Extraction backend implementations.
//!
//! - `CloudBackend` - OpenAI-compatible chat completions
//! - `LocalBackend` - Ollama-compatible local server
//! - `RateLimitedBackend` - wrapper enforcing a request rate

pub mod local;
pub mod openai;
pub mod rate_limited;

pub use local::LocalBackend;
pub use openai::CloudBackend;
pub use rate_limited::RateLimitedBackend;
