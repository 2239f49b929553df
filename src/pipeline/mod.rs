//! Lead pipeline.
//!
//! Campaign keywords flow through:
//! 1. `LeadPipeline::discover()`: one search per channel, canonical-URL dedup
//! 2. `IntentGate::evaluate()`: oracle scoring, fail-closed threshold
//! 3. `compose()` / `target_for()`: message and address per channel
//!
//! Dispatch itself lives in `crate::dispatch`.

pub mod compose;
pub mod contact;
pub mod discovery;
pub mod gate;
pub mod search;
pub mod types;

pub use discovery::{LeadPipeline, canonical_url};
pub use gate::{IntentGate, OracleVerdict, ScoringOracle};
pub use search::{GoogleSearchConfig, GoogleSearcher, RetryPolicy, WebSearcher};
pub use types::{Campaign, Lead, LeadStatus, RunSummary, ScoredResult, SearchHit};
