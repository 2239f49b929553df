//! nexus-outreach: rate-limited multi-channel outreach with intent gating.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod quota;
pub mod status;
pub mod store;

pub use error::{Error, Result};
