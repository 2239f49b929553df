//! Send capability: one implementation per channel kind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// A rendered outreach message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutreachMessage {
    /// Subject line (email only; other channels ignore it).
    pub subject: Option<String>,
    pub body: String,
}

impl OutreachMessage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            subject: None,
            body: body.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

/// Delivers a message to a target on one channel.
///
/// Pure I/O: quota accounting, retries and channel rotation belong to the
/// dispatch controller. Implementations must not retry internally.
#[async_trait]
pub trait OutreachSender: Send + Sync {
    /// Sender name for logging (e.g. "smtp", "relay:twitter").
    fn name(&self) -> &str;

    /// Deliver `message` to `target` (email address or platform handle).
    async fn send(&self, target: &str, message: &OutreachMessage) -> Result<(), ChannelError>;
}
