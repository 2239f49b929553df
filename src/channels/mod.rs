//! Outreach channels: the closed channel set, send capabilities and the
//! capability table that binds them to quota limits.

pub mod channel;
pub mod email;
pub mod registry;
pub mod relay;
pub mod sender;

pub use channel::{Channel, ChannelLimits};
pub use email::{EmailSender, SmtpConfig};
pub use registry::{Capability, CapabilityTable};
pub use relay::{RelayConfig, RelaySender};
pub use sender::{OutreachMessage, OutreachSender};
