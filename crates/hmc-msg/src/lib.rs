//! ---
//! hmc_section: "02-messaging-core"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Message bus, scheduler, and wire codec primitives."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
#![warn(missing_docs)]

pub mod bus;
pub mod codec;
pub mod generator;
pub mod scheduler;
pub mod types;

/// Shared result type for messaging operations.
pub type Result<T> = std::result::Result<T, MessagingError>;

/// Errors produced by the messaging primitives.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    /// Wrapper for JSON serialization or deserialization problems on the wire.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub use bus::{MessageBus, MessageHandler};
pub use codec::{
    decode_subscriptions, encode_frame, encode_subscriptions, FrameDecoder, SENTINEL,
};
pub use generator::MessageGenerator;
pub use scheduler::MessageScheduler;
pub use types::{Message, MessageKind, MessagePriority, SubscriptionMap};
