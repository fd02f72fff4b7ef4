//! ---
//! hmc_section: "02-messaging-core"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Message envelope, kind, and priority definitions."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use strum::{EnumCount, EnumIter};

/// Closed set of message kinds understood by the backend.
///
/// The dispatch table of [`crate::MessageBus`] is sized statically from this
/// enum via [`strum::EnumCount`], so adding a variant automatically widens
/// the table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumCount,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// The content-management UI changed the media configuration.
    ContentConfUpdated = 0,
    /// Request to rebuild the image cache.
    RebuildImageCache = 1,
    /// Request to rebuild the music cache.
    RebuildMusicCache = 2,
    /// Request to rebuild the video cache.
    RebuildVideoCache = 3,
}

impl MessageKind {
    /// Index of this kind in the bus dispatch table.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Ordering key for handler dispatch. Lower values are served first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    /// Served before all other priorities.
    VeryHigh = 0,
    /// Served after very-high handlers.
    High = 10,
    /// Default priority.
    Normal = 20,
    /// Served after normal handlers.
    Low = 30,
    /// Served last.
    VeryLow = 40,
}

/// Kind-to-priority map a subscriber hands to the bus at registration time.
///
/// The same structure doubles as the handshake payload of the wire protocol,
/// see [`crate::codec`].
pub type SubscriptionMap = BTreeMap<MessageKind, MessagePriority>;

/// Immutable envelope exchanged between backend components.
///
/// The payload is opaque to the messaging core; its semantics belong entirely
/// to senders and receivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<JsonValue>,
}

impl Message {
    /// Construct a message without payload.
    pub fn new(kind: MessageKind) -> Self {
        Self { kind, data: None }
    }

    /// Construct a message carrying an opaque payload.
    pub fn with_data(kind: MessageKind, data: JsonValue) -> Self {
        Self {
            kind,
            data: Some(data),
        }
    }

    /// Kind of this message.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Optional opaque payload.
    pub fn data(&self) -> Option<&JsonValue> {
        self.data.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn kinds_serialize_as_snake_case_strings() {
        let json = serde_json::to_string(&MessageKind::RebuildMusicCache).expect("serialize kind");
        assert_eq!(json, "\"rebuild_music_cache\"");
    }

    #[test]
    fn kind_indexes_cover_the_dispatch_table() {
        let mut seen = vec![false; MessageKind::COUNT];
        for kind in MessageKind::iter() {
            assert!(kind.index() < MessageKind::COUNT);
            seen[kind.index()] = true;
        }
        assert!(seen.iter().all(|s| *s), "every table slot must be reachable");
    }

    #[test]
    fn priorities_order_from_very_high_to_very_low() {
        assert!(MessagePriority::VeryHigh < MessagePriority::High);
        assert!(MessagePriority::High < MessagePriority::Normal);
        assert!(MessagePriority::Normal < MessagePriority::Low);
        assert!(MessagePriority::Low < MessagePriority::VeryLow);
    }

    #[test]
    fn message_roundtrips_with_and_without_payload() {
        let plain = Message::new(MessageKind::RebuildImageCache);
        let json = serde_json::to_string(&plain).expect("serialize message");
        assert!(!json.contains("data"), "absent payload is omitted: {json}");
        let back: Message = serde_json::from_str(&json).expect("deserialize message");
        assert_eq!(back, plain);

        let rich = Message::with_data(
            MessageKind::ContentConfUpdated,
            serde_json::json!({ "folders": ["/media/music"] }),
        );
        let json = serde_json::to_string(&rich).expect("serialize message");
        let back: Message = serde_json::from_str(&json).expect("deserialize message");
        assert_eq!(back.kind(), MessageKind::ContentConfUpdated);
        assert_eq!(back.data(), rich.data());
    }
}
