//! ---
//! hmc_section: "02-messaging-core"
//! hmc_subsection: "module"
//! hmc_type: "source"
//! hmc_scope: "code"
//! hmc_description: "Line-oriented wire codec shared by server and proxy."
//! hmc_version: "v0.1.0-alpha"
//! hmc_owner: "tbd"
//! ---
//! The protocol is line-oriented and symmetric. After the two handshake
//! lines (client name, subscription map) each side sends frames at will: the
//! serialized message, a newline, then a line holding only [`SENTINEL`].

use crate::types::{Message, SubscriptionMap};
use crate::Result;

/// Literal line terminating one message frame.
pub const SENTINEL: &str = "END_OF_MESSAGE_OBJECT";

/// Serialize a message into one wire frame, sentinel included.
pub fn encode_frame(message: &Message) -> Result<String> {
    Ok(format!("{}\n{SENTINEL}\n", serde_json::to_string(message)?))
}

/// Serialize a subscription map into its handshake line.
pub fn encode_subscriptions(subscriptions: &SubscriptionMap) -> Result<String> {
    Ok(format!("{}\n", serde_json::to_string(subscriptions)?))
}

/// Parse the handshake subscription line sent by a peer.
pub fn decode_subscriptions(line: &str) -> Result<SubscriptionMap> {
    Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
}

/// Incremental frame reassembler fed one line at a time.
///
/// Lines before the sentinel are accumulated; the sentinel line closes the
/// frame and yields the decoded message. A decode failure clears the buffer
/// so the caller can tear the connection down without poisoning a later use.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: String,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (with or without its trailing newline). Returns a
    /// message when the line completed a frame.
    pub fn push_line(&mut self, line: &str) -> Result<Option<Message>> {
        let content = line.trim_end_matches(['\r', '\n']);
        if content == SENTINEL {
            let decoded = serde_json::from_str(&self.buffer);
            self.buffer.clear();
            return Ok(Some(decoded?));
        }
        self.buffer.push_str(content);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageKind, MessagePriority};

    #[test]
    fn frame_roundtrip_preserves_kind_and_data() {
        let message = Message::with_data(
            MessageKind::RebuildMusicCache,
            serde_json::json!({ "reason": "library edit" }),
        );
        let frame = encode_frame(&message).expect("encode frame");

        let mut decoder = FrameDecoder::new();
        let mut decoded = None;
        for line in frame.lines() {
            if let Some(message) = decoder.push_line(line).expect("valid frame") {
                decoded = Some(message);
            }
        }
        assert_eq!(decoded.expect("frame completed"), message);
    }

    #[test]
    fn garbage_before_sentinel_is_a_decode_error() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push_line("not json at all\n").expect("buffered").is_none());
        assert!(decoder.push_line("END_OF_MESSAGE_OBJECT\n").is_err());

        // The buffer was cleared, a following well-formed frame still decodes.
        let frame = encode_frame(&Message::new(MessageKind::RebuildImageCache)).expect("encode");
        let mut decoded = None;
        for line in frame.lines() {
            if let Some(message) = decoder.push_line(line).expect("valid frame") {
                decoded = Some(message);
            }
        }
        assert_eq!(
            decoded.expect("frame completed").kind(),
            MessageKind::RebuildImageCache
        );
    }

    #[test]
    fn subscription_line_roundtrip() {
        let mut map = SubscriptionMap::new();
        map.insert(MessageKind::ContentConfUpdated, MessagePriority::VeryHigh);
        map.insert(MessageKind::RebuildVideoCache, MessagePriority::High);

        let line = encode_subscriptions(&map).expect("encode subscriptions");
        assert!(line.ends_with('\n'));
        let back = decode_subscriptions(&line).expect("decode subscriptions");
        assert_eq!(back, map);
    }

    #[test]
    fn empty_subscription_map_is_valid() {
        let line = encode_subscriptions(&SubscriptionMap::new()).expect("encode subscriptions");
        assert_eq!(line, "{}\n");
        assert!(decode_subscriptions(&line).expect("decode").is_empty());
    }
}
