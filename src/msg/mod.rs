//! Binary wire messages exchanged with terminals and worker processes
//!
//! Format: `[u16 LE type tag][fixed-shape payload]`, no length prefix. The tag
//! alone determines the payload shape, so both ends must agree byte for byte.
//! Inbound bytes are decoded into [`Message`] at the boundary; everything past
//! that point matches on the enum.

mod ids;
mod message;
mod wire;

pub use ids::{ChannelId, ProcessId, ResourceId, TaskId, TerminalId};
pub use message::{
    Message, MessageCharacter, MessageClear, MessageCommandPrompt, MessageKey, MessageMouseButton,
    MessageMousePos, MessageMouseScroll, MessageMoveTerminal, MessagePutChar, MessageSetCharAt,
    MessageTokenizedCommand, MessageType, WirePayload, ACTION_PRESS, ACTION_RELEASE,
    ACTION_REPEAT, KEY_BACKSPACE, KEY_ENTER, KEY_ESCAPE,
};
pub use wire::{WireReader, WireWriter};

use thiserror::Error;

/// Size of the dispatch tag in bytes
pub const TAG_LEN: usize = 2;

/// Sentinel returned by [`get_message_type`] when no tag can be read
pub const TYPE_UNKNOWN: u16 = 0;

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MsgError {
    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload { kind: &'static str, reason: String },

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u16),
}

/// Encode a type tag as it appears on the wire
pub fn encode_type(kind: MessageType) -> [u8; TAG_LEN] {
    kind.tag().to_le_bytes()
}

/// Read the dispatch tag, or [`TYPE_UNKNOWN`] for a buffer too short to hold one
pub fn get_message_type(bytes: &[u8]) -> u16 {
    match bytes.get(..TAG_LEN) {
        Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]),
        _ => TYPE_UNKNOWN,
    }
}

/// Encode a payload with its tag
pub fn serialize<T: WirePayload>(payload: &T) -> Vec<u8> {
    let mut out = WireWriter::new();
    out.u16(T::TYPE.tag());
    payload.write_payload(&mut out);
    out.into_vec()
}

/// Decode a tagged buffer into `T`
///
/// Fails with [`MsgError::MalformedPayload`] if the tag does not belong to `T`
/// or the payload is shorter than `T`'s shape.
pub fn deserialize<T: WirePayload>(bytes: &[u8]) -> Result<T, MsgError> {
    if bytes.len() < TAG_LEN {
        return Err(MsgError::MalformedPayload {
            kind: T::TYPE.name(),
            reason: format!("buffer of {} bytes has no type tag", bytes.len()),
        });
    }

    let tag = get_message_type(bytes);
    if tag != T::TYPE.tag() {
        return Err(MsgError::MalformedPayload {
            kind: T::TYPE.name(),
            reason: format!("tag {} does not match expected {}", tag, T::TYPE.tag()),
        });
    }

    let mut reader = WireReader::new(&bytes[TAG_LEN..], T::TYPE.name());
    T::read_payload(&mut reader)
}

/// Decode where the caller has already checked the tag
///
/// # Panics
///
/// Panics if the payload cannot be decoded. Only for buffers whose type has been
/// validated; untrusted input goes through [`deserialize`] or [`Message::decode`].
pub fn must_deserialize<T: WirePayload>(bytes: &[u8]) -> T {
    match deserialize(bytes) {
        Ok(payload) => payload,
        Err(e) => panic!("payload validated as {} failed to decode: {}", T::TYPE.name(), e),
    }
}
