//! Topic framing for publish/subscribe transports.
//!
//! A frame is the destination group name, a NUL separator, then the JSON
//! envelope: `[group][0x00][envelope]`. Subscribers filter on the
//! `[group][0x00]` prefix, so one group never matches another that merely
//! starts with the same characters.

use crate::{BroadcastMessage, Error, GroupName};

/// Maximum frame size (4 MB).
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

/// Separator between the topic and the envelope.
pub const TOPIC_SEPARATOR: u8 = 0;

/// Subscription prefix matching every frame addressed to `group`.
pub fn topic_prefix(group: &GroupName) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(group.as_str().len() + 1);
    prefix.extend_from_slice(group.as_str().as_bytes());
    prefix.push(TOPIC_SEPARATOR);
    prefix
}

/// Encode a message addressed to `group`.
pub fn encode_frame(group: &GroupName, message: &BroadcastMessage) -> Result<Vec<u8>, Error> {
    if group.as_str().as_bytes().contains(&TOPIC_SEPARATOR) {
        return Err(Error::InvalidGroupName {
            name: group.to_string(),
            reason: "contains the topic separator".to_string(),
        });
    }

    let envelope = message.to_json()?;
    let mut frame = topic_prefix(group);
    frame.extend_from_slice(&envelope);

    if frame.len() > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessage(format!(
            "frame size {} exceeds maximum {}",
            frame.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    Ok(frame)
}

/// Decode a frame into its destination group and message.
pub fn decode_frame(frame: &[u8]) -> Result<(GroupName, BroadcastMessage), Error> {
    if frame.len() > MAX_MESSAGE_SIZE {
        return Err(Error::InvalidMessage(format!(
            "frame size {} exceeds maximum {}",
            frame.len(),
            MAX_MESSAGE_SIZE
        )));
    }

    let split = frame
        .iter()
        .position(|&b| b == TOPIC_SEPARATOR)
        .ok_or_else(|| Error::InvalidMessage("frame has no topic separator".to_string()))?;

    let group = std::str::from_utf8(&frame[..split])
        .map_err(|e| Error::InvalidMessage(format!("topic is not valid UTF-8: {}", e)))?;
    let message = BroadcastMessage::from_json(&frame[split + 1..])?;

    Ok((GroupName::raw(group), message))
}
