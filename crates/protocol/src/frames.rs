//! Frame classification for the mixed JSON/binary event stream.
//!
//! ComfyUI interleaves UTF-8 text frames (JSON envelopes, see
//! [`crate::messages`]) with binary frames carrying preview images and
//! node text. Binary frames start with a 4-byte big-endian type tag
//! followed by a tag-specific payload.
//!
//! [`classify`] is total: anything it cannot decode becomes
//! [`StreamEvent::Malformed`], which callers log and drop. A broken
//! frame must never abort a run.

use serde::Deserialize;

use crate::messages::{parse_message, ComfyMessage, MessageKind};
use crate::{NodeId, PromptId};

/// Binary wire tag: preview image (4-byte image-format tag + raw bytes).
pub const TAG_PREVIEW_IMAGE: u32 = 1;
/// Binary wire tag: preview image with a length-prefixed JSON metadata blob.
pub const TAG_METADATA_PREVIEW_IMAGE: u32 = 2;
/// Binary wire tag: length-prefixed node ID followed by UTF-8 text.
pub const TAG_TEXT_MESSAGE: u32 = 3;

/// One raw frame as received from the WebSocket, before interpretation.
#[derive(Debug, Clone)]
pub enum RawFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// A classified stream frame.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A structured message of a known kind.
    Message(ComfyMessage),
    /// A structured message of an unrecognized kind. Tolerated and ignored.
    Unknown { kind: String },
    /// A binary preview image (tag 1).
    Preview(PreviewImage),
    /// A binary preview image with JSON metadata (tag 2).
    MetadataPreview(MetadataPreview),
    /// A binary per-node text message (tag 3).
    NodeText(NodeText),
    /// A frame that could not be decoded. Non-fatal; logged and dropped.
    Malformed { reason: String },
}

/// Decoded payload of a tag-1 preview frame.
#[derive(Debug, Clone)]
pub struct PreviewImage {
    /// Image-format tag as sent by the server (1 = JPEG, 2 = PNG).
    pub format: u32,
    pub bytes: Vec<u8>,
}

/// Decoded payload of a tag-2 preview frame.
#[derive(Debug, Clone)]
pub struct MetadataPreview {
    pub metadata: PreviewMetadata,
    pub bytes: Vec<u8>,
}

/// JSON metadata blob carried by tag-2 preview frames.
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewMetadata {
    #[serde(default)]
    pub prompt_id: Option<PromptId>,
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub image_type: Option<String>,
}

/// Decoded payload of a tag-3 text frame.
#[derive(Debug, Clone)]
pub struct NodeText {
    pub node_id: NodeId,
    pub text: String,
}

/// Classify one raw stream frame.
pub fn classify(frame: &RawFrame) -> StreamEvent {
    match frame {
        RawFrame::Text(text) => classify_text(text),
        RawFrame::Binary(bytes) => classify_binary(bytes),
    }
}

/// Minimal envelope used to salvage the `"type"` field from a text
/// frame that failed full parsing.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

fn classify_text(text: &str) -> StreamEvent {
    match parse_message(text) {
        Ok(msg) => StreamEvent::Message(msg),
        Err(parse_err) => match serde_json::from_str::<Envelope>(text) {
            // The kind is known but its payload did not deserialize.
            Ok(envelope) if MessageKind::parse(&envelope.kind).is_some() => {
                StreamEvent::Malformed {
                    reason: format!("bad payload for `{}` message: {parse_err}", envelope.kind),
                }
            }
            Ok(envelope) => StreamEvent::Unknown {
                kind: envelope.kind,
            },
            Err(_) => StreamEvent::Malformed {
                reason: format!("invalid JSON envelope: {parse_err}"),
            },
        },
    }
}

fn classify_binary(bytes: &[u8]) -> StreamEvent {
    let Some(tag) = read_u32_be(bytes) else {
        return StreamEvent::Malformed {
            reason: "binary frame shorter than 4-byte type tag".into(),
        };
    };
    let payload = &bytes[4..];

    match tag {
        TAG_PREVIEW_IMAGE => {
            let Some(format) = read_u32_be(payload) else {
                return StreamEvent::Malformed {
                    reason: "preview image frame missing format tag".into(),
                };
            };
            StreamEvent::Preview(PreviewImage {
                format,
                bytes: payload[4..].to_vec(),
            })
        }
        TAG_METADATA_PREVIEW_IMAGE => {
            let Some(len) = read_u32_be(payload) else {
                return StreamEvent::Malformed {
                    reason: "metadata preview frame missing length prefix".into(),
                };
            };
            let len = len as usize;
            if payload.len() < 4 + len {
                return StreamEvent::Malformed {
                    reason: format!(
                        "metadata length {len} exceeds remaining payload {}",
                        payload.len().saturating_sub(4)
                    ),
                };
            }
            match serde_json::from_slice::<PreviewMetadata>(&payload[4..4 + len]) {
                Ok(metadata) => StreamEvent::MetadataPreview(MetadataPreview {
                    metadata,
                    bytes: payload[4 + len..].to_vec(),
                }),
                Err(e) => StreamEvent::Malformed {
                    reason: format!("preview metadata is not valid JSON: {e}"),
                },
            }
        }
        TAG_TEXT_MESSAGE => {
            let Some(len) = read_u32_be(payload) else {
                return StreamEvent::Malformed {
                    reason: "text message frame missing node-id length prefix".into(),
                };
            };
            let len = len as usize;
            if payload.len() < 4 + len {
                return StreamEvent::Malformed {
                    reason: format!(
                        "node-id length {len} exceeds remaining payload {}",
                        payload.len().saturating_sub(4)
                    ),
                };
            }
            let node_id = match std::str::from_utf8(&payload[4..4 + len]) {
                Ok(s) => s,
                Err(_) => {
                    return StreamEvent::Malformed {
                        reason: "text message node ID is not UTF-8".into(),
                    }
                }
            };
            let text = match std::str::from_utf8(&payload[4 + len..]) {
                Ok(s) => s,
                Err(_) => {
                    return StreamEvent::Malformed {
                        reason: "text message body is not UTF-8".into(),
                    }
                }
            };
            StreamEvent::NodeText(NodeText {
                node_id: node_id.to_string(),
                text: text.to_string(),
            })
        }
        other => StreamEvent::Malformed {
            reason: format!("unknown binary message tag {other}"),
        },
    }
}

fn read_u32_be(bytes: &[u8]) -> Option<u32> {
    let chunk: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_be_bytes(chunk))
}
