//! Wire-format layer for the ComfyUI protocol.
//!
//! Serde types for the HTTP API surface (queue snapshots, submission
//! tickets, history records) and the WebSocket event stream, plus the
//! frame classifier that turns raw text/binary frames into typed
//! [`StreamEvent`]s. This crate performs no I/O.

pub mod frames;
pub mod history;
pub mod messages;
pub mod queue;
pub mod ticket;

pub use frames::{classify, RawFrame, StreamEvent};
pub use messages::{ComfyMessage, MessageKind};

/// ID of a node within a submitted workflow graph.
pub type NodeId = String;

/// Correlation ID for one submitted workflow. May be chosen by the
/// caller at submission time; never reused.
pub type PromptId = String;

/// ID identifying one logical client session to the server. Scopes
/// which stream messages are addressed to us.
pub type ClientId = String;
