//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON messages over WebSocket with the shape
//! `{"type": "<kind>", "data": {...}}`. This module deserializes them
//! into a strongly-typed [`ComfyMessage`] enum.

use std::collections::HashMap;

use serde::Deserialize;

use crate::{NodeId, PromptId};

/// All known ComfyUI WebSocket message types.
///
/// Deserialized via the internally-tagged `"type"` field with
/// associated `"data"` content.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyMessage {
    /// Server status broadcast (queue depth, etc.).
    #[serde(rename = "status")]
    Status(StatusData),

    /// A prompt has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(ExecutionStartData),

    /// Some nodes were skipped because their outputs are cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A specific node is currently executing (or execution finished when `node` is `None`).
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// A node has finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Progress update from a long-running node (e.g. KSampler).
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// Per-node progress snapshot, broadcast at high frequency.
    #[serde(rename = "progress_state")]
    ProgressState(ProgressStateData),

    /// Execution failed with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ExecutionErrorData),

    /// Execution was interrupted before finishing.
    #[serde(rename = "execution_interrupted")]
    ExecutionInterrupted(ExecutionInterruptedData),

    /// Execution finished successfully. Corroborates completion but the
    /// canonical terminal signal is `executing` with `node: null`.
    #[serde(rename = "execution_success")]
    ExecutionSuccess(ExecutionSuccessData),
}

/// Discriminant for [`ComfyMessage`], used for policy filtering without
/// touching the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Status,
    ExecutionStart,
    ExecutionCached,
    Executing,
    Executed,
    Progress,
    ProgressState,
    ExecutionError,
    ExecutionInterrupted,
    ExecutionSuccess,
}

impl MessageKind {
    /// Map a wire `"type"` string onto a known kind, if any.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "status" => Some(Self::Status),
            "execution_start" => Some(Self::ExecutionStart),
            "execution_cached" => Some(Self::ExecutionCached),
            "executing" => Some(Self::Executing),
            "executed" => Some(Self::Executed),
            "progress" => Some(Self::Progress),
            "progress_state" => Some(Self::ProgressState),
            "execution_error" => Some(Self::ExecutionError),
            "execution_interrupted" => Some(Self::ExecutionInterrupted),
            "execution_success" => Some(Self::ExecutionSuccess),
            _ => None,
        }
    }

    /// The wire `"type"` string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::ExecutionStart => "execution_start",
            Self::ExecutionCached => "execution_cached",
            Self::Executing => "executing",
            Self::Executed => "executed",
            Self::Progress => "progress",
            Self::ProgressState => "progress_state",
            Self::ExecutionError => "execution_error",
            Self::ExecutionInterrupted => "execution_interrupted",
            Self::ExecutionSuccess => "execution_success",
        }
    }
}

impl ComfyMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Status(_) => MessageKind::Status,
            Self::ExecutionStart(_) => MessageKind::ExecutionStart,
            Self::ExecutionCached(_) => MessageKind::ExecutionCached,
            Self::Executing(_) => MessageKind::Executing,
            Self::Executed(_) => MessageKind::Executed,
            Self::Progress(_) => MessageKind::Progress,
            Self::ProgressState(_) => MessageKind::ProgressState,
            Self::ExecutionError(_) => MessageKind::ExecutionError,
            Self::ExecutionInterrupted(_) => MessageKind::ExecutionInterrupted,
            Self::ExecutionSuccess(_) => MessageKind::ExecutionSuccess,
        }
    }
}

/// Queue status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

/// Current queue state.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i64,
}

/// Payload for `execution_start` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStartData {
    pub prompt_id: PromptId,
}

/// Payload for `execution_cached` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: PromptId,
    /// Node IDs whose outputs were served from cache.
    #[serde(default)]
    pub nodes: Vec<NodeId>,
}

/// Payload for `executing` messages.
///
/// When `node` is `None`, execution of the prompt has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<NodeId>,
    pub prompt_id: PromptId,
}

/// Payload for `executed` messages (node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    /// The node that produced this output.
    pub node: NodeId,
    /// UI-facing node ID, when it differs from `node`.
    #[serde(default)]
    pub display_node: Option<NodeId>,
    /// Raw output value (images, filenames, etc.).
    pub output: serde_json::Value,
    pub prompt_id: PromptId,
}

/// Payload for `progress` messages (step-level progress within a node).
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i64,
    /// Total number of steps.
    pub max: i64,
    #[serde(default)]
    pub node: Option<NodeId>,
    #[serde(default)]
    pub prompt_id: Option<PromptId>,
}

/// Payload for `progress_state` messages (bulk per-node state).
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressStateData {
    #[serde(default)]
    pub prompt_id: Option<PromptId>,
    #[serde(default)]
    pub nodes: HashMap<NodeId, serde_json::Value>,
}

/// Payload for `execution_error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionErrorData {
    pub prompt_id: PromptId,
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub node_type: Option<String>,
    pub exception_message: String,
    #[serde(default)]
    pub exception_type: Option<String>,
}

/// Payload for `execution_interrupted` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionInterruptedData {
    pub prompt_id: PromptId,
    #[serde(default)]
    pub node_id: Option<NodeId>,
    #[serde(default)]
    pub node_type: Option<String>,
    /// Nodes that had already finished when the interrupt landed.
    #[serde(default)]
    pub executed: Vec<NodeId>,
}

/// Payload for `execution_success` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionSuccessData {
    pub prompt_id: PromptId,
}

/// Parse a ComfyUI WebSocket text message into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
/// Callers should log unknown types and continue.
pub fn parse_message(text: &str) -> Result<ComfyMessage, serde_json::Error> {
    serde_json::from_str(text)
}
