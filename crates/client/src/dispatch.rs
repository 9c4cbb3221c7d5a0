//! Event dispatch against per-run state.
//!
//! [`dispatch`] takes one classified [`StreamEvent`] and mutates the
//! [`RunState`] for the prompt being tracked. Structured events for
//! other prompt IDs are ignored: the stream is shared across clients
//! and jobs on some deployments.
//!
//! The terminal signal is `executing` with `node: null` for the tracked
//! prompt. `execution_success` corroborates but never ends the loop on
//! its own; an `execution_success` arriving before the final `executing`
//! must not race the loop shut.

use std::collections::HashMap;

use tokio::sync::broadcast;

use comfykit_protocol::messages::MessageKind;
use comfykit_protocol::{ComfyMessage, NodeId, PromptId, StreamEvent};

use crate::events::RunEvent;

/// Which stream events are observed at all.
///
/// `Reduced` drops the high-frequency informational kinds and all
/// binary previews; the terminal-signal kinds (`executing`,
/// `execution_error`, `execution_interrupted`, `execution_success`)
/// are observed under every policy, so correctness never depends on
/// the policy chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ObservabilityPolicy {
    /// Observe every structured and binary kind (verbose).
    #[default]
    Full,
    /// Observe only the kinds needed to track completion and failure.
    Reduced,
}

impl ObservabilityPolicy {
    pub fn observes(&self, kind: MessageKind) -> bool {
        match self {
            Self::Full => true,
            Self::Reduced => matches!(
                kind,
                MessageKind::Executing
                    | MessageKind::ExecutionError
                    | MessageKind::ExecutionInterrupted
                    | MessageKind::ExecutionSuccess
            ),
        }
    }

    /// Binary previews are purely observational and skipped entirely
    /// under the reduced policy.
    pub fn observes_binary(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// Mutable record for one in-flight run. Owned by the run controller
/// for the duration of a single `execute_workflow` call.
#[derive(Debug)]
pub struct RunState {
    pub prompt_id: PromptId,
    /// Accumulated output blobs per node. The live stream never feeds
    /// this today (previews are observational); history reconciliation
    /// fills it in.
    pub outputs: HashMap<NodeId, Vec<Vec<u8>>>,
    /// Set once the canonical terminal signal (or a failure) arrives.
    pub terminal: bool,
    pub failure: Option<RunFailure>,
    /// Whether `execution_start` was seen for this prompt.
    pub started: bool,
    /// Nodes the server skipped via its output cache.
    pub cached_nodes: Vec<NodeId>,
}

impl RunState {
    pub fn new(prompt_id: PromptId) -> Self {
        Self {
            prompt_id,
            outputs: HashMap::new(),
            terminal: false,
            failure: None,
            started: false,
            cached_nodes: Vec::new(),
        }
    }
}

/// Why a run ended in failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunFailure {
    /// The server reported an `execution_error`.
    Error {
        node_id: Option<NodeId>,
        node_type: Option<String>,
        message: String,
    },
    /// The execution was interrupted before finishing.
    Interrupted,
}

/// Apply one classified stream event to the run state.
///
/// Events the policy does not observe are dropped before any effect.
/// Observed informational events are logged and, where useful, re-sent
/// on the broadcast channel; only `executing(node=null)`,
/// `execution_error`, and `execution_interrupted` change `terminal`.
pub fn dispatch(
    event: StreamEvent,
    state: &mut RunState,
    policy: ObservabilityPolicy,
    events: &broadcast::Sender<RunEvent>,
) {
    match event {
        StreamEvent::Message(msg) => {
            if policy.observes(msg.kind()) {
                dispatch_message(msg, state, events);
            }
        }
        StreamEvent::Unknown { kind } => {
            tracing::debug!(kind = %kind, "ignoring unknown message kind");
        }
        StreamEvent::Preview(preview) => {
            if policy.observes_binary() {
                tracing::debug!(
                    format = preview.format,
                    bytes = preview.bytes.len(),
                    "received preview image",
                );
                let _ = events.send(RunEvent::Preview {
                    prompt_id: None,
                    node: None,
                    bytes: preview.bytes,
                });
            }
        }
        StreamEvent::MetadataPreview(preview) => {
            if policy.observes_binary() {
                tracing::debug!(
                    prompt_id = preview.metadata.prompt_id.as_deref().unwrap_or(""),
                    node = preview.metadata.node_id.as_deref().unwrap_or(""),
                    image_type = preview.metadata.image_type.as_deref().unwrap_or(""),
                    bytes = preview.bytes.len(),
                    "received preview image with metadata",
                );
                let _ = events.send(RunEvent::Preview {
                    prompt_id: preview.metadata.prompt_id,
                    node: preview.metadata.node_id,
                    bytes: preview.bytes,
                });
            }
        }
        StreamEvent::NodeText(text) => {
            if policy.observes_binary() {
                tracing::info!(node = %text.node_id, text = %text.text, "node text message");
                let _ = events.send(RunEvent::NodeText {
                    node: text.node_id,
                    text: text.text,
                });
            }
        }
        StreamEvent::Malformed { reason } => {
            tracing::warn!(reason = %reason, "dropping malformed frame");
        }
    }
}

fn dispatch_message(msg: ComfyMessage, state: &mut RunState, events: &broadcast::Sender<RunEvent>) {
    match msg {
        ComfyMessage::Status(data) => {
            tracing::info!(
                queue_remaining = data.status.exec_info.queue_remaining,
                "queue status",
            );
        }
        ComfyMessage::ExecutionStart(data) => {
            if data.prompt_id == state.prompt_id {
                state.started = true;
                tracing::info!(prompt_id = %data.prompt_id, "execution started");
                let _ = events.send(RunEvent::Started {
                    prompt_id: data.prompt_id,
                });
            }
        }
        ComfyMessage::ExecutionCached(data) => {
            if data.prompt_id == state.prompt_id {
                tracing::info!(
                    prompt_id = %data.prompt_id,
                    nodes = ?data.nodes,
                    "nodes served from cache",
                );
                state.cached_nodes = data.nodes;
            }
        }
        ComfyMessage::Executing(data) => {
            if data.prompt_id != state.prompt_id {
                return;
            }
            match data.node {
                Some(node) => {
                    tracing::debug!(prompt_id = %data.prompt_id, node = %node, "executing node");
                    let _ = events.send(RunEvent::NodeStarted {
                        prompt_id: data.prompt_id,
                        node,
                    });
                }
                None => {
                    // node == None is the canonical completion signal.
                    tracing::info!(prompt_id = %data.prompt_id, "execution completed (all nodes done)");
                    state.terminal = true;
                    let _ = events.send(RunEvent::Completed {
                        prompt_id: data.prompt_id,
                    });
                }
            }
        }
        ComfyMessage::Executed(data) => {
            if data.prompt_id == state.prompt_id {
                tracing::debug!(
                    prompt_id = %data.prompt_id,
                    node = %data.node,
                    display_node = data.display_node.as_deref().unwrap_or(""),
                    "node executed with output",
                );
                let _ = events.send(RunEvent::NodeCompleted {
                    prompt_id: data.prompt_id,
                    node: data.node,
                    output: data.output,
                });
            }
        }
        ComfyMessage::Progress(data) => {
            if data
                .prompt_id
                .as_ref()
                .is_some_and(|id| *id != state.prompt_id)
            {
                return;
            }
            tracing::debug!(
                node = data.node.as_deref().unwrap_or(""),
                value = data.value,
                max = data.max,
                "generation progress",
            );
            let _ = events.send(RunEvent::Progress {
                node: data.node,
                value: data.value,
                max: data.max,
            });
        }
        ComfyMessage::ProgressState(data) => {
            if data
                .prompt_id
                .as_ref()
                .is_some_and(|id| *id != state.prompt_id)
            {
                return;
            }
            tracing::debug!(nodes = data.nodes.len(), "progress state snapshot");
        }
        ComfyMessage::ExecutionError(data) => {
            if data.prompt_id != state.prompt_id {
                return;
            }
            tracing::error!(
                prompt_id = %data.prompt_id,
                node_id = data.node_id.as_deref().unwrap_or(""),
                error_type = data.exception_type.as_deref().unwrap_or(""),
                error_message = %data.exception_message,
                "execution error",
            );
            state.terminal = true;
            state.failure = Some(RunFailure::Error {
                node_id: data.node_id,
                node_type: data.node_type,
                message: data.exception_message.clone(),
            });
            let _ = events.send(RunEvent::Failed {
                prompt_id: data.prompt_id,
                error: data.exception_message,
            });
        }
        ComfyMessage::ExecutionInterrupted(data) => {
            if data.prompt_id != state.prompt_id {
                return;
            }
            tracing::error!(
                prompt_id = %data.prompt_id,
                node_id = data.node_id.as_deref().unwrap_or(""),
                "execution interrupted",
            );
            state.terminal = true;
            state.failure = Some(RunFailure::Interrupted);
            let _ = events.send(RunEvent::Failed {
                prompt_id: data.prompt_id,
                error: "interrupted".to_string(),
            });
        }
        ComfyMessage::ExecutionSuccess(data) => {
            if data.prompt_id == state.prompt_id {
                // Corroborating only; the final `executing` event ends the loop.
                tracing::info!(prompt_id = %data.prompt_id, "execution success");
            }
        }
    }
}
