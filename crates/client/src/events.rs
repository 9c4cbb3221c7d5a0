//! Run events broadcast to observers.
//!
//! The dispatcher re-emits what it observes on a
//! [`tokio::sync::broadcast`] channel so callers can watch progress and
//! live previews without touching the run's state machine. Subscribe
//! via [`crate::session::ComfySession::subscribe`]; dropping the
//! receiver (or never subscribing) costs nothing.

use comfykit_protocol::{NodeId, PromptId};

/// An observable event from one tracked run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The server started executing the prompt.
    Started { prompt_id: PromptId },

    /// A node began executing.
    NodeStarted { prompt_id: PromptId, node: NodeId },

    /// A node finished and reported output references.
    NodeCompleted {
        prompt_id: PromptId,
        node: NodeId,
        output: serde_json::Value,
    },

    /// Step-level progress within a node.
    Progress {
        node: Option<NodeId>,
        value: i64,
        max: i64,
    },

    /// A live preview image arrived on the stream.
    Preview {
        /// Prompt/node attribution, when the frame carried metadata.
        prompt_id: Option<PromptId>,
        node: Option<NodeId>,
        bytes: Vec<u8>,
    },

    /// A node emitted a text message.
    NodeText { node: NodeId, text: String },

    /// The run reached its terminal signal successfully.
    Completed { prompt_id: PromptId },

    /// The run failed or was interrupted.
    Failed { prompt_id: PromptId, error: String },
}
