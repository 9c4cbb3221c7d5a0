//! Types for the `POST /prompt` endpoint.

use std::collections::HashMap;

use serde::Deserialize;

use crate::{NodeId, PromptId};

/// Response returned by the server after a workflow submission.
///
/// A present `error` or non-empty `node_errors` means the workflow was
/// rejected during validation and will never execute: no stream events
/// arrive for this prompt ID.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmissionTicket {
    /// Server-assigned (or echoed) identifier for the queued prompt.
    #[serde(default)]
    pub prompt_id: Option<PromptId>,
    /// Position in the execution queue.
    #[serde(default)]
    pub number: Option<i64>,
    /// Per-node validation failures.
    #[serde(default)]
    pub node_errors: Option<HashMap<NodeId, serde_json::Value>>,
    /// Top-level submission error.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

impl SubmissionTicket {
    /// Human-readable rejection reason, or `None` if the prompt was accepted.
    pub fn rejection(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(format!("submission error: {error}"));
        }
        match &self.node_errors {
            Some(errors) if !errors.is_empty() => {
                let mut nodes: Vec<&str> = errors.keys().map(String::as_str).collect();
                nodes.sort_unstable();
                Some(format!(
                    "validation failed for nodes [{}]: {}",
                    nodes.join(", "),
                    serde_json::to_string(errors).unwrap_or_default()
                ))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_ticket_has_no_rejection() {
        let json = r#"{"prompt_id":"abc","number":4,"node_errors":{}}"#;
        let ticket: SubmissionTicket = serde_json::from_str(json).unwrap();
        assert_eq!(ticket.prompt_id.as_deref(), Some("abc"));
        assert!(ticket.rejection().is_none());
    }

    #[test]
    fn node_errors_are_a_rejection() {
        let json = r#"{"node_errors":{"3":{"errors":[{"message":"bad seed"}]}}}"#;
        let ticket: SubmissionTicket = serde_json::from_str(json).unwrap();
        let reason = ticket.rejection().unwrap();
        assert!(reason.contains("3"));
        assert!(reason.contains("bad seed"));
    }

    #[test]
    fn top_level_error_is_a_rejection() {
        let json = r#"{"error":{"type":"invalid_prompt","message":"no outputs"}}"#;
        let ticket: SubmissionTicket = serde_json::from_str(json).unwrap();
        assert!(ticket.rejection().unwrap().contains("invalid_prompt"));
    }
}
