//! Types for the `GET /history/{prompt_id}` and `GET /view` endpoints.

use std::collections::HashMap;

use serde::Deserialize;

use crate::{NodeId, PromptId};

/// The full `/history/{prompt_id}` response: a single-entry mapping
/// from prompt ID to its durable record.
pub type HistoryResponse = HashMap<PromptId, HistoryEntry>;

/// Durable server-side record of one executed prompt.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    /// Named outputs per node.
    #[serde(default)]
    pub outputs: HashMap<NodeId, NodeOutput>,
    /// Completion status and ordered log messages.
    #[serde(default)]
    pub status: Option<HistoryStatus>,
}

/// Outputs recorded for one node.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeOutput {
    /// Image artifacts produced by this node.
    #[serde(default)]
    pub images: Vec<ArtifactRef>,
    /// Any non-image outputs (text, latents, ...), kept raw.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Reference to one stored artifact, addressed by the
/// folder-class/subfolder/filename triplet used by `GET /view`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Folder class: `"output"`, `"temp"`, or `"input"`.
    #[serde(rename = "type")]
    pub folder_type: String,
}

/// Execution status block of a history entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub status_str: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    /// Ordered log-message sequence as recorded by the server.
    #[serde(default)]
    pub messages: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entry_with_image_outputs() {
        let json = r#"{
            "p1": {
                "outputs": {
                    "9": {"images": [{"filename": "out_00001_.png", "subfolder": "", "type": "output"}]}
                },
                "status": {"status_str": "success", "completed": true, "messages": []}
            }
        }"#;
        let response: HistoryResponse = serde_json::from_str(json).unwrap();
        let entry = &response["p1"];
        let images = &entry.outputs["9"].images;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].filename, "out_00001_.png");
        assert_eq!(images[0].folder_type, "output");
        assert_eq!(entry.status.as_ref().unwrap().completed, Some(true));
    }

    #[test]
    fn non_image_outputs_are_preserved_raw() {
        let json = r#"{"outputs": {"5": {"text": ["hello"]}}}"#;
        let entry: HistoryEntry = serde_json::from_str(json).unwrap();
        let node = &entry.outputs["5"];
        assert!(node.images.is_empty());
        assert!(node.extra.contains_key("text"));
    }
}
