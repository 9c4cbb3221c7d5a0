//! Reconciliation of the live stream against the durable history record.
//!
//! After the stream signals completion, the `/history` record is the
//! authoritative list of what each node produced. Anything already
//! obtained from the live stream wins (it is fresher and already paid
//! for); everything else is fetched by artifact reference.

use comfykit_protocol::history::HistoryEntry;

use crate::api::HttpApi;
use crate::run::Outputs;

/// Merge history-recorded image outputs into the accumulated outputs.
///
/// Fetch failures for individual artifacts are logged and skipped: one
/// missing image must not fail the whole run (partial-result policy).
pub async fn reconcile_outputs(api: &HttpApi, entry: &HistoryEntry, outputs: &mut Outputs) {
    for (node_id, node_output) in &entry.outputs {
        if node_output.images.is_empty() {
            continue;
        }
        if outputs.contains_key(node_id) {
            tracing::debug!(node = %node_id, "keeping stream-delivered outputs for node");
            continue;
        }

        let mut fetched = Vec::new();
        for image in &node_output.images {
            match api.fetch_artifact(image).await {
                Ok(bytes) => {
                    tracing::debug!(
                        node = %node_id,
                        filename = %image.filename,
                        bytes = bytes.len(),
                        "fetched output artifact",
                    );
                    fetched.push(bytes);
                }
                Err(e) => {
                    tracing::error!(
                        node = %node_id,
                        filename = %image.filename,
                        error = %e,
                        "failed to fetch output artifact, skipping",
                    );
                }
            }
        }

        if !fetched.is_empty() {
            outputs.insert(node_id.clone(), fetched);
        }
    }
}
