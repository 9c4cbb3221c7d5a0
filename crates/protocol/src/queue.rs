//! Types for the `GET /queue` endpoint.

use serde::Deserialize;

/// Snapshot of the server's execution queue.
///
/// Entries are heterogeneous tuples on the wire; the client only ever
/// counts them, so they are kept opaque.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_running: Vec<serde_json::Value>,
    #[serde(default)]
    pub queue_pending: Vec<serde_json::Value>,
}

impl QueueSnapshot {
    /// Combined running + pending job count, used for admission decisions.
    pub fn total(&self) -> usize {
        self.queue_running.len() + self.queue_pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_running_and_pending() {
        let json = r#"{"queue_running":[[0,"a",{},{},[]]],"queue_pending":[[1,"b",{},{},[]],[2,"c",{},{},[]]]}"#;
        let snapshot: QueueSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.queue_running.len(), 1);
        assert_eq!(snapshot.queue_pending.len(), 2);
        assert_eq!(snapshot.total(), 3);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let snapshot: QueueSnapshot = serde_json::from_str("{}").unwrap();
        assert_eq!(snapshot.total(), 0);
    }
}
