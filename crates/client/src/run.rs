//! Run controller: drives one workflow from submission to final outputs.
//!
//! One call to [`ComfySession::execute_workflow`] walks the states
//! `Idle -> Admitted -> Submitted -> Streaming -> Reconciling` and ends
//! in either the merged output mapping or a typed [`ExecuteError`].
//! There is no internal parallelism: submit, then a bounded receive
//! loop, then reconciliation, all on one control flow.

use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use comfykit_protocol::{classify, NodeId, PromptId};

use crate::api::ApiError;
use crate::dispatch::{dispatch, ObservabilityPolicy, RunFailure, RunState};
use crate::history::reconcile_outputs;
use crate::session::ComfySession;
use crate::stream::{Received, StreamError};

/// Final outputs of a run: ordered byte blobs per node.
pub type Outputs = HashMap<NodeId, Vec<Vec<u8>>>;

/// Admission backpressure: hold submission until the server's combined
/// running + pending count drops below `floor`.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    /// Submit only while the queue total is strictly below this.
    pub floor: usize,
    /// Poll interval for queue snapshots.
    pub check_interval: Duration,
    /// Overall bound on the wait; `None` waits indefinitely.
    pub max_wait: Option<Duration>,
}

impl Default for AdmissionGate {
    fn default() -> Self {
        Self {
            floor: 3,
            check_interval: Duration::from_secs(1),
            max_wait: None,
        }
    }
}

/// Options for one `execute_workflow` call.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Caller-chosen prompt ID; generated (UUID v4) when `None`.
    pub prompt_id: Option<PromptId>,
    /// Queue-capacity wait before submission; `None` submits immediately.
    pub admission: Option<AdmissionGate>,
    /// Which stream events are observed.
    pub policy: ObservabilityPolicy,
    /// Checked once per receive-loop iteration; cancelling closes the
    /// session and aborts the run. The server-side job keeps running.
    pub cancel: CancellationToken,
}

/// Everything that can end a run without outputs.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// An HTTP call failed. Retryable by the caller; never retried here.
    #[error("transport error: {0}")]
    Transport(#[from] ApiError),

    /// The event stream failed beyond the single reconnect attempt.
    #[error("event stream failed: {0}")]
    Stream(#[from] StreamError),

    /// The server rejected the workflow before execution.
    #[error("workflow rejected by server: {0}")]
    Validation(String),

    /// The server signalled completion but has no history record.
    #[error("prompt {0} has no history record after completion")]
    MissingHistory(PromptId),

    /// The admission wait exceeded its bound. Distinct from an
    /// execution failure: the server was busy, the job never ran.
    #[error("timed out waiting for queue capacity after {0:?}")]
    QueueWaitTimeout(Duration),

    /// The server reported an execution error for this prompt.
    #[error("execution of prompt {prompt_id} failed at node {}: {message}", .node_id.as_deref().unwrap_or("<unknown>"))]
    Execution {
        prompt_id: PromptId,
        node_id: Option<NodeId>,
        node_type: Option<String>,
        message: String,
    },

    /// The execution was interrupted server-side.
    #[error("execution of prompt {prompt_id} was interrupted")]
    Interrupted { prompt_id: PromptId },

    /// The caller cancelled the run.
    #[error("run cancelled by caller")]
    Cancelled,
}

impl RunFailure {
    fn into_error(self, prompt_id: PromptId) -> ExecuteError {
        match self {
            RunFailure::Error {
                node_id,
                node_type,
                message,
            } => ExecuteError::Execution {
                prompt_id,
                node_id,
                node_type,
                message,
            },
            RunFailure::Interrupted => ExecuteError::Interrupted { prompt_id },
        }
    }
}

impl ComfySession {
    /// Execute one workflow and return its final outputs.
    ///
    /// Submits the workflow (optionally waiting for queue capacity),
    /// consumes the event stream until the terminal signal, then
    /// reconciles against the `/history` record, fetching any image
    /// artifacts the stream did not deliver.
    pub async fn execute_workflow(
        &mut self,
        workflow: &serde_json::Value,
        opts: &ExecuteOptions,
    ) -> Result<Outputs, ExecuteError> {
        if let Some(gate) = &opts.admission {
            self.wait_for_capacity(gate, &opts.cancel).await?;
        }

        let prompt_id = opts
            .prompt_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        tracing::info!(prompt_id = %prompt_id, "submitting workflow");
        let ticket = self
            .api()
            .submit_workflow(workflow, self.client_id(), &prompt_id)
            .await?;

        if let Some(reason) = ticket.rejection() {
            tracing::error!(prompt_id = %prompt_id, reason = %reason, "workflow rejected");
            return Err(ExecuteError::Validation(reason));
        }
        // The server echoes the submitted ID; prefer its answer.
        let prompt_id = ticket.prompt_id.unwrap_or(prompt_id);

        self.connect().await?;
        let mut state = RunState::new(prompt_id.clone());
        self.stream_until_terminal(&mut state, opts).await?;

        // History is fetched on both outcomes; for a failed run it is
        // diagnostic only and must not mask the execution failure.
        let history = self.api().get_history(&prompt_id).await;

        if let Some(failure) = state.failure.take() {
            match &history {
                Ok(entry) => {
                    tracing::info!(
                        prompt_id = %prompt_id,
                        status = ?entry.status,
                        "history record for failed run",
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        prompt_id = %prompt_id,
                        error = %e,
                        "could not fetch history for failed run",
                    );
                }
            }
            return Err(failure.into_error(prompt_id));
        }

        let entry = match history {
            Ok(entry) => entry,
            Err(ApiError::PromptNotFound(id)) => return Err(ExecuteError::MissingHistory(id)),
            Err(e) => return Err(ExecuteError::Transport(e)),
        };

        reconcile_outputs(self.api(), &entry, &mut state.outputs).await;

        tracing::info!(
            prompt_id = %prompt_id,
            nodes = state.outputs.len(),
            "run completed",
        );
        Ok(state.outputs)
    }

    /// Poll `/queue` until the combined running + pending count drops
    /// below the gate's floor.
    ///
    /// Poll failures inside the wait are logged and retried at the same
    /// interval; only the overall `max_wait` bound aborts.
    async fn wait_for_capacity(
        &self,
        gate: &AdmissionGate,
        cancel: &CancellationToken,
    ) -> Result<(), ExecuteError> {
        tracing::info!(floor = gate.floor, "waiting for queue capacity");
        let started = tokio::time::Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Err(ExecuteError::Cancelled);
            }

            match self.api().get_queue().await {
                Ok(snapshot) => {
                    let total = snapshot.total();
                    if total < gate.floor {
                        tracing::info!(
                            running = snapshot.queue_running.len(),
                            pending = snapshot.queue_pending.len(),
                            "queue has capacity, proceeding",
                        );
                        return Ok(());
                    }
                    tracing::debug!(
                        running = snapshot.queue_running.len(),
                        pending = snapshot.queue_pending.len(),
                        total,
                        "queue still at capacity",
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "queue poll failed, retrying");
                }
            }

            if let Some(max_wait) = gate.max_wait {
                if started.elapsed() >= max_wait {
                    return Err(ExecuteError::QueueWaitTimeout(max_wait));
                }
            }

            tokio::time::sleep(gate.check_interval).await;
        }
    }

    /// The receive loop: classify and dispatch frames until the run
    /// state turns terminal.
    ///
    /// A receive timeout is a sentinel, not an error. A dropped stream
    /// gets exactly one immediate reconnect attempt; if that connect
    /// fails the error propagates. Cancellation is checked once per
    /// iteration and closes the session.
    async fn stream_until_terminal(
        &mut self,
        state: &mut RunState,
        opts: &ExecuteOptions,
    ) -> Result<(), ExecuteError> {
        while !state.terminal {
            if opts.cancel.is_cancelled() {
                tracing::info!(prompt_id = %state.prompt_id, "run cancelled, closing session");
                self.close().await;
                return Err(ExecuteError::Cancelled);
            }

            match self.recv().await {
                Ok(Received::Timeout) => {
                    tracing::debug!(prompt_id = %state.prompt_id, "receive timed out, still waiting");
                }
                Ok(Received::Frame(frame)) => {
                    let event = classify(&frame);
                    dispatch(event, state, opts.policy, self.events());
                }
                Err(e) => {
                    tracing::warn!(
                        prompt_id = %state.prompt_id,
                        error = %e,
                        "event stream dropped, attempting reconnect",
                    );
                    self.reconnect().await?;
                }
            }
        }
        Ok(())
    }
}
