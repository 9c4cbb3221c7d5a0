//! ComfyUI WebSocket and REST protocol client.
//!
//! Submits a workflow over HTTP, attaches the server's event stream,
//! tracks execution until the terminal signal, and reconciles the live
//! stream against the durable history record to produce the final
//! per-node output blobs.
//!
//! ```no_run
//! use comfykit_client::{ComfySession, ExecuteOptions, SessionConfig};
//!
//! # async fn demo(workflow: serde_json::Value) -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = ComfySession::new(SessionConfig::for_server("127.0.0.1:8188"));
//! let outputs = session
//!     .execute_workflow(&workflow, &ExecuteOptions::default())
//!     .await?;
//! for (node, images) in &outputs {
//!     println!("node {node}: {} image(s)", images.len());
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod dispatch;
pub mod events;
pub mod history;
pub mod run;
pub mod session;
pub mod stream;

pub use api::{ApiError, HttpApi};
pub use dispatch::{ObservabilityPolicy, RunFailure, RunState};
pub use events::RunEvent;
pub use run::{AdmissionGate, ExecuteError, ExecuteOptions, Outputs};
pub use session::{ComfySession, SessionConfig};
pub use stream::{EventStream, Received, StreamError};
