// Hyperion client for Rust
// SPDX-License-Identifier: MPL-2.0

#![warn(missing_docs)]

//! An async client for the Hyperion ambient-lighting server's JSON API:
//! newline-delimited JSON over TCP on port 19444 by default.
//!
//! The client keeps one long-lived connection per server, mirrors the
//! server's state (components, priorities, effects, LED layout,
//! instances, sessions, video mode, adjustments) into a local cache fed
//! by push updates, correlates concurrent requests with their replies
//! through per-request transaction numbers, and re-establishes the
//! session on its own after a failure.
//!
//! ```no_run
//! use hyperion_client::ClientBuilder;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = ClientBuilder::new("hyperion.local").build();
//!     if !client.connect().await {
//!         return;
//!     }
//!     client
//!         .set_color(json!({"color": [255, 0, 0], "priority": 50}))
//!         .await
//!         .ok();
//!     client.disconnect().await;
//! }
//! ```
//!
//! Synchronous programs can use [`blocking::BlockingClient`], which runs
//! the client on a background thread and exposes every operation as a
//! blocking call.

pub mod blocking;
mod config;
mod dispatch;
mod error;
mod messages;
mod session;
mod state;
mod tan;
mod transport;

pub use config::{
    ClientBuilder, ClientConfig, DEFAULT_CONNECTION_RETRY_DELAY, DEFAULT_INSTANCE, DEFAULT_ORIGIN,
    DEFAULT_PORT, DEFAULT_REQUEST_TOKEN_TIMEOUT, DEFAULT_TIMEOUT,
};
pub use dispatch::MessageCallback;
pub use error::Error;
pub use messages::{reply_command, vocab, Message, SERVERINFO_SUBSCRIPTIONS};
pub use session::{generate_auth_id, HyperionClient, SessionStatus};
