//! The background receive task.
//!
//! One task per client owns the read half for the whole session,
//! including automatic reconnection. It is the sole caller of the
//! dispatcher once the session is steady, and the only task the client
//! ever spawns, so `disconnect()` cancelling it leaves nothing behind.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::dispatch::DispatchOutcome;
use crate::error::Error;
use crate::messages::Message;
use crate::transport::{self, LineReader};

use super::{client_info, client_warn, HyperionClient};

enum SessionEnd {
    /// The server ended the session (logout); do not reconnect.
    Shutdown,
    /// The session died underneath us; reconnect.
    ConnectionLost(Error),
}

pub(super) async fn run(client: Arc<HyperionClient>, mut reader: LineReader, raw: bool) {
    loop {
        match steady(&client, &mut reader).await {
            SessionEnd::Shutdown => {
                client_info!(client, "server ended the session, disconnecting");
                // This task performs its own teardown; dropping the
                // handle keeps disconnect() from joining a task that no
                // longer exists.
                client.receive_task.lock().take();
                client.teardown_session().await;
                return;
            }
            SessionEnd::ConnectionLost(err) => {
                client_warn!(client, "connection lost: {err}");
                client.teardown_session().await;
            }
        }

        // Reconnect: one immediate attempt, then one attempt per
        // configured delay, indefinitely. The target instance persists,
        // so the session comes back on the instance the user selected.
        loop {
            match client.establish_session(raw).await {
                Ok(new_reader) => {
                    reader = new_reader;
                    break;
                }
                Err(err) => {
                    let delay = client.config.connection_retry_delay;
                    client_warn!(client, "reconnect failed: {err}, retrying in {delay:?}");
                    client.teardown_session().await;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// One turn of the steady-state loop.
enum Step {
    Inbound(Message),
    ReloadFinished(bool),
}

/// Runs the steady-state loop until the session ends one way or the
/// other. A state reload requested by the dispatcher (instance change)
/// runs concurrently with the loop: the reload parks on a tan like any
/// caller, and this loop is what feeds it.
async fn steady(client: &HyperionClient, reader: &mut LineReader) -> SessionEnd {
    let mut reload: Option<BoxFuture<'_, bool>> = None;
    loop {
        let step = if let Some(reload_fut) = reload.as_mut() {
            tokio::select! {
                loaded = &mut *reload_fut => Step::ReloadFinished(loaded),
                res = transport::next_message(reader) => match res {
                    Ok(msg) => Step::Inbound(msg),
                    Err(err) => return SessionEnd::ConnectionLost(err),
                },
            }
        } else {
            match transport::next_message(reader).await {
                Ok(msg) => Step::Inbound(msg),
                Err(err) => return SessionEnd::ConnectionLost(err),
            }
        };

        let msg = match step {
            Step::Inbound(msg) => msg,
            Step::ReloadFinished(true) => {
                reload = None;
                continue;
            }
            Step::ReloadFinished(false) => {
                return SessionEnd::ConnectionLost(Error::Protocol(
                    "state reload after an instance change failed".into(),
                ));
            }
        };

        match client.dispatch(&msg) {
            DispatchOutcome::Continue => {}
            DispatchOutcome::ReloadState => {
                if reload.is_none() {
                    reload = Some(reload_state(client).boxed());
                }
            }
            DispatchOutcome::Shutdown => return SessionEnd::Shutdown,
        }
    }
}

async fn reload_state(client: &HyperionClient) -> bool {
    client_info!(client, "instance changed, reloading server state");
    client.refresh_state().await
}
