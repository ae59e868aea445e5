// Hyperion client for Rust
// SPDX-License-Identifier: MPL-2.0

//! A synchronous façade over the async client.
//!
//! [`BlockingClient`] starts a current-thread tokio runtime on a
//! background thread and parks that thread inside the runtime, so the
//! runtime drives IO and timers for the whole adapter lifetime. Every
//! async operation has a blocking sibling that submits to the loop
//! thread and waits for the result; the read-only accessors are already
//! synchronous and are re-exposed directly.

use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::config::ClientBuilder;
use crate::error::Error;
use crate::messages::Message;
use crate::session::{HyperionClient, SessionStatus};

#[derive(Clone)]
struct Inner {
    handle: tokio::runtime::Handle,
    client: Arc<HyperionClient>,
}

/// A [`HyperionClient`] driven by its own background thread, usable from
/// synchronous code.
pub struct BlockingClient {
    inner: OnceLock<Inner>,
    init_rx: Mutex<Option<mpsc::Receiver<Inner>>>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl BlockingClient {
    /// Starts the loop thread and builds the client on it. Use
    /// [`BlockingClient::wait_for_client_init`] to block until the
    /// client exists.
    pub fn new(builder: ClientBuilder) -> Self {
        let (init_tx, init_rx) = mpsc::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let thread = thread::Builder::new()
            .name("hyperion-client".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        log::error!("client runtime failed to start: {err}");
                        return;
                    }
                };
                let client = builder.build();
                let _ = init_tx.send(Inner {
                    handle: runtime.handle().clone(),
                    client,
                });
                // Stay parked inside the runtime until stop(); this is
                // what keeps IO and timers running for the adapter.
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
            });
        let thread = match thread {
            Ok(thread) => Some(thread),
            Err(err) => {
                log::error!("client thread failed to start: {err}");
                None
            }
        };
        BlockingClient {
            inner: OnceLock::new(),
            init_rx: Mutex::new(Some(init_rx)),
            stop_tx: Mutex::new(Some(stop_tx)),
            thread: Mutex::new(thread),
        }
    }

    /// Blocks until the loop thread has built the client. False when the
    /// thread failed to start at all.
    pub fn wait_for_client_init(&self) -> bool {
        if self.inner.get().is_some() {
            return true;
        }
        let Some(rx) = self.init_rx.lock().take() else {
            return false;
        };
        match rx.recv() {
            Ok(inner) => {
                let _ = self.inner.set(inner);
                true
            }
            Err(_) => false,
        }
    }

    /// Disconnects, shuts the loop thread down and joins it. Called
    /// implicitly on drop; further calls are no-ops.
    pub fn stop(&self) {
        let Some(thread) = self.thread.lock().take() else {
            return;
        };
        if let Some(inner) = self.inner.get() {
            let client = inner.client.clone();
            inner.handle.block_on(async move {
                client.disconnect().await;
            });
        }
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.send(());
        }
        let _ = thread.join();
    }

    /// The wrapped async client, once initialized.
    pub fn client(&self) -> Option<Arc<HyperionClient>> {
        self.inner().map(|inner| inner.client.clone())
    }

    fn inner(&self) -> Option<&Inner> {
        if !self.wait_for_client_init() {
            return None;
        }
        self.inner.get()
    }

    // Lifecycle.

    /// Blocking sibling of [`HyperionClient::connect`].
    pub fn connect(&self) -> bool {
        let Some(inner) = self.inner() else {
            return false;
        };
        let client = inner.client.clone();
        inner.handle.block_on(async move { client.connect().await })
    }

    /// Blocking sibling of [`HyperionClient::connect_raw`].
    pub fn connect_raw(&self) -> bool {
        let Some(inner) = self.inner() else {
            return false;
        };
        let client = inner.client.clone();
        inner
            .handle
            .block_on(async move { client.connect_raw().await })
    }

    /// Blocking sibling of [`HyperionClient::disconnect`].
    pub fn disconnect(&self) -> bool {
        let Some(inner) = self.inner() else {
            return true;
        };
        let client = inner.client.clone();
        inner
            .handle
            .block_on(async move { client.disconnect().await })
    }
}

macro_rules! blocking_pair {
    ($send:ident / $wait:ident) => {
        #[doc = concat!("Blocking sibling of [`HyperionClient::", stringify!($send), "`].")]
        pub fn $send(&self, params: Value) -> bool {
            let Some(inner) = self.inner() else {
                return false;
            };
            let client = inner.client.clone();
            inner
                .handle
                .block_on(async move { client.$send(params).await })
        }

        #[doc = concat!("Blocking sibling of [`HyperionClient::", stringify!($wait), "`].")]
        pub fn $wait(&self, params: Value) -> Result<Option<Message>, Error> {
            let Some(inner) = self.inner() else {
                return Ok(None);
            };
            let client = inner.client.clone();
            inner
                .handle
                .block_on(async move { client.$wait(params).await })
        }
    };

    ($send:ident / $wait:ident, no_params) => {
        #[doc = concat!("Blocking sibling of [`HyperionClient::", stringify!($send), "`].")]
        pub fn $send(&self) -> bool {
            let Some(inner) = self.inner() else {
                return false;
            };
            let client = inner.client.clone();
            inner.handle.block_on(async move { client.$send().await })
        }

        #[doc = concat!("Blocking sibling of [`HyperionClient::", stringify!($wait), "`].")]
        pub fn $wait(&self) -> Result<Option<Message>, Error> {
            let Some(inner) = self.inner() else {
                return Ok(None);
            };
            let client = inner.client.clone();
            inner.handle.block_on(async move { client.$wait().await })
        }
    };
}

impl BlockingClient {
    blocking_pair!(send_set_color / set_color);
    blocking_pair!(send_set_effect / set_effect);
    blocking_pair!(send_set_image / set_image);
    blocking_pair!(send_clear / clear);
    blocking_pair!(send_set_adjustment / set_adjustment);
    blocking_pair!(send_set_led_mapping_type / set_led_mapping_type);
    blocking_pair!(send_set_videomode / set_videomode);
    blocking_pair!(send_set_component / set_component);
    blocking_pair!(send_set_sourceselect / set_sourceselect);
    blocking_pair!(send_login / login);
    blocking_pair!(send_logout / logout, no_params);
    blocking_pair!(send_is_auth_required / is_auth_required, no_params);
    blocking_pair!(send_start_instance / start_instance);
    blocking_pair!(send_stop_instance / stop_instance);
    blocking_pair!(send_switch_instance / switch_instance);
    blocking_pair!(send_image_stream_start / image_stream_start, no_params);
    blocking_pair!(send_image_stream_stop / image_stream_stop, no_params);
    blocking_pair!(send_led_stream_start / led_stream_start, no_params);
    blocking_pair!(send_led_stream_stop / led_stream_stop, no_params);
    blocking_pair!(send_get_serverinfo / get_serverinfo);
    blocking_pair!(send_request_token / request_token);
    blocking_pair!(send_request_token_abort / request_token_abort);
}

// Read-only views, mirrored one-to-one from the async client. They are
// plain cache reads and never touch the loop thread.
impl BlockingClient {
    /// See [`HyperionClient::id`].
    pub fn id(&self) -> Option<String> {
        self.client().map(|client| client.id())
    }

    /// See [`HyperionClient::status`].
    pub fn status(&self) -> Option<SessionStatus> {
        self.client().map(|client| client.status())
    }

    /// See [`HyperionClient::is_connected`].
    pub fn is_connected(&self) -> bool {
        self.client().is_some_and(|client| client.is_connected())
    }

    /// See [`HyperionClient::is_logged_in`].
    pub fn is_logged_in(&self) -> bool {
        self.client().is_some_and(|client| client.is_logged_in())
    }

    /// See [`HyperionClient::has_loaded_state`].
    pub fn has_loaded_state(&self) -> bool {
        self.client().is_some_and(|client| client.has_loaded_state())
    }

    /// See [`HyperionClient::instance`].
    pub fn instance(&self) -> Option<u32> {
        self.client().and_then(|client| client.instance())
    }

    /// See [`HyperionClient::target_instance`].
    pub fn target_instance(&self) -> Option<u32> {
        self.client().map(|client| client.target_instance())
    }

    /// See [`HyperionClient::serverinfo`].
    pub fn serverinfo(&self) -> Option<Map<String, Value>> {
        self.client().and_then(|client| client.serverinfo())
    }

    /// See [`HyperionClient::components`].
    pub fn components(&self) -> Vec<Value> {
        self.client()
            .map_or_else(Vec::new, |client| client.components())
    }

    /// See [`HyperionClient::adjustment`].
    pub fn adjustment(&self) -> Vec<Value> {
        self.client()
            .map_or_else(Vec::new, |client| client.adjustment())
    }

    /// See [`HyperionClient::effects`].
    pub fn effects(&self) -> Vec<Value> {
        self.client().map_or_else(Vec::new, |client| client.effects())
    }

    /// See [`HyperionClient::leds`].
    pub fn leds(&self) -> Vec<Value> {
        self.client().map_or_else(Vec::new, |client| client.leds())
    }

    /// See [`HyperionClient::priorities`].
    pub fn priorities(&self) -> Vec<Value> {
        self.client()
            .map_or_else(Vec::new, |client| client.priorities())
    }

    /// See [`HyperionClient::priorities_autoselect`].
    pub fn priorities_autoselect(&self) -> Option<bool> {
        self.client()
            .and_then(|client| client.priorities_autoselect())
    }

    /// See [`HyperionClient::visible_priority`].
    pub fn visible_priority(&self) -> Option<Value> {
        self.client().and_then(|client| client.visible_priority())
    }

    /// See [`HyperionClient::videomode`].
    pub fn videomode(&self) -> Option<String> {
        self.client().and_then(|client| client.videomode())
    }

    /// See [`HyperionClient::led_mapping_type`].
    pub fn led_mapping_type(&self) -> Option<String> {
        self.client().and_then(|client| client.led_mapping_type())
    }

    /// See [`HyperionClient::sessions`].
    pub fn sessions(&self) -> Vec<Value> {
        self.client()
            .map_or_else(Vec::new, |client| client.sessions())
    }

    /// See [`HyperionClient::instances`].
    pub fn instances(&self) -> Vec<Value> {
        self.client()
            .map_or_else(Vec::new, |client| client.instances())
    }

    /// See [`HyperionClient::is_on`].
    pub fn is_on(&self, components: &[&str]) -> bool {
        self.client()
            .is_some_and(|client| client.is_on(components))
    }
}

impl Drop for BlockingClient {
    fn drop(&mut self) {
        self.stop();
    }
}
