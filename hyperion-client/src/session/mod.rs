//! The client handle and its session lifecycle.

mod commands;
mod connect;
mod event_loop;

pub use commands::generate_auth_id;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::dispatch::{CallbackRegistry, MessageCallback};
use crate::error::Error;
use crate::messages::{encode_line, vocab, Message};
use crate::state::StateCache;
use crate::tan::TanRegistry;
use crate::transport::LineWriter;

#[allow(unused)]
macro_rules! client_warn {
    ($client: expr, $($arg:tt)*) =>  {
        log::warn!("client:{} {}", $client.id(), format!($($arg)*));
    }
}
#[allow(unused)]
pub(crate) use client_warn;

#[allow(unused)]
macro_rules! client_error {
    ($client: expr, $($arg:tt)*) =>  {
        log::error!("client:{} {}", $client.id(), format!($($arg)*));
    }
}
#[allow(unused)]
pub(crate) use client_error;

#[allow(unused)]
macro_rules! client_info {
    ($client: expr, $($arg:tt)*) =>  {
        log::info!("client:{} {}", $client.id(), format!($($arg)*));
    }
}
#[allow(unused)]
pub(crate) use client_info;

#[allow(unused)]
macro_rules! client_debug {
    ($client: expr, $($arg:tt)*) =>  {
        log::debug!("client:{} {}", $client.id(), format!($($arg)*));
    }
}
#[allow(unused)]
pub(crate) use client_debug;

/// The client's own view of the session, mirrored to subscribers as the
/// synthetic `client-update` event whenever a field changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    /// Whether a transport connection is open.
    pub connected: bool,
    /// Whether the session passed the authorization step.
    pub logged_in: bool,
    /// The live instance; `None` while disconnected.
    pub instance: Option<u32>,
    /// Whether the state cache holds a full serverinfo snapshot for this
    /// session.
    pub loaded_state: bool,
}

impl SessionStatus {
    fn disconnected() -> Self {
        SessionStatus {
            connected: false,
            logged_in: false,
            instance: None,
            loaded_state: false,
        }
    }

    fn to_message(&self) -> Message {
        let mut msg = Message::new(vocab::CLIENT_UPDATE);
        msg.fields
            .insert(vocab::KEY_CONNECTED.into(), self.connected.into());
        msg.fields
            .insert(vocab::KEY_LOGGED_IN.into(), self.logged_in.into());
        msg.fields.insert(
            vocab::KEY_INSTANCE.into(),
            match self.instance {
                Some(instance) => instance.into(),
                None => Value::Null,
            },
        );
        msg.fields
            .insert(vocab::KEY_LOADED_STATE.into(), self.loaded_state.into());
        msg
    }
}

/// An asynchronous client for one server.
///
/// The client keeps a long-lived connection, mirrors the server's state
/// into a local cache, correlates concurrent requests with their replies
/// and reconnects on its own after failures. All methods take `&self`;
/// the handle is meant to be shared behind the [`Arc`] returned by
/// [`crate::ClientBuilder::build`].
pub struct HyperionClient {
    pub(crate) config: ClientConfig,
    pub(crate) tans: TanRegistry,
    pub(crate) state: StateCache,
    pub(crate) callbacks: CallbackRegistry,
    status: Mutex<SessionStatus>,
    /// Instance the session intends to join; survives disconnects.
    target_instance: AtomicU32,
    writer: Mutex<Option<Arc<tokio::sync::Mutex<LineWriter>>>>,
    receive_task: Mutex<Option<JoinHandle<()>>>,
    /// Handle to self for the receive task; filled in by `new`.
    weak_self: Weak<HyperionClient>,
}

impl HyperionClient {
    pub(crate) fn new(
        config: ClientConfig,
        callbacks: HashMap<String, MessageCallback>,
        default_callback: Option<MessageCallback>,
    ) -> Arc<Self> {
        let target_instance = AtomicU32::new(config.instance);
        Arc::new_cyclic(|weak_self| HyperionClient {
            config,
            tans: TanRegistry::new(),
            state: StateCache::default(),
            callbacks: CallbackRegistry::new(callbacks, default_callback),
            status: Mutex::new(SessionStatus::disconnected()),
            target_instance,
            writer: Mutex::new(None),
            receive_task: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// Identifier used in logs: `"<host>:<port>-<target_instance>"`.
    pub fn id(&self) -> String {
        format!(
            "{}:{}-{}",
            self.config.host,
            self.config.port,
            self.target_instance()
        )
    }

    /// Opens the connection and runs the full session sequence:
    /// authorize (when a token is configured), switch to the target
    /// instance (when not the default), then load the server state.
    ///
    /// On a client that is already connected this only refreshes the
    /// mirrored state. Returns whether the session reached steady state.
    pub async fn connect(&self) -> bool {
        if self.is_connected() {
            return self.refresh_state().await;
        }
        self.start_session(false).await
    }

    /// Opens the transport only: no authorization, no instance selection,
    /// no state load. The receive task still runs, so subscribed push
    /// updates and callbacks work.
    pub async fn connect_raw(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        self.start_session(true).await
    }

    async fn start_session(&self, raw: bool) -> bool {
        let Some(client) = self.weak_self.upgrade() else {
            return false;
        };
        // A reconnect loop left over from a lost session must not race
        // this connect; the user-driven attempt supersedes it.
        let stale = self.receive_task.lock().take();
        if let Some(stale) = stale {
            stale.abort();
            let _ = stale.await;
        }
        // A fresh session starts a fresh tan sequence.
        self.tans.reset();
        match self.establish_session(raw).await {
            Ok(reader) => {
                let task = tokio::spawn(event_loop::run(client, reader, raw));
                *self.receive_task.lock() = Some(task);
                true
            }
            Err(err) => {
                client_warn!(self, "connect failed: {err}");
                self.teardown_session().await;
                false
            }
        }
    }

    /// Ends the session: stops the receive task, closes the transport and
    /// completes every parked caller with no reply. Idempotent; calling
    /// it on a disconnected client is a no-op that returns true.
    pub async fn disconnect(&self) -> bool {
        let task = self.receive_task.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }
        self.teardown_session().await;
        true
    }

    /// Closes the transport, drains parked callers and publishes the
    /// disconnected status. Shared by `disconnect`, connection loss and
    /// failed connects.
    pub(crate) async fn teardown_session(&self) {
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            let mut writer = writer.lock().await;
            if let Err(err) = writer.close().await {
                client_debug!(self, "ignoring close error: {err}");
            }
        }
        self.tans.drain_all();
        self.set_status(|status| *status = SessionStatus::disconnected());
    }

    pub(crate) async fn write_request(&self, body: &Map<String, Value>) -> Result<(), Error> {
        let writer = self.writer.lock().clone();
        let Some(writer) = writer else {
            return Err(Error::Transport(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "not connected",
            )));
        };
        let line = encode_line(body);
        client_debug!(self, "sending: {line}");
        let mut writer = writer.lock().await;
        writer.write_line(&line).await?;
        Ok(())
    }

    /// Writes a request, swallowing transport failures into the return
    /// value. Callers observe a lost connection through the session
    /// status instead.
    pub(crate) async fn send_body(&self, body: &Map<String, Value>) -> bool {
        match self.write_request(body).await {
            Ok(()) => true,
            Err(err) => {
                client_warn!(self, "send failed: {err}");
                false
            }
        }
    }

    /// Applies a status change, emitting a `client-update` event iff any
    /// field actually changed.
    pub(crate) fn set_status(&self, mutate: impl FnOnce(&mut SessionStatus)) {
        let event = {
            let mut status = self.status.lock();
            let before = status.clone();
            mutate(&mut status);
            (*status != before).then(|| status.to_message())
        };
        if let Some(msg) = event {
            self.invoke_callback(&msg);
        }
    }

    // Session status views.

    /// The current session status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.status.lock().clone()
    }

    /// Whether a transport connection is open.
    pub fn is_connected(&self) -> bool {
        self.status.lock().connected
    }

    /// Whether the session passed the authorization step.
    pub fn is_logged_in(&self) -> bool {
        self.status.lock().logged_in
    }

    /// Whether the cache holds a full state snapshot for this session.
    pub fn has_loaded_state(&self) -> bool {
        self.status.lock().loaded_state
    }

    /// The live instance, `None` while disconnected.
    pub fn instance(&self) -> Option<u32> {
        self.status.lock().instance
    }

    /// The instance the session joins on (re)connect.
    pub fn target_instance(&self) -> u32 {
        self.target_instance.load(Ordering::Relaxed)
    }

    pub(crate) fn set_target_instance(&self, instance: u32) {
        self.target_instance.store(instance, Ordering::Relaxed);
    }

    // Callback management.

    /// Replaces the per-command callback table.
    pub fn set_callbacks(&self, callbacks: HashMap<String, MessageCallback>) {
        self.callbacks.set_callbacks(callbacks);
    }

    /// Replaces (or clears) the default callback.
    pub fn set_default_callback(&self, callback: Option<MessageCallback>) {
        self.callbacks.set_default(callback);
    }

    // State cache views; all return detached copies.

    /// The last full serverinfo payload.
    pub fn serverinfo(&self) -> Option<Map<String, Value>> {
        self.state.serverinfo()
    }

    /// Component list as last reported by the server.
    pub fn components(&self) -> Vec<Value> {
        self.state.components()
    }

    /// Color adjustment list.
    pub fn adjustment(&self) -> Vec<Value> {
        self.state.adjustment()
    }

    /// Installed effects.
    pub fn effects(&self) -> Vec<Value> {
        self.state.effects()
    }

    /// The LED layout.
    pub fn leds(&self) -> Vec<Value> {
        self.state.leds()
    }

    /// Priority entries competing for the LEDs.
    pub fn priorities(&self) -> Vec<Value> {
        self.state.priorities()
    }

    /// Whether the server auto-selects the visible priority.
    pub fn priorities_autoselect(&self) -> Option<bool> {
        self.state.priorities_autoselect()
    }

    /// The first priority entry marked visible, if any.
    pub fn visible_priority(&self) -> Option<Value> {
        self.state.visible_priority()
    }

    /// Current video mode.
    pub fn videomode(&self) -> Option<String> {
        self.state.videomode()
    }

    /// Current image-to-LED mapping type.
    pub fn led_mapping_type(&self) -> Option<String> {
        self.state.led_mapping_type()
    }

    /// Discovered server sessions.
    pub fn sessions(&self) -> Vec<Value> {
        self.state.sessions()
    }

    /// Instance records restricted to the running subset.
    pub fn instances(&self) -> Vec<Value> {
        self.state.instances()
    }

    /// True iff every listed component is enabled; an empty list asks
    /// about the master switch.
    pub fn is_on(&self, components: &[&str]) -> bool {
        self.state.is_on(components)
    }
}
