//! Inbound message routing.
//!
//! Every decoded message goes through [`HyperionClient::dispatch`]:
//! a caller parked on the message's tan is woken first, the state cache
//! is updated for the known commands, and callbacks fire for messages no
//! parked caller claimed. A message is never handed to both a tan sink
//! and a callback.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::DEFAULT_INSTANCE;
use crate::messages::{vocab, Message};
use crate::session::{client_error, HyperionClient};

/// A subscriber invoked with inbound (and synthetic) messages.
pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// What the receive loop should do after a message was routed.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    Continue,
    /// The live instance changed; the full server state must be reloaded.
    ReloadState,
    /// The server ended the session; disconnect without reconnecting.
    Shutdown,
}

pub(crate) struct CallbackRegistry {
    inner: Mutex<Callbacks>,
}

struct Callbacks {
    by_command: HashMap<String, MessageCallback>,
    default: Option<MessageCallback>,
}

impl CallbackRegistry {
    pub fn new(
        by_command: HashMap<String, MessageCallback>,
        default: Option<MessageCallback>,
    ) -> Self {
        CallbackRegistry {
            inner: Mutex::new(Callbacks {
                by_command,
                default,
            }),
        }
    }

    /// The callback for a command, falling back to the default one.
    /// Cloned out so no lock is held while it runs.
    pub fn resolve(&self, command: &str) -> Option<MessageCallback> {
        let callbacks = self.inner.lock();
        callbacks
            .by_command
            .get(command)
            .or(callbacks.default.as_ref())
            .cloned()
    }

    pub fn set_callbacks(&self, by_command: HashMap<String, MessageCallback>) {
        self.inner.lock().by_command = by_command;
    }

    pub fn set_default(&self, default: Option<MessageCallback>) {
        self.inner.lock().default = default;
    }
}

impl HyperionClient {
    /// Routes one inbound message. See the module docs for the order.
    pub(crate) fn dispatch(&self, msg: &Message) -> DispatchOutcome {
        let delivered = self.tans.deliver(msg);
        let outcome = self.apply_update(msg);
        if !delivered {
            self.invoke_callback(msg);
        }
        outcome
    }

    /// Mutates the state cache for the known commands. Runs for solicited
    /// replies too: a serverinfo fetched on request refreshes the mirror
    /// exactly like the connect-time load.
    fn apply_update(&self, msg: &Message) -> DispatchOutcome {
        let data = msg.data.as_ref();
        let data_object = data.and_then(Value::as_object);
        let data_array = data.and_then(Value::as_array);
        match msg.command.as_str() {
            vocab::SERVERINFO => {
                if let Some(info) = msg.info_object() {
                    self.state.apply_serverinfo(info);
                }
            }
            vocab::COMPONENTS_UPDATE => {
                if let Some(component) = data_object {
                    self.state.update_component(component);
                }
            }
            vocab::ADJUSTMENT_UPDATE => {
                if let Some(adjustment) = data_array {
                    self.state.update_adjustment(adjustment);
                }
            }
            vocab::EFFECTS_UPDATE => {
                if let Some(effects) = data_array {
                    self.state.set_effects(effects.clone());
                }
            }
            vocab::PRIORITIES_UPDATE => {
                if let Some(data) = data_object {
                    self.state.set_priorities(
                        data.get(vocab::KEY_PRIORITIES)
                            .and_then(Value::as_array)
                            .cloned(),
                        data.get(vocab::KEY_PRIORITIES_AUTOSELECT)
                            .and_then(Value::as_bool),
                    );
                }
            }
            vocab::LEDS_UPDATE => {
                if let Some(leds) = data_object
                    .and_then(|data| data.get(vocab::KEY_LEDS))
                    .and_then(Value::as_array)
                {
                    self.state.set_leds(leds.clone());
                }
            }
            vocab::LED_MAPPING_UPDATE => {
                if let Some(mapping) = data_object
                    .and_then(|data| data.get(vocab::KEY_LED_MAPPING_TYPE))
                    .and_then(Value::as_str)
                {
                    self.state.set_led_mapping_type(mapping.to_owned());
                }
            }
            vocab::SESSIONS_UPDATE => {
                if let Some(sessions) = data_array {
                    self.state.set_sessions(sessions.clone());
                }
            }
            vocab::VIDEOMODE_UPDATE => {
                if let Some(videomode) = data_object
                    .and_then(|data| data.get(vocab::KEY_VIDEOMODE))
                    .and_then(Value::as_str)
                {
                    self.state.set_videomode(videomode.to_owned());
                }
            }
            vocab::INSTANCE_UPDATE => {
                if let Some(instances) = data_array {
                    self.state.set_instances(instances.clone());
                }
                // The live instance vanishing from the running subset
                // means the server has moved this connection back to the
                // default instance.
                if let Some(live) = self.instance() {
                    if !self.state.instance_is_running(live) {
                        self.set_target_instance(DEFAULT_INSTANCE);
                        self.set_status(|status| status.instance = Some(DEFAULT_INSTANCE));
                        return DispatchOutcome::ReloadState;
                    }
                }
            }
            vocab::INSTANCE_SWITCH_TO => {
                if msg.is_success() {
                    let switched = msg
                        .info_object()
                        .and_then(|info| info.get(vocab::KEY_INSTANCE))
                        .and_then(Value::as_u64)
                        .and_then(|instance| u32::try_from(instance).ok());
                    if let Some(instance) = switched {
                        if self.instance() != Some(instance) {
                            self.set_target_instance(instance);
                            self.set_status(|status| status.instance = Some(instance));
                            return DispatchOutcome::ReloadState;
                        }
                    }
                }
            }
            vocab::AUTHORIZE_LOGOUT => {
                if msg.is_success() {
                    return DispatchOutcome::Shutdown;
                }
            }
            _ => {}
        }
        DispatchOutcome::Continue
    }

    /// Invokes the command's callback (or the default one). A panicking
    /// callback is contained and logged; it must not take the receive
    /// loop down with it.
    pub(crate) fn invoke_callback(&self, msg: &Message) {
        let Some(callback) = self.callbacks.resolve(&msg.command) else {
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| callback(msg))).is_err() {
            client_error!(self, "callback for '{}' panicked", msg.command);
        }
    }
}
