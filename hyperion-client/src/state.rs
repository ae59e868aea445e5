//! In-memory mirror of the server's state.
//!
//! The cache is written exclusively by the dispatcher as messages arrive;
//! everything else reads snapshots through the accessors. Composite
//! accessors return stable copies, never references into the cache.

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::messages::vocab;

#[derive(Default)]
pub(crate) struct StateCache {
    inner: RwLock<ServerState>,
}

#[derive(Default)]
struct ServerState {
    /// The last full serverinfo payload, kept verbatim.
    serverinfo: Option<Map<String, Value>>,
    components: Vec<Value>,
    adjustment: Vec<Value>,
    effects: Vec<Value>,
    leds: Vec<Value>,
    priorities: Vec<Value>,
    priorities_autoselect: Option<bool>,
    videomode: Option<String>,
    led_mapping_type: Option<String>,
    sessions: Vec<Value>,
    instances: Vec<Value>,
}

fn as_vec(value: Option<&Value>) -> Option<Vec<Value>> {
    value.and_then(Value::as_array).cloned()
}

impl StateCache {
    /// Replaces the whole mirror from a serverinfo payload.
    pub fn apply_serverinfo(&self, info: &Map<String, Value>) {
        let mut state = self.inner.write();
        state.serverinfo = Some(info.clone());
        if let Some(components) = as_vec(info.get(vocab::KEY_COMPONENTS)) {
            state.components = components;
        }
        if let Some(adjustment) = as_vec(info.get(vocab::KEY_ADJUSTMENT)) {
            state.adjustment = adjustment;
        }
        if let Some(effects) = as_vec(info.get(vocab::KEY_EFFECTS)) {
            state.effects = effects;
        }
        if let Some(leds) = as_vec(info.get(vocab::KEY_LEDS)) {
            state.leds = leds;
        }
        if let Some(priorities) = as_vec(info.get(vocab::KEY_PRIORITIES)) {
            state.priorities = priorities;
        }
        if let Some(autoselect) = info
            .get(vocab::KEY_PRIORITIES_AUTOSELECT)
            .and_then(Value::as_bool)
        {
            state.priorities_autoselect = Some(autoselect);
        }
        if let Some(videomode) = info.get(vocab::KEY_VIDEOMODE).and_then(Value::as_str) {
            state.videomode = Some(videomode.to_owned());
        }
        if let Some(mapping) = info
            .get(vocab::KEY_LED_MAPPING_TYPE)
            .and_then(Value::as_str)
        {
            state.led_mapping_type = Some(mapping.to_owned());
        }
        if let Some(sessions) = as_vec(info.get(vocab::KEY_SESSIONS)) {
            state.sessions = sessions;
        }
        if let Some(instances) = as_vec(info.get(vocab::KEY_INSTANCE)) {
            state.instances = instances;
        }
    }

    /// Upserts one component's enabled flag. Names the mirror has never
    /// seen are accepted and stored.
    pub fn update_component(&self, data: &Map<String, Value>) {
        let Some(name) = data.get(vocab::KEY_NAME).and_then(Value::as_str) else {
            return;
        };
        let mut state = self.inner.write();
        if let Some(Value::Object(component)) = state.components.iter_mut().find(|component| {
            component.get(vocab::KEY_NAME).and_then(Value::as_str) == Some(name)
        }) {
            for (key, value) in data {
                component.insert(key.clone(), value.clone());
            }
            return;
        }
        state.components.push(Value::Object(data.clone()));
    }

    /// Merges the fields of the first supplied adjustment into the first
    /// mirrored one.
    pub fn update_adjustment(&self, data: &[Value]) {
        let Some(Value::Object(update)) = data.first() else {
            return;
        };
        let mut state = self.inner.write();
        if let Some(Value::Object(current)) = state.adjustment.first_mut() {
            for (key, value) in update {
                current.insert(key.clone(), value.clone());
            }
            return;
        }
        state.adjustment = data.to_vec();
    }

    pub fn set_effects(&self, effects: Vec<Value>) {
        self.inner.write().effects = effects;
    }

    pub fn set_priorities(&self, priorities: Option<Vec<Value>>, autoselect: Option<bool>) {
        let mut state = self.inner.write();
        if let Some(priorities) = priorities {
            state.priorities = priorities;
        }
        if autoselect.is_some() {
            state.priorities_autoselect = autoselect;
        }
    }

    pub fn set_leds(&self, leds: Vec<Value>) {
        self.inner.write().leds = leds;
    }

    pub fn set_led_mapping_type(&self, mapping: String) {
        self.inner.write().led_mapping_type = Some(mapping);
    }

    pub fn set_sessions(&self, sessions: Vec<Value>) {
        self.inner.write().sessions = sessions;
    }

    pub fn set_videomode(&self, videomode: String) {
        self.inner.write().videomode = Some(videomode);
    }

    pub fn set_instances(&self, instances: Vec<Value>) {
        self.inner.write().instances = instances;
    }

    /// Whether an instance is currently in the running subset.
    pub fn instance_is_running(&self, instance: u32) -> bool {
        self.inner.read().instances.iter().any(|record| {
            record.get(vocab::KEY_INSTANCE).and_then(Value::as_u64) == Some(u64::from(instance))
                && record.get(vocab::KEY_RUNNING).and_then(Value::as_bool) == Some(true)
        })
    }

    // Read-only views. Each returns a detached copy.

    pub fn serverinfo(&self) -> Option<Map<String, Value>> {
        self.inner.read().serverinfo.clone()
    }

    pub fn components(&self) -> Vec<Value> {
        self.inner.read().components.clone()
    }

    pub fn adjustment(&self) -> Vec<Value> {
        self.inner.read().adjustment.clone()
    }

    pub fn effects(&self) -> Vec<Value> {
        self.inner.read().effects.clone()
    }

    pub fn leds(&self) -> Vec<Value> {
        self.inner.read().leds.clone()
    }

    pub fn priorities(&self) -> Vec<Value> {
        self.inner.read().priorities.clone()
    }

    pub fn priorities_autoselect(&self) -> Option<bool> {
        self.inner.read().priorities_autoselect
    }

    /// The first priority entry marked visible, if any.
    pub fn visible_priority(&self) -> Option<Value> {
        self.inner
            .read()
            .priorities
            .iter()
            .find(|entry| entry.get(vocab::KEY_VISIBLE).and_then(Value::as_bool) == Some(true))
            .cloned()
    }

    pub fn videomode(&self) -> Option<String> {
        self.inner.read().videomode.clone()
    }

    pub fn led_mapping_type(&self) -> Option<String> {
        self.inner.read().led_mapping_type.clone()
    }

    pub fn sessions(&self) -> Vec<Value> {
        self.inner.read().sessions.clone()
    }

    /// Instance records restricted to the running subset.
    pub fn instances(&self) -> Vec<Value> {
        self.inner
            .read()
            .instances
            .iter()
            .filter(|record| {
                record.get(vocab::KEY_RUNNING).and_then(Value::as_bool) == Some(true)
            })
            .cloned()
            .collect()
    }

    /// True iff every listed component is enabled. An empty list asks
    /// about the master switch.
    pub fn is_on(&self, components: &[&str]) -> bool {
        let queried: &[&str] = if components.is_empty() {
            &[vocab::COMPONENT_ALL]
        } else {
            components
        };
        let state = self.inner.read();
        queried.iter().all(|name| {
            state.components.iter().any(|component| {
                component.get(vocab::KEY_NAME).and_then(Value::as_str) == Some(*name)
                    && component.get(vocab::KEY_ENABLED).and_then(Value::as_bool) == Some(true)
            })
        })
    }
}
