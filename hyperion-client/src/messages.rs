// Hyperion client for Rust
// SPDX-License-Identifier: MPL-2.0

//! The JSON message envelope and the server's command vocabulary.
//!
//! Every frame on the wire is a single JSON object with a mandatory
//! `command` field. Requests may carry a `tan` (transaction number) which
//! the server echoes on the matching reply; push updates use the
//! `*-update` command family and carry no meaningful tan.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Well-known command, subcommand and field names of the server protocol.
pub mod vocab {
    #![allow(missing_docs)]

    /// Aggregate state query, also subscribes to push updates.
    pub const SERVERINFO: &str = "serverinfo";
    pub const AUTHORIZE: &str = "authorize";
    pub const AUTHORIZE_LOGOUT: &str = "authorize-logout";
    pub const INSTANCE: &str = "instance";
    pub const INSTANCE_SWITCH_TO: &str = "instance-switchTo";
    pub const COLOR: &str = "color";
    pub const EFFECT: &str = "effect";
    pub const IMAGE: &str = "image";
    pub const CLEAR: &str = "clear";
    pub const ADJUSTMENT: &str = "adjustment";
    pub const PROCESSING: &str = "processing";
    pub const VIDEOMODE: &str = "videomode";
    pub const COMPONENTSTATE: &str = "componentstate";
    pub const SOURCESELECT: &str = "sourceselect";
    pub const LEDCOLORS: &str = "ledcolors";

    pub const SUB_LOGIN: &str = "login";
    pub const SUB_LOGOUT: &str = "logout";
    pub const SUB_REQUEST_TOKEN: &str = "requestToken";
    pub const SUB_TOKEN_REQUIRED: &str = "tokenRequired";
    pub const SUB_START_INSTANCE: &str = "startInstance";
    pub const SUB_STOP_INSTANCE: &str = "stopInstance";
    pub const SUB_SWITCH_TO: &str = "switchTo";
    pub const SUB_IMAGE_STREAM_START: &str = "imagestream-start";
    pub const SUB_IMAGE_STREAM_STOP: &str = "imagestream-stop";
    pub const SUB_LED_STREAM_START: &str = "ledstream-start";
    pub const SUB_LED_STREAM_STOP: &str = "ledstream-stop";

    pub const COMPONENTS_UPDATE: &str = "components-update";
    pub const ADJUSTMENT_UPDATE: &str = "adjustment-update";
    pub const EFFECTS_UPDATE: &str = "effects-update";
    pub const PRIORITIES_UPDATE: &str = "priorities-update";
    pub const LEDS_UPDATE: &str = "leds-update";
    pub const LED_MAPPING_UPDATE: &str = "imageToLedMapping-update";
    pub const SESSIONS_UPDATE: &str = "sessions-update";
    pub const VIDEOMODE_UPDATE: &str = "videomode-update";
    pub const INSTANCE_UPDATE: &str = "instance-update";

    /// Synthetic event emitted by the client itself on session changes.
    pub const CLIENT_UPDATE: &str = "client-update";

    pub const KEY_COMMAND: &str = "command";
    pub const KEY_SUBCOMMAND: &str = "subcommand";
    pub const KEY_TAN: &str = "tan";
    pub const KEY_TIMEOUT_SECS: &str = "timeout_secs";
    pub const KEY_TOKEN: &str = "token";
    pub const KEY_ID: &str = "id";
    pub const KEY_ACCEPT: &str = "accept";
    pub const KEY_ORIGIN: &str = "origin";
    pub const KEY_SUBSCRIBE: &str = "subscribe";
    pub const KEY_INSTANCE: &str = "instance";
    pub const KEY_RUNNING: &str = "running";
    pub const KEY_NAME: &str = "name";
    pub const KEY_ENABLED: &str = "enabled";
    pub const KEY_COMPONENTS: &str = "components";
    pub const KEY_ADJUSTMENT: &str = "adjustment";
    pub const KEY_EFFECTS: &str = "effects";
    pub const KEY_LEDS: &str = "leds";
    pub const KEY_PRIORITIES: &str = "priorities";
    pub const KEY_PRIORITIES_AUTOSELECT: &str = "priorities_autoselect";
    pub const KEY_VIDEOMODE: &str = "videomode";
    pub const KEY_LED_MAPPING_TYPE: &str = "imageToLedMappingType";
    pub const KEY_SESSIONS: &str = "sessions";
    pub const KEY_VISIBLE: &str = "visible";
    pub const KEY_CONNECTED: &str = "connected";
    pub const KEY_LOGGED_IN: &str = "logged-in";
    // The instance subcommand and the synthetic event key are distinct
    // names; do not conflate them.
    pub const KEY_LOADED_STATE: &str = "loaded-state";

    /// Master on/off switch in the component map.
    pub const COMPONENT_ALL: &str = "ALL";
}

/// Update families every serverinfo request subscribes to.
pub const SERVERINFO_SUBSCRIPTIONS: [&str; 9] = [
    vocab::ADJUSTMENT_UPDATE,
    vocab::COMPONENTS_UPDATE,
    vocab::EFFECTS_UPDATE,
    vocab::LEDS_UPDATE,
    vocab::LED_MAPPING_UPDATE,
    vocab::INSTANCE_UPDATE,
    vocab::PRIORITIES_UPDATE,
    vocab::SESSIONS_UPDATE,
    vocab::VIDEOMODE_UPDATE,
];

/// A decoded server message (or a synthetic client event).
///
/// The well-known envelope fields are typed; everything else a command
/// carries is preserved verbatim in [`Message::fields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The command this message belongs to.
    pub command: String,
    /// Request subcommand; replies carry it composed into `command`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcommand: Option<String>,
    /// Transaction number; 0 or absent on unsolicited messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tan: Option<u32>,
    /// Whether the server flagged the operation as successful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Reply payload of queries such as `serverinfo`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
    /// Payload of push updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Any command-specific fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Message {
    /// An empty message for the given command.
    pub fn new(command: impl Into<String>) -> Self {
        Message {
            command: command.into(),
            subcommand: None,
            tan: None,
            success: None,
            info: None,
            data: None,
            fields: Map::new(),
        }
    }

    /// Whether the server flagged this message as successful.
    pub fn is_success(&self) -> bool {
        self.success == Some(true)
    }

    /// The tan this message answers, if it answers one at all.
    pub fn solicited_tan(&self) -> Option<u32> {
        self.tan.filter(|tan| *tan > 0)
    }

    /// The `info` payload as an object, when present.
    pub fn info_object(&self) -> Option<&Map<String, Value>> {
        self.info.as_ref().and_then(Value::as_object)
    }
}

/// Compose the reply command the server uses for a request.
///
/// A request `command=C, subcommand=S` is answered with `command=C-S`;
/// without a subcommand the reply carries the request command unchanged.
pub fn reply_command(command: &str, subcommand: Option<&str>) -> String {
    match subcommand {
        Some(sub) => format!("{command}-{sub}"),
        None => command.to_owned(),
    }
}

/// Whether an inbound command satisfies an expected reply command.
///
/// The live-stream start requests are acknowledged with the rolling
/// `…-update` command rather than an echo of `…-start`.
pub(crate) fn reply_matches(expected: &str, actual: &str) -> bool {
    if actual == expected {
        return true;
    }
    match (expected.strip_suffix("-start"), actual.strip_suffix("-update")) {
        (Some(exp), Some(act)) => exp == act,
        _ => false,
    }
}

/// Serialize a JSON object with canonical (sorted) key order.
///
/// `serde_json`'s default map is ordered, so any `Value` object encodes
/// deterministically; requests are built as `Value` objects for exactly
/// this reason.
pub(crate) fn encode_line(body: &Map<String, Value>) -> String {
    Value::Object(body.clone()).to_string()
}
