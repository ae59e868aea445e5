// Hyperion client for Rust
// SPDX-License-Identifier: MPL-2.0

//! The public command surface.
//!
//! Every server command is wrapped twice: `send_X` serializes and writes
//! the request without waiting (true iff the write succeeded), and `X`
//! additionally parks on the allocated tan until the matching reply,
//! resolving to `None` on timeout, transport failure or session
//! termination. Both shapes share one request builder.
//!
//! `params` is the JSON object of command-specific fields. Two control
//! keys are recognized and stripped before sending: `tan` forces the
//! transaction number (raising [`Error::TanNotAvailable`] from the
//! await shape when it is already in flight) and `timeout_secs`
//! overrides the reply deadline.

use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::messages::{reply_command, vocab, Message, SERVERINFO_SUBSCRIPTIONS};

use super::HyperionClient;

/// One outbound request, shared by the send-only and await-response call
/// shapes.
pub(crate) struct Request {
    command: &'static str,
    subcommand: Option<&'static str>,
    body: Map<String, Value>,
    tan: Option<u32>,
    timeout: Option<Duration>,
    default_timeout: Option<Duration>,
}

impl Request {
    pub fn new(command: &'static str, subcommand: Option<&'static str>) -> Self {
        Request {
            command,
            subcommand,
            body: Map::new(),
            tan: None,
            timeout: None,
            default_timeout: None,
        }
    }

    /// Builds a request from caller-supplied fields, stripping the
    /// recognized control keys. Anything that is not a JSON object is
    /// treated as no fields at all.
    pub fn with_params(
        command: &'static str,
        subcommand: Option<&'static str>,
        params: Value,
    ) -> Self {
        let mut body = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let tan = body
            .remove(vocab::KEY_TAN)
            .and_then(|tan| tan.as_u64())
            .and_then(|tan| u32::try_from(tan).ok())
            .filter(|tan| *tan > 0);
        let timeout = body
            .remove(vocab::KEY_TIMEOUT_SECS)
            .and_then(|secs| secs.as_f64())
            .filter(|secs| *secs > 0.0)
            .map(Duration::from_secs_f64);
        Request {
            command,
            subcommand,
            body,
            tan,
            timeout,
            default_timeout: None,
        }
    }

    /// Sets a field, overwriting a caller-supplied value.
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_owned(), value.into());
        self
    }

    /// Sets a field only when the caller did not supply one.
    pub fn default_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.entry(key.to_owned()).or_insert_with(|| value.into());
        self
    }

    /// Command-specific reply deadline used when the caller does not
    /// override it.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn expected_reply(&self) -> String {
        reply_command(self.command, self.subcommand)
    }

    pub fn tan(&self) -> Option<u32> {
        self.tan
    }

    /// The finished wire object for the given tan.
    pub fn body_with_tan(&self, tan: u32) -> Map<String, Value> {
        let mut body = self.body.clone();
        body.insert(vocab::KEY_COMMAND.into(), self.command.into());
        if let Some(subcommand) = self.subcommand {
            body.insert(vocab::KEY_SUBCOMMAND.into(), subcommand.into());
        }
        body.insert(vocab::KEY_TAN.into(), tan.into());
        body
    }
}

/// Generates a 5 character alphanumeric authorization id for token
/// requests that do not carry one.
pub fn generate_auth_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(char::from)
        .collect()
}

impl HyperionClient {
    pub(crate) async fn execute_send(&self, request: Request) -> bool {
        let tan = request
            .tan()
            .unwrap_or_else(|| self.tans.next_send_tan());
        self.send_body(&request.body_with_tan(tan)).await
    }

    pub(crate) async fn execute(&self, request: Request) -> Result<Option<Message>, Error> {
        let tan = match request.tan() {
            Some(tan) => {
                self.tans.reserve(tan)?;
                tan
            }
            None => self.tans.allocate(),
        };
        // Park before writing so an immediate reply cannot race the sink.
        let parked = self.tans.park(tan, request.expected_reply());
        let timeout = request
            .timeout
            .or(request.default_timeout)
            .unwrap_or(self.config.timeout);
        if !self.send_body(&request.body_with_tan(tan)).await {
            return Ok(None);
        }
        let deadline = tokio::time::Instant::now() + timeout;
        Ok(parked.wait(deadline).await)
    }

    pub(crate) fn serverinfo_request(params: Value) -> Request {
        Request::with_params(vocab::SERVERINFO, None, params)
            .field(vocab::KEY_SUBSCRIBE, json!(SERVERINFO_SUBSCRIPTIONS))
    }

    fn request_token_request(&self, params: Value) -> Request {
        Request::with_params(vocab::AUTHORIZE, Some(vocab::SUB_REQUEST_TOKEN), params)
            .default_field(vocab::KEY_ID, generate_auth_id())
            .default_timeout(self.config.request_token_timeout)
    }
}

/// Expands one `send_X` / `X` pair. The doc comment is applied to both
/// shapes; the module docs describe how the shapes differ.
macro_rules! command_pair {
    // A command whose fields come from the caller.
    ($(#[$meta:meta])+ $send:ident / $wait:ident => ($command:expr, $subcommand:expr)) => {
        $(#[$meta])+
        pub async fn $send(&self, params: Value) -> bool {
            self.execute_send(Request::with_params($command, $subcommand, params))
                .await
        }

        $(#[$meta])+
        pub async fn $wait(&self, params: Value) -> Result<Option<Message>, Error> {
            self.execute(Request::with_params($command, $subcommand, params))
                .await
        }
    };

    // Same, with the configured origin inserted when absent.
    ($(#[$meta:meta])+ $send:ident / $wait:ident => ($command:expr, $subcommand:expr), origin) => {
        $(#[$meta])+
        pub async fn $send(&self, params: Value) -> bool {
            let request = Request::with_params($command, $subcommand, params)
                .default_field(vocab::KEY_ORIGIN, self.config.origin.clone());
            self.execute_send(request).await
        }

        $(#[$meta])+
        pub async fn $wait(&self, params: Value) -> Result<Option<Message>, Error> {
            let request = Request::with_params($command, $subcommand, params)
                .default_field(vocab::KEY_ORIGIN, self.config.origin.clone());
            self.execute(request).await
        }
    };

    // A command that takes no fields.
    ($(#[$meta:meta])+ $send:ident / $wait:ident => ($command:expr, $subcommand:expr), no_params) => {
        $(#[$meta])+
        pub async fn $send(&self) -> bool {
            self.execute_send(Request::new($command, $subcommand)).await
        }

        $(#[$meta])+
        pub async fn $wait(&self) -> Result<Option<Message>, Error> {
            self.execute(Request::new($command, $subcommand)).await
        }
    };
}

impl HyperionClient {
    command_pair! {
        /// Sets a color on a priority channel (`color`); the configured
        /// origin is attached when the fields carry none.
        send_set_color / set_color => (vocab::COLOR, None), origin
    }
    command_pair! {
        /// Starts an effect on a priority channel (`effect`); the
        /// configured origin is attached when the fields carry none.
        send_set_effect / set_effect => (vocab::EFFECT, None), origin
    }
    command_pair! {
        /// Shows an image on a priority channel (`image`); the configured
        /// origin is attached when the fields carry none.
        send_set_image / set_image => (vocab::IMAGE, None), origin
    }
    command_pair! {
        /// Clears a priority channel (`clear`).
        send_clear / clear => (vocab::CLEAR, None)
    }
    command_pair! {
        /// Changes color adjustments (`adjustment`).
        send_set_adjustment / set_adjustment => (vocab::ADJUSTMENT, None)
    }
    command_pair! {
        /// Changes the image-to-LED mapping type (`processing`).
        send_set_led_mapping_type / set_led_mapping_type => (vocab::PROCESSING, None)
    }
    command_pair! {
        /// Changes the video mode (`videomode`).
        send_set_videomode / set_videomode => (vocab::VIDEOMODE, None)
    }
    command_pair! {
        /// Enables or disables a component (`componentstate`).
        send_set_component / set_component => (vocab::COMPONENTSTATE, None)
    }
    command_pair! {
        /// Selects the visible priority source (`sourceselect`).
        send_set_sourceselect / set_sourceselect => (vocab::SOURCESELECT, None)
    }
    command_pair! {
        /// Logs in with a token (`authorize/login`).
        send_login / login => (vocab::AUTHORIZE, Some(vocab::SUB_LOGIN))
    }
    command_pair! {
        /// Logs the session out (`authorize/logout`). A successful logout
        /// reply makes the client disconnect without reconnecting.
        send_logout / logout => (vocab::AUTHORIZE, Some(vocab::SUB_LOGOUT)), no_params
    }
    command_pair! {
        /// Asks whether the server requires token authorization
        /// (`authorize/tokenRequired`).
        send_is_auth_required / is_auth_required
            => (vocab::AUTHORIZE, Some(vocab::SUB_TOKEN_REQUIRED)), no_params
    }
    command_pair! {
        /// Starts an instance (`instance/startInstance`).
        send_start_instance / start_instance
            => (vocab::INSTANCE, Some(vocab::SUB_START_INSTANCE))
    }
    command_pair! {
        /// Stops an instance (`instance/stopInstance`).
        send_stop_instance / stop_instance
            => (vocab::INSTANCE, Some(vocab::SUB_STOP_INSTANCE))
    }
    command_pair! {
        /// Switches the session to another instance (`instance/switchTo`).
        /// A successful reply makes the client reload the server state.
        send_switch_instance / switch_instance
            => (vocab::INSTANCE, Some(vocab::SUB_SWITCH_TO))
    }
    command_pair! {
        /// Starts the live image stream (`ledcolors/imagestream-start`).
        send_image_stream_start / image_stream_start
            => (vocab::LEDCOLORS, Some(vocab::SUB_IMAGE_STREAM_START)), no_params
    }
    command_pair! {
        /// Stops the live image stream (`ledcolors/imagestream-stop`).
        send_image_stream_stop / image_stream_stop
            => (vocab::LEDCOLORS, Some(vocab::SUB_IMAGE_STREAM_STOP)), no_params
    }
    command_pair! {
        /// Starts the live LED color stream (`ledcolors/ledstream-start`).
        send_led_stream_start / led_stream_start
            => (vocab::LEDCOLORS, Some(vocab::SUB_LED_STREAM_START)), no_params
    }
    command_pair! {
        /// Stops the live LED color stream (`ledcolors/ledstream-stop`).
        send_led_stream_stop / led_stream_stop
            => (vocab::LEDCOLORS, Some(vocab::SUB_LED_STREAM_STOP)), no_params
    }

    /// Sends a `serverinfo` request without awaiting the reply. The fixed
    /// subscription list is always attached.
    pub async fn send_get_serverinfo(&self, params: Value) -> bool {
        self.execute_send(Self::serverinfo_request(params)).await
    }

    /// Sends a `serverinfo` request and awaits the reply. The fixed
    /// subscription list is always attached; the reply refreshes the
    /// state cache.
    pub async fn get_serverinfo(&self, params: Value) -> Result<Option<Message>, Error> {
        self.execute(Self::serverinfo_request(params)).await
    }

    /// Requests a new authorization token without awaiting the reply.
    /// An `id` is generated when the fields carry none.
    pub async fn send_request_token(&self, params: Value) -> bool {
        let request = self.request_token_request(params);
        self.execute_send(request).await
    }

    /// Requests a new authorization token and awaits the outcome. Token
    /// grants are confirmed by a human in the server UI, so the default
    /// deadline is the configured `request_token_timeout`.
    pub async fn request_token(&self, params: Value) -> Result<Option<Message>, Error> {
        let request = self.request_token_request(params);
        self.execute(request).await
    }

    /// Aborts a pending token request without awaiting the reply.
    pub async fn send_request_token_abort(&self, params: Value) -> bool {
        let request = self.request_token_request(params).field(vocab::KEY_ACCEPT, false);
        self.execute_send(request).await
    }

    /// Aborts a pending token request and awaits the reply.
    pub async fn request_token_abort(&self, params: Value) -> Result<Option<Message>, Error> {
        let request = self.request_token_request(params).field(vocab::KEY_ACCEPT, false);
        self.execute(request).await
    }
}
