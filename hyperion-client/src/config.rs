// Hyperion client for Rust
// SPDX-License-Identifier: MPL-2.0

//! Client configuration data and the builder used to assemble it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::dispatch::MessageCallback;
use crate::session::HyperionClient;

/// Default JSON API port of the server.
pub const DEFAULT_PORT: u16 = 19444;
/// Instance the client binds to when none is configured.
pub const DEFAULT_INSTANCE: u32 = 0;
/// Origin string attached to color/effect/image commands by default.
pub const DEFAULT_ORIGIN: &str = "hyperion-rs";
/// Delay between reconnection attempts.
pub const DEFAULT_CONNECTION_RETRY_DELAY: Duration = Duration::from_secs(30);
/// Deadline for ordinary request/reply round trips.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
/// Deadline for `authorize/requestToken`, which waits on a human pressing
/// a button in the server UI.
pub const DEFAULT_REQUEST_TOKEN_TIMEOUT: Duration = Duration::from_secs(180);

/// Connection settings for a [`HyperionClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server JSON API port.
    pub port: u16,
    /// Authorization token; presence enables the login step of the
    /// connect sequence.
    pub token: Option<String>,
    /// Instance to join on connect, persisted as the target instance
    /// across disconnects.
    pub instance: u32,
    /// Origin inserted into outgoing color/effect/image commands that do
    /// not carry one.
    pub origin: String,
    /// Delay between reconnection attempts after a lost session.
    pub connection_retry_delay: Duration,
    /// Default deadline for await-response calls and for each step of the
    /// connect sequence.
    pub timeout: Duration,
    /// Default deadline for token requests.
    pub request_token_timeout: Duration,
}

impl ClientConfig {
    /// Settings for the given host with every other option at its default.
    pub fn new(host: impl Into<String>) -> Self {
        ClientConfig {
            host: host.into(),
            port: DEFAULT_PORT,
            token: None,
            instance: DEFAULT_INSTANCE,
            origin: DEFAULT_ORIGIN.to_owned(),
            connection_retry_delay: DEFAULT_CONNECTION_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
            request_token_timeout: DEFAULT_REQUEST_TOKEN_TIMEOUT,
        }
    }
}

/// Builder for a [`HyperionClient`].
///
/// ```no_run
/// use hyperion_client::ClientBuilder;
///
/// # async fn connect() {
/// let client = ClientBuilder::new("hyperion.local")
///     .token("my-token")
///     .build();
/// client.connect().await;
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    callbacks: HashMap<String, MessageCallback>,
    default_callback: Option<MessageCallback>,
}

impl ClientBuilder {
    /// Creates a builder for a client of the given host.
    pub fn new(host: impl Into<String>) -> Self {
        ClientBuilder {
            config: ClientConfig::new(host),
            callbacks: HashMap::new(),
            default_callback: None,
        }
    }

    /// Sets the server port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the authorization token, enabling the login step on connect.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    /// Sets the instance the session should join.
    pub fn instance(mut self, instance: u32) -> Self {
        self.config.instance = instance;
        self
    }

    /// Sets the origin reported with color/effect/image commands.
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.config.origin = origin.into();
        self
    }

    /// Sets the delay between reconnection attempts.
    pub fn connection_retry_delay(mut self, delay: Duration) -> Self {
        self.config.connection_retry_delay = delay;
        self
    }

    /// Sets the default request deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the deadline for token requests.
    pub fn request_token_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_token_timeout = timeout;
        self
    }

    /// Registers a callback for one inbound command. The synthetic
    /// `client-update` event is a valid key.
    pub fn callback(
        mut self,
        command: impl Into<String>,
        callback: impl Fn(&crate::Message) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.insert(command.into(), Arc::new(callback));
        self
    }

    /// Registers the callback invoked for inbound messages with no
    /// command-specific callback.
    pub fn default_callback(
        mut self,
        callback: impl Fn(&crate::Message) + Send + Sync + 'static,
    ) -> Self {
        self.default_callback = Some(Arc::new(callback));
        self
    }

    /// Builds the (not yet connected) client.
    pub fn build(self) -> Arc<HyperionClient> {
        HyperionClient::new(self.config, self.callbacks, self.default_callback)
    }
}
