//! The session setup sequence.
//!
//! Connect runs transport open → authorize → instance switch → state
//! load before the receive task exists, reading replies inline. Inbound
//! traffic that is not the awaited reply (push updates can arrive as
//! soon as the socket opens) still goes through the dispatcher.

use serde_json::Value;

use crate::config::DEFAULT_INSTANCE;
use crate::error::Error;
use crate::messages::{reply_matches, vocab, Message};
use crate::transport::{self, LineReader};

use super::commands::Request;
use super::{client_debug, client_info, HyperionClient};

impl HyperionClient {
    /// Opens the transport and, unless `raw`, drives the setup sequence
    /// to its end. Any failing step is session-fatal: the caller tears
    /// the session down and either reports failure or schedules a
    /// reconnect attempt.
    pub(crate) async fn establish_session(&self, raw: bool) -> Result<LineReader, Error> {
        let (mut reader, writer) =
            transport::connect(&self.config.host, self.config.port, self.config.timeout).await?;
        *self.writer.lock() = Some(std::sync::Arc::new(tokio::sync::Mutex::new(writer)));
        self.set_status(|status| {
            status.connected = true;
            status.logged_in = false;
            status.instance = Some(DEFAULT_INSTANCE);
            status.loaded_state = false;
        });
        if raw {
            client_info!(self, "raw connection established");
            return Ok(reader);
        }

        if let Some(token) = self.config.token.clone() {
            let request = Request::new(vocab::AUTHORIZE, Some(vocab::SUB_LOGIN))
                .field(vocab::KEY_TOKEN, token);
            let reply = self.setup_request(&mut reader, request).await?;
            if !reply.is_success() {
                return Err(Error::Protocol("authorization was rejected".into()));
            }
            self.set_status(|status| status.logged_in = true);
        }

        let target = self.target_instance();
        if target != DEFAULT_INSTANCE {
            let request = Request::new(vocab::INSTANCE, Some(vocab::SUB_SWITCH_TO))
                .field(vocab::KEY_INSTANCE, target);
            let reply = self.setup_request(&mut reader, request).await?;
            if !reply.is_success() {
                return Err(Error::Protocol(format!(
                    "server refused to switch to instance {target}"
                )));
            }
            self.set_status(|status| status.instance = Some(target));
        }

        let reply = self
            .setup_request(&mut reader, Self::serverinfo_request(Value::Null))
            .await?;
        if reply.info_object().is_none() {
            return Err(Error::Protocol("serverinfo reply carried no state".into()));
        }
        self.set_status(|status| status.loaded_state = true);
        client_info!(self, "session established");
        Ok(reader)
    }

    /// Writes one setup request and reads until its reply, dispatching
    /// unrelated traffic on the way. Each step gets the configured
    /// request deadline.
    async fn setup_request(
        &self,
        reader: &mut LineReader,
        request: Request,
    ) -> Result<Message, Error> {
        let tan = self.tans.allocate();
        let expected = request.expected_reply();
        if let Err(err) = self.write_request(&request.body_with_tan(tan)).await {
            self.tans.release(tan);
            return Err(err);
        }
        let deadline = tokio::time::Instant::now() + self.config.timeout;
        loop {
            let msg = match tokio::time::timeout_at(deadline, transport::next_message(reader)).await
            {
                Ok(Ok(msg)) => msg,
                Ok(Err(err)) => {
                    self.tans.release(tan);
                    return Err(err);
                }
                Err(_) => {
                    self.tans.release(tan);
                    client_debug!(self, "no reply to '{expected}' within the deadline");
                    return Err(Error::Timeout);
                }
            };
            let is_reply =
                msg.solicited_tan() == Some(tan) && reply_matches(&expected, &msg.command);
            // The dispatcher sees setup traffic too, so the cache fills
            // and subscribed callbacks fire from the very first message.
            let _ = self.dispatch(&msg);
            if is_reply {
                self.tans.release(tan);
                return Ok(msg);
            }
        }
    }

    /// Re-runs the state load on an already-connected session through the
    /// regular await-response path.
    pub(crate) async fn refresh_state(&self) -> bool {
        match self.get_serverinfo(Value::Null).await {
            Ok(Some(reply)) if reply.info_object().is_some() => {
                self.set_status(|status| status.loaded_state = true);
                true
            }
            _ => false,
        }
    }
}
