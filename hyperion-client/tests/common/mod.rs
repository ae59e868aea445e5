//! Shared harness: a scriptable server on a loopback port plus the
//! canonical serverinfo fixture the tests connect against.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use hyperion_client::{ClientBuilder, HyperionClient, Message, MessageCallback};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

const HARNESS_TIMEOUT: Duration = Duration::from_secs(2);

pub struct MockServer {
    listener: TcpListener,
    pub port: u16,
}

impl MockServer {
    pub async fn start() -> Self {
        Self::bind(0).await
    }

    /// Binds a specific port; used to bring a server back for
    /// reconnection tests.
    pub async fn bind(port: u16) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        MockServer { listener, port }
    }

    pub async fn accept(&self) -> ServerConn {
        let (stream, _) = tokio::time::timeout(HARNESS_TIMEOUT, self.listener.accept())
            .await
            .expect("no client connection within the harness timeout")
            .expect("accept failed");
        let (read, write) = stream.into_split();
        ServerConn {
            reader: BufReader::new(read),
            writer: write,
        }
    }

    pub async fn expect_no_connection(&self, within: Duration) {
        assert!(
            tokio::time::timeout(within, self.listener.accept())
                .await
                .is_err(),
            "unexpected client connection"
        );
    }
}

pub struct ServerConn {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl ServerConn {
    /// Reads and decodes the next request line.
    pub async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let read = tokio::time::timeout(HARNESS_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("no client request within the harness timeout")
            .expect("read failed");
        assert!(read > 0, "client closed the connection");
        serde_json::from_str(&line).expect("client wrote unparseable JSON")
    }

    /// Reads the next request and asserts it equals `expected`.
    pub async fn expect(&mut self, expected: Value) {
        assert_eq!(self.recv().await, expected);
    }

    pub async fn expect_no_request(&mut self, within: Duration) {
        let mut line = String::new();
        let read = tokio::time::timeout(within, self.reader.read_line(&mut line)).await;
        assert!(
            read.is_err(),
            "unexpected client request: {}",
            line.trim_end()
        );
    }

    pub async fn send(&mut self, msg: &Value) {
        self.send_raw(&msg.to_string()).await;
    }

    /// Writes a raw line; lets tests inject unparseable frames.
    pub async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// The state snapshot the mock server hands out.
pub fn serverinfo_info() -> Value {
    json!({
        "components": [
            {"name": "ALL", "enabled": true},
            {"name": "SMOOTHING", "enabled": true},
            {"name": "BLACKBORDER", "enabled": true},
            {"name": "FORWARDER", "enabled": false},
            {"name": "BOBLIGHTSERVER", "enabled": false},
            {"name": "GRABBER", "enabled": false},
            {"name": "V4L", "enabled": true},
            {"name": "LEDDEVICE", "enabled": true},
        ],
        "adjustment": [
            {"brightness": 83, "gammaBlue": 1.4, "gammaGreen": 1.4, "gammaRed": 1.4, "id": "default"},
        ],
        "effects": [
            {"args": {"rotationTime": 60}, "name": "Rainbow swirl", "script": ":/effects//rainbow-swirl.py"},
            {"args": {"hueChange": 30}, "name": "Warm mood blobs", "script": ":/effects//mood-blobs.py"},
        ],
        "leds": [
            {"hmax": 0.5, "hmin": 0.0, "vmax": 1.0, "vmin": 0.0},
            {"hmax": 1.0, "hmin": 0.5, "vmax": 1.0, "vmin": 0.0},
        ],
        "priorities": [
            {"active": true, "componentId": "GRABBER", "origin": "System", "owner": "X11", "priority": 240, "visible": true},
            {"active": true, "componentId": "EFFECT", "origin": "System", "owner": "Warm mood blobs", "priority": 254, "visible": false},
        ],
        "priorities_autoselect": true,
        "videomode": "2D",
        "imageToLedMappingType": "multicolor_mean",
        "sessions": [],
        "instance": [
            {"friendly_name": "Test instance 0", "instance": 0, "running": true},
            {"friendly_name": "Test instance 1", "instance": 1, "running": true},
            {"friendly_name": "Test instance 2", "instance": 2, "running": false},
        ],
    })
}

pub fn serverinfo_info_map() -> Map<String, Value> {
    match serverinfo_info() {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub fn serverinfo_request(tan: u32) -> Value {
    json!({
        "command": "serverinfo",
        "subscribe": [
            "adjustment-update",
            "components-update",
            "effects-update",
            "leds-update",
            "imageToLedMapping-update",
            "instance-update",
            "priorities-update",
            "sessions-update",
            "videomode-update",
        ],
        "tan": tan,
    })
}

pub fn serverinfo_response(tan: u32) -> Value {
    json!({
        "command": "serverinfo",
        "info": serverinfo_info(),
        "success": true,
        "tan": tan,
    })
}

/// Builder pointed at the mock server, with timings tightened so the
/// reconnect and timeout paths run in test time.
pub fn test_builder(port: u16) -> ClientBuilder {
    ClientBuilder::new("127.0.0.1")
        .port(port)
        .timeout(Duration::from_millis(800))
        .connection_retry_delay(Duration::from_millis(300))
}

/// Accepts the connection and serves the initial serverinfo exchange.
pub async fn serve_initial_connect(server: &MockServer) -> ServerConn {
    let mut conn = server.accept().await;
    conn.expect(serverinfo_request(1)).await;
    conn.send(&serverinfo_response(1)).await;
    conn
}

/// A server plus a client connected through the default sequence.
pub async fn connected_client() -> (MockServer, ServerConn, Arc<HyperionClient>) {
    connected_client_with(|builder| builder).await
}

pub async fn connected_client_with(
    configure: impl FnOnce(ClientBuilder) -> ClientBuilder,
) -> (MockServer, ServerConn, Arc<HyperionClient>) {
    let server = MockServer::start().await;
    let client = configure(test_builder(server.port)).build();
    let (conn, ok) = tokio::join!(serve_initial_connect(&server), client.connect());
    assert!(ok, "connect failed");
    (server, conn, client)
}

/// A callback that forwards every message into a channel the test can
/// await on.
pub fn recording_callback() -> (
    MessageCallback,
    tokio::sync::mpsc::UnboundedReceiver<Message>,
) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let callback: MessageCallback = Arc::new(move |msg: &Message| {
        let _ = tx.send(msg.clone());
    });
    (callback, rx)
}

pub async fn next_event(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Message>) -> Message {
    tokio::time::timeout(HARNESS_TIMEOUT, rx.recv())
        .await
        .expect("no callback delivery within the harness timeout")
        .expect("callback channel closed")
}

/// Skips deliveries until one matches, within the harness timeout.
pub async fn next_event_where(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<Message>,
    mut pred: impl FnMut(&Message) -> bool,
) -> Message {
    loop {
        let msg = next_event(rx).await;
        if pred(&msg) {
            return msg;
        }
    }
}

/// Polls a condition until it holds; panics after the harness timeout.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + HARNESS_TIMEOUT;
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within the harness timeout"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
