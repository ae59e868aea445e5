//! Session establishment: the connect sequence, its failure modes and
//! the synthetic client-update events it emits.

mod common;

use common::*;
use serde_json::{json, Value};

#[tokio::test]
async fn basic_connect_loads_state() {
    let (_server, conn, client) = connected_client().await;

    assert!(client.is_connected());
    assert!(!client.is_logged_in());
    assert!(client.has_loaded_state());
    assert_eq!(client.instance(), Some(0));
    assert_eq!(client.target_instance(), 0);
    assert_eq!(client.serverinfo(), Some(serverinfo_info_map()));
    assert!(client.is_on(&[]));
    assert!(client.is_on(&["ALL", "SMOOTHING", "BLACKBORDER"]));
    assert!(!client.is_on(&["ALL", "GRABBER", "BLACKBORDER"]));
    assert_eq!(client.instances().len(), 2);

    assert!(client.disconnect().await);
    assert!(!client.is_connected());
    assert_eq!(client.instance(), None);
    drop(conn);
}

#[tokio::test]
async fn token_connect_logs_in() {
    let server = MockServer::start().await;
    let client = test_builder(server.port).token("FAKE_TOKEN").build();

    let flow = async {
        let mut conn = server.accept().await;
        conn.expect(json!({
            "command": "authorize",
            "subcommand": "login",
            "tan": 1,
            "token": "FAKE_TOKEN",
        }))
        .await;
        conn.send(&json!({"command": "authorize-login", "success": true, "tan": 1}))
            .await;
        conn.expect(serverinfo_request(2)).await;
        conn.send(&serverinfo_response(2)).await;
        conn
    };
    let (_conn, ok) = tokio::join!(flow, client.connect());

    assert!(ok);
    assert!(client.is_logged_in());
    assert!(client.has_loaded_state());
}

#[tokio::test]
async fn rejected_login_fails_the_connect() {
    let server = MockServer::start().await;
    let client = test_builder(server.port).token("BAD_TOKEN").build();

    let flow = async {
        let mut conn = server.accept().await;
        conn.recv().await;
        conn.send(&json!({"command": "authorize-login", "success": false, "tan": 1}))
            .await;
        conn
    };
    let (_conn, ok) = tokio::join!(flow, client.connect());

    assert!(!ok);
    assert!(!client.is_connected());
    assert!(!client.is_logged_in());
}

#[tokio::test]
async fn connect_joins_the_configured_instance() {
    let server = MockServer::start().await;
    let client = test_builder(server.port).instance(1).build();

    let flow = async {
        let mut conn = server.accept().await;
        conn.expect(json!({
            "command": "instance",
            "instance": 1,
            "subcommand": "switchTo",
            "tan": 1,
        }))
        .await;
        conn.send(&json!({
            "command": "instance-switchTo",
            "info": {"instance": 1},
            "success": true,
            "tan": 1,
        }))
        .await;
        conn.expect(serverinfo_request(2)).await;
        conn.send(&serverinfo_response(2)).await;
        conn
    };
    let (_conn, ok) = tokio::join!(flow, client.connect());

    assert!(ok);
    assert_eq!(client.instance(), Some(1));
    assert_eq!(client.target_instance(), 1);
}

#[tokio::test]
async fn raw_connect_skips_the_session_sequence() {
    let server = MockServer::start().await;
    let client = test_builder(server.port).build();

    let (conn, ok) = tokio::join!(server.accept(), client.connect_raw());
    assert!(ok);
    assert!(client.is_connected());
    assert!(!client.is_logged_in());
    assert!(!client.has_loaded_state());
    assert_eq!(client.instance(), Some(0));

    // The receive task is live: pushes reach the cache without any
    // state having been loaded.
    let mut conn = conn;
    conn.send(&json!({
        "command": "components-update",
        "data": {"enabled": true, "name": "SMOOTHING"},
    }))
    .await;
    wait_until(|| client.is_on(&["SMOOTHING"])).await;

    assert!(client.disconnect().await);
}

#[tokio::test]
async fn connect_on_a_live_session_refreshes_state() {
    let (_server, mut conn, client) = connected_client().await;

    let flow = async {
        conn.expect(serverinfo_request(2)).await;
        conn.send(&serverinfo_response(2)).await;
    };
    let (_, ok) = tokio::join!(flow, client.connect());
    assert!(ok);
    assert!(client.is_connected());
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (_server, _conn, client) = connected_client().await;
    assert!(client.disconnect().await);
    assert!(client.disconnect().await);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn connect_failure_returns_false() {
    // Grab a port with no listener behind it.
    let port = MockServer::start().await.port;
    let client = test_builder(port).build();
    assert!(!client.connect().await);
    assert!(!client.is_connected());
    // Failing to connect leaves nothing to clean up.
    assert!(client.disconnect().await);
}

#[tokio::test]
async fn client_id_names_host_port_and_target_instance() {
    let (_server, _conn, client) = connected_client().await;
    let id = client.id();
    assert!(id.starts_with("127.0.0.1:"));
    assert!(id.ends_with("-0"));
}

fn client_update(connected: bool, logged_in: bool, instance: Value, loaded: bool) -> Value {
    json!({
        "command": "client-update",
        "connected": connected,
        "logged-in": logged_in,
        "instance": instance,
        "loaded-state": loaded,
    })
}

#[tokio::test]
async fn client_update_events_track_the_session() {
    let (events_cb, mut events) = recording_callback();
    let (serverinfo_cb, mut serverinfos) = recording_callback();
    let (_server, _conn, client) = connected_client_with(move |builder| {
        builder
            .callback("client-update", move |msg| events_cb(msg))
            .callback("serverinfo", move |msg| serverinfo_cb(msg))
    })
    .await;

    let connected = next_event(&mut events).await;
    assert_eq!(
        serde_json::to_value(&connected).unwrap(),
        client_update(true, false, json!(0), false)
    );
    let loaded = next_event(&mut events).await;
    assert_eq!(
        serde_json::to_value(&loaded).unwrap(),
        client_update(true, false, json!(0), true)
    );

    // The connect-time state load reaches the serverinfo callback.
    let serverinfo = next_event(&mut serverinfos).await;
    assert_eq!(
        serde_json::to_value(&serverinfo).unwrap(),
        serverinfo_response(1)
    );

    client.disconnect().await;
    let disconnected = next_event(&mut events).await;
    assert_eq!(
        serde_json::to_value(&disconnected).unwrap(),
        client_update(false, false, Value::Null, false)
    );
}

#[tokio::test]
async fn callbacks_route_by_command_with_a_default() {
    let (specific_cb, mut specific) = recording_callback();
    let (default_cb, mut default) = recording_callback();
    let (_server, mut conn, client) = connected_client_with(move |builder| {
        builder
            .callback("components-update", move |msg| specific_cb(msg))
            .default_callback(move |msg| default_cb(msg))
    })
    .await;

    let update = json!({
        "command": "components-update",
        "data": {"enabled": false, "name": "SMOOTHING"},
    });
    conn.send(&update).await;
    let delivered = next_event(&mut specific).await;
    assert_eq!(serde_json::to_value(&delivered).unwrap(), update);

    // A command with no specific callback lands on the default one.
    // (The default callback also saw the connect-time serverinfo reply
    // and the synthetic client-update events; skip past those.)
    let stray = json!({"command": "random-update"});
    conn.send(&stray).await;
    let delivered = next_event_where(&mut default, |msg| msg.command == "random-update").await;
    assert_eq!(serde_json::to_value(&delivered).unwrap(), stray);

    // Replacing the tables reroutes subsequent messages.
    let (replacement_cb, mut replacement) = recording_callback();
    let mut callbacks = std::collections::HashMap::new();
    callbacks.insert("random-update".to_owned(), replacement_cb);
    client.set_callbacks(callbacks);
    client.set_default_callback(None);
    conn.send(&stray).await;
    let delivered = next_event(&mut replacement).await;
    assert_eq!(serde_json::to_value(&delivered).unwrap(), stray);

    client.disconnect().await;
}

#[tokio::test]
async fn panicking_callback_does_not_kill_the_receive_loop() {
    let (_server, mut conn, client) = connected_client_with(|builder| {
        builder.callback("components-update", |_msg| panic!("subscriber bug"))
    })
    .await;

    conn.send(&json!({
        "command": "components-update",
        "data": {"enabled": false, "name": "SMOOTHING"},
    }))
    .await;
    wait_until(|| !client.is_on(&["SMOOTHING"])).await;

    // The loop survived; a later update still lands.
    conn.send(&json!({
        "command": "videomode-update",
        "data": {"videomode": "3DSBS"},
    }))
    .await;
    wait_until(|| client.videomode().as_deref() == Some("3DSBS")).await;
    assert!(client.is_connected());
}
