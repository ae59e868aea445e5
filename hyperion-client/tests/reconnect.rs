//! Session loss, automatic reconnection and orderly shutdown.

mod common;

use std::time::Duration;

use common::*;
use serde_json::json;

#[tokio::test]
async fn clean_eof_reconnects_immediately() {
    let (server, conn, client) = connected_client().await;

    conn.close().await;

    // The first reconnect attempt is immediate and replays the session
    // sequence, continuing the tan sequence.
    let mut conn = server.accept().await;
    conn.expect(serverinfo_request(2)).await;
    conn.send(&serverinfo_response(2)).await;
    wait_until(|| client.is_connected() && client.has_loaded_state()).await;
}

#[tokio::test]
async fn unparseable_line_reconnects() {
    let (server, mut conn, client) = connected_client().await;

    conn.send_raw("THIS IS NOT A VALID MESSAGE AND MUST DROP THE SESSION")
        .await;

    let mut conn = server.accept().await;
    conn.expect(serverinfo_request(2)).await;
    conn.send(&serverinfo_response(2)).await;
    wait_until(|| client.is_connected() && client.has_loaded_state()).await;
}

#[tokio::test]
async fn failed_reconnects_retry_on_the_configured_delay() {
    let (server, conn, client) = connected_client().await;
    let port = server.port;

    // Take the server away entirely, then kill the session: the
    // immediate reconnect attempt is refused.
    drop(server);
    conn.close().await;

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!client.is_connected());

    // Bring the server back; the next scheduled attempt lands.
    let server = MockServer::bind(port).await;
    let mut conn = server.accept().await;
    conn.expect(serverinfo_request(2)).await;
    conn.send(&serverinfo_response(2)).await;
    wait_until(|| client.is_connected() && client.has_loaded_state()).await;
}

#[tokio::test]
async fn failed_reload_after_instance_switch_reconnects_to_the_target() {
    let (server, mut conn, client) = connected_client().await;

    conn.send(&json!({
        "command": "instance-switchTo",
        "info": {"instance": 1},
        "success": true,
        "tan": 0,
    }))
    .await;
    conn.expect(serverinfo_request(2)).await;
    // The reload answer is garbage, which is session-fatal.
    conn.send_raw("THIS IS NOT A VALID SERVERINFO AND SHOULD CAUSE A DISCONNECT")
        .await;

    // The reconnect replays the persisted target instance.
    let mut conn = server.accept().await;
    conn.expect(json!({
        "command": "instance",
        "instance": 1,
        "subcommand": "switchTo",
        "tan": 3,
    }))
    .await;
    conn.send(&json!({
        "command": "instance-switchTo",
        "info": {"instance": 1},
        "success": true,
        "tan": 3,
    }))
    .await;
    conn.expect(serverinfo_request(4)).await;
    conn.send(&serverinfo_response(4)).await;

    wait_until(|| client.is_connected() && client.has_loaded_state()).await;
    assert_eq!(client.instance(), Some(1));
    assert_eq!(client.target_instance(), 1);
}

#[tokio::test]
async fn logout_success_disconnects_without_reconnecting() {
    let (server, mut conn, client) = connected_client().await;

    assert!(client.send_logout().await);
    conn.expect(json!({"command": "authorize", "subcommand": "logout", "tan": 2}))
        .await;
    conn.send(&json!({"command": "authorize-logout", "success": true}))
        .await;

    wait_until(|| !client.is_connected()).await;
    // Twice the retry delay passes with no reconnection attempt.
    server
        .expect_no_connection(Duration::from_millis(700))
        .await;
    // Disconnect afterwards is a clean no-op.
    assert!(client.disconnect().await);
}

#[tokio::test]
async fn session_loss_resolves_parked_calls_to_none() {
    let (server, mut conn, client) =
        connected_client_with(|builder| builder.timeout(Duration::from_secs(5))).await;

    let started = tokio::time::Instant::now();
    let flow = async {
        conn.expect(json!({"command": "clear", "priority": 50, "tan": 2}))
            .await;
        conn.close().await;
    };
    let (_, reply) = tokio::join!(flow, client.clear(json!({"priority": 50})));

    // Termination, not the 5 second deadline, resolved the call.
    assert!(reply.unwrap().is_none());
    assert!(started.elapsed() < Duration::from_secs(3));

    // The client is already bringing the session back on its own.
    let mut conn = server.accept().await;
    conn.expect(serverinfo_request(3)).await;
    conn.send(&serverinfo_response(3)).await;
    wait_until(|| client.is_connected() && client.has_loaded_state()).await;
    client.disconnect().await;
}

#[tokio::test]
async fn disconnect_swallows_transport_errors() {
    let (server, conn, client) = connected_client().await;

    // The server is gone entirely; closing must still succeed.
    drop(server);
    conn.close().await;
    assert!(client.disconnect().await);
    assert!(!client.is_connected());
}
