//! Connects to a server, prints a state summary, flashes a color and
//! clears it again.
//!
//! ```text
//! simple-client --host hyperion.local [--port 19444] [--token TOKEN] [--instance N]
//! ```

use std::time::Duration;

use hyperion_client::{ClientBuilder, Message};
use serde_json::json;

struct Args {
    host: String,
    port: u16,
    token: Option<String>,
    instance: u32,
}

fn parse_args() -> Result<Args, pico_args::Error> {
    let mut args = pico_args::Arguments::from_env();
    Ok(Args {
        host: args.value_from_str("--host")?,
        port: args.opt_value_from_str("--port")?.unwrap_or(19444),
        token: args.opt_value_from_str("--token")?,
        instance: args.opt_value_from_str("--instance")?.unwrap_or(0),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("{err}");
            eprintln!("usage: simple-client --host HOST [--port PORT] [--token TOKEN] [--instance N]");
            std::process::exit(1);
        }
    };

    let mut builder = ClientBuilder::new(args.host)
        .port(args.port)
        .instance(args.instance)
        .default_callback(|msg: &Message| {
            log::info!("update: {}", msg.command);
        });
    if let Some(token) = args.token {
        builder = builder.token(token);
    }
    let client = builder.build();

    if !client.connect().await {
        eprintln!("could not connect to {}", client.id());
        std::process::exit(1);
    }

    println!("connected to {}", client.id());
    println!("video mode: {:?}", client.videomode());
    println!("components:");
    for component in client.components() {
        println!(
            "  {} enabled={}",
            component["name"], component["enabled"]
        );
    }
    if let Some(priority) = client.visible_priority() {
        println!("visible priority: {priority}");
    }

    println!("flashing red on priority 50 for two seconds");
    client
        .set_color(json!({"color": [255, 0, 0], "priority": 50, "duration": 5000}))
        .await
        .ok();
    tokio::time::sleep(Duration::from_secs(2)).await;
    client.clear(json!({"priority": 50})).await.ok();

    client.disconnect().await;
}
