//! Chatter server example
//!
//! Run with: cargo run --example chatter_server [PORT | SOCKET_PATH]
//!
//! Examples:
//!   cargo run --example chatter_server                     # TCP 0.0.0.0:7777
//!   cargo run --example chatter_server 7000                # TCP 0.0.0.0:7000
//!   cargo run --example chatter_server /tmp/chatter.sock   # Unix-domain socket
//!
//! Then read the chatter:
//!   nc localhost 7777
//!   nc -U /tmp/chatter.sock
//!
//! Every log event from this binary is also sent to connected readers, and a
//! `debug` channel on port+1 carries a heartbeat.

use std::sync::Arc;
use std::time::Duration;

use chatter_rs::registry::SilentSink;
use chatter_rs::{ChatterServer, ListenerConfig, ServerConfig};
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_PORT: u16 = 7777;

fn print_usage() {
    eprintln!("Usage: chatter_server [PORT | SOCKET_PATH]");
    eprintln!();
    eprintln!("  PORT         TCP port to listen on (default {})", DEFAULT_PORT);
    eprintln!("  SOCKET_PATH  Unix-domain socket path (anything that is not a port)");
}

fn parse_listener(arg: Option<&String>) -> ListenerConfig {
    match arg {
        None => ListenerConfig::tcp(DEFAULT_PORT),
        Some(arg) => match arg.parse::<u16>() {
            Ok(port) => ListenerConfig::tcp(port),
            Err(_) => ListenerConfig::unix(arg),
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let listener = parse_listener(args.get(1));
    let mut config = ServerConfig::with_listener(listener.clone());
    if let chatter_rs::Transport::Tcp(addr) = &listener.transport {
        let debug = ListenerConfig::tcp(addr.port().wrapping_add(1))
            .channel("debug")
            .greeting(false);
        config = config.listener(debug);
    }

    let server = ChatterServer::bind(config)
        .await?
        // The fmt layer already prints everything to stderr.
        .with_default_sink(Arc::new(SilentSink));
    let handle = server.handle();

    // Only this binary's events become chatter; the server's own events
    // would otherwise feed back into it.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer().with_filter(
                EnvFilter::from_default_env()
                    .add_directive("chatter_rs=debug".parse()?)
                    .add_directive("chatter_server=debug".parse()?),
            ),
        )
        .with(
            handle
                .layer()
                .with_filter(Targets::new().with_target("chatter_server", Level::INFO)),
        )
        .init();

    tracing::info!(listener = ?listener.transport, "Chatter server started");

    let ticker = handle.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(2));
        let mut beat: u64 = 0;
        loop {
            interval.tick().await;
            beat += 1;
            if !ticker.chatter_to("debug", format!("heartbeat {}", beat)) {
                break;
            }
            if beat % 5 == 0 {
                tracing::info!(beat, "Still running");
            }
        }
    });

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    println!("Chatter server stopped");
    Ok(())
}
