//! Watch one collection on a live DDP server.
//!
//! Demonstrates:
//! - Connecting with `WsTransport`
//! - Registering a collection and subscribing to it
//! - Calling a method and printing its result
//! - Driving the client with `tick()`
//!
//! Usage:
//!   cargo run --example watch -- --host localhost --port 3000 --collection tasks
//!   cargo run --example watch -- --debug

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use anyhow::{Context, bail};
use ddp_client::{Client, ClientOptions, TickOutcome, WsTransport, into_result};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments.
#[derive(Debug, Clone)]
struct Args {
    host: String,
    port: u16,
    collection: String,
    method: Option<String>,
    debug: bool,
}

impl Args {
    fn parse() -> anyhow::Result<Self> {
        let mut args = Self {
            host: "localhost".to_string(),
            port: 3000,
            collection: "tasks".to_string(),
            method: None,
            debug: false,
        };

        let mut iter = std::env::args().skip(1);
        while let Some(flag) = iter.next() {
            match flag.as_str() {
                "--debug" => args.debug = true,
                "--host" => args.host = iter.next().context("--host needs a value")?,
                "--port" => {
                    args.port = iter
                        .next()
                        .context("--port needs a value")?
                        .parse()
                        .context("--port must be a number")?;
                }
                "--collection" => {
                    args.collection = iter.next().context("--collection needs a value")?;
                }
                "--method" => args.method = Some(iter.next().context("--method needs a value")?),
                other => bail!("unknown flag: {other}"),
            }
        }
        Ok(args)
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let filter = if debug { "ddp_client=trace" } else { "ddp_client=info" };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse()?;
    init_logging(args.debug);

    println!("=== DDP watch: {} on {}:{} ===\n", args.collection, args.host, args.port);

    let options = ClientOptions::new(&args.host)
        .with_port(args.port)
        .with_pacing(Duration::from_millis(50));
    let mut client = Client::new(WsTransport::new(), options)?;

    // ========================================================================
    // Connect
    // ========================================================================

    if !client.connect().await {
        bail!(
            "connect failed: {}",
            client.connection().last_error().unwrap_or("unknown")
        );
    }
    println!("[1] Connected, session {:?}", client.session().token);

    // ========================================================================
    // Subscribe
    // ========================================================================

    client.register_collection(args.collection.as_str());
    let id = client.subscribe(&args.collection).await?;
    println!("[2] Subscribed as {id}");

    if let Some(method) = &args.method {
        let name = method.clone();
        client
            .call(method, Vec::new(), move |outcome| match into_result(outcome) {
                Ok(value) => println!("    {name} -> {value}"),
                Err(e) => println!("    {name} failed: {e}"),
            })
            .await?;
        println!("[3] Called {method}");
    }

    // ========================================================================
    // Tick
    // ========================================================================

    println!("\nPress Ctrl+C to exit...");
    let mut last_count = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            outcome = client.tick() => {
                if outcome == TickOutcome::Disconnected {
                    bail!("server closed the connection");
                }
            }
        }

        let count = client
            .store()
            .collection(&args.collection)
            .map_or(0, |docs| docs.len());
        if count != last_count {
            println!(
                "    {} documents ({} bytes cached)",
                count,
                client.store().used_bytes()
            );
            last_count = count;
        }
    }

    Ok(())
}
