//! Simple deduplicating proxy
//!
//! Run with: cargo run --example simple_proxy [BIND_ADDR] [UPSTREAM_SCHEME]
//!
//! Examples:
//!   cargo run --example simple_proxy                       # 0.0.0.0:8787, https upstreams
//!   cargo run --example simple_proxy localhost             # 127.0.0.1:8787
//!   cargo run --example simple_proxy 127.0.0.1:9000 http   # plain http upstreams (local servers)
//!
//! ## Sending requests
//!
//! The path names the upstream: `/{host}[/{prefix}]/chat/completions` is
//! forwarded to `{scheme}://{host}[/{prefix}]/chat/completions`.
//!
//!   curl -N http://localhost:8787/api.openai.com/v1/chat/completions \
//!     -H "Authorization: Bearer $OPENAI_API_KEY" \
//!     -H "Content-Type: application/json" \
//!     -d '{"model":"gpt-4o-mini","stream":true,"messages":[{"role":"user","content":"hi"}]}'
//!
//! ## Features
//!
//! - Single-flight: identical concurrent requests share one upstream call
//! - Late joiners: requests arriving mid-stream get catch-up bytes, then live output
//! - Result cache: finished results are answered from memory for an hour
//! - Grace period: a finished stream stays attachable for 60s after archival
//!
//! Every 30s the proxy prints its counters.

use std::net::SocketAddr;
use std::time::Duration;

use streamdedup::{CoordinatorConfig, ProxyServer, ServerConfig};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:8787
/// - "localhost:9000" -> 127.0.0.1:9000
/// - "127.0.0.1" -> 127.0.0.1:8787
/// - "0.0.0.0:9000" -> 0.0.0.0:9000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8787;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: simple_proxy [BIND_ADDR] [UPSTREAM_SCHEME]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR           Address to bind to (default: 0.0.0.0:8787)");
    eprintln!("  UPSTREAM_SCHEME     http or https for upstream calls (default: https)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let mut config = ServerConfig::default();

    if let Some(addr_str) = args.get(1) {
        match parse_bind_addr(addr_str) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        }
    }

    if let Some(scheme) = args.get(2) {
        config = config.upstream_scheme(scheme.as_str());
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("streamdedup=debug".parse()?)
                .add_directive("simple_proxy=debug".parse()?),
        )
        .init();

    let coordinator_config = CoordinatorConfig::default()
        .result_ttl(Duration::from_secs(3600))
        .retirement_grace(Duration::from_secs(60));

    println!(
        "Starting proxy on {} -> {}://{{destination}}/chat/completions",
        config.bind_addr, config.upstream_scheme
    );

    let server = ProxyServer::with_coordinator_config(config, coordinator_config)?;

    let stats = server.registry().stats().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let s = stats.snapshot();
            println!(
                "Stats: requests={} hits={} upstream_calls={} coalesced={} failed={} hit_ratio={:.2}",
                s.requests,
                s.cache_hits,
                s.upstream_calls,
                s.coalesced_attaches,
                s.failed_streams,
                s.hit_ratio(),
            );
        }
    });

    // Run with Ctrl+C handling
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        println!("\nShutting down...");
    };

    if let Err(e) = server.run_until(shutdown).await {
        eprintln!("Server error: {}", e);
    }

    Ok(())
}
