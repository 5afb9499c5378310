//! Chat server
//!
//! Run with: cargo run --example chat_server [BIND_ADDR]
//!
//! Examples:
//!   cargo run --example chat_server                  # binds to 127.0.0.1:8080
//!   cargo run --example chat_server 0.0.0.0:9000     # binds to 0.0.0.0:9000
//!
//! The datagram relay always listens on UDP 127.0.0.1:8080.

use std::net::SocketAddr;

use chatmux::{ChatServer, ServerConfig};

/// Parse bind address, accepting "localhost" and a bare IP
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 8080;

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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let mut config = ServerConfig::default();
    if let Some(arg) = args.get(1) {
        match parse_bind_addr(arg) {
            Ok(addr) => config = config.bind(addr),
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Usage: chat_server [BIND_ADDR]");
                std::process::exit(1);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chatmux=info".parse()?),
        )
        .init();

    let server = ChatServer::bind(config).await?;
    println!("Server started on {}", server.local_addr()?);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            println!("\nShutting down...");
        })
        .await?;

    Ok(())
}
