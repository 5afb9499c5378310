//! Chat client
//!
//! Run with: cargo run --example chat_client [SERVER_ADDR]
//!
//! Type a line to chat. `/U/` sends `ascii.txt` point-to-point through the
//! server's relay, `/M/` sends it to the multicast group.

use std::io::Write;

use chatmux::{ChatSession, ClientConfig, ClientEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::lookup_host;

fn prompt(identity: &str) {
    print!("{}: ", identity);
    let _ = std::io::stdout().flush();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "localhost:8080".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chatmux=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let server_addr = lookup_host(&server)
        .await?
        .next()
        .ok_or_else(|| format!("could not resolve {}", server))?;

    print!("Enter your username: ");
    std::io::stdout().flush()?;
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut username = String::new();
    stdin.read_line(&mut username).await?;
    let username = username.trim().to_string();
    println!("Your username is: {}", username);

    let config = ClientConfig::new(server_addr).relay(server_addr);
    let (session, mut events) = match ChatSession::connect(config, username).await {
        Ok(connected) => connected,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    };

    let identity = session.identity().to_string();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Chat { sender, body } => {
                    println!("\r{}: {}", sender, body);
                }
                ClientEvent::Payload { sender, data, .. } => {
                    println!("\r{}:", sender);
                    println!("{}", String::from_utf8_lossy(&data));
                }
                ClientEvent::Disconnected { reason } => {
                    println!("\rDisconnected: {}", reason);
                    break;
                }
            }
            prompt(&identity);
        }
    });

    prompt(session.identity());
    session.drive_input(stdin).await?;

    Ok(())
}
