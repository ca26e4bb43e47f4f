//! trztermd: serves a PTY-backed command over WebSocket.
//!
//! Every connection gets its own instance of the command. Client frames are
//! keystrokes and resizes; PTY output streams back until the command exits
//! or the client goes away. Only `/ws` upgrades are accepted; no web
//! frontend is served.

mod connection;
mod pty;

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::connection::{accept, handle_connection, ConnectionSettings};

#[derive(Parser, Debug)]
#[command(name = "trztermd", version, about = "Terminal server for trzterm clients")]
struct Args {
    /// Address to bind.
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Config file path override.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Send output as base64 text frames instead of binary frames.
    #[arg(long)]
    text_output: bool,

    /// Command to run for each client; the login shell when omitted.
    command: Option<String>,
}

struct ServerSettings {
    addr: String,
    connection: ConnectionSettings,
}

fn resolve(args: &Args, config: &trzterm_config::TrztermConfig) -> ServerSettings {
    let host = args.host.clone().unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    ServerSettings {
        addr: format!("{host}:{port}"),
        connection: ConnectionSettings {
            command: args
                .command
                .clone()
                .unwrap_or_else(|| config.server.command.clone()),
            binary_output: config.server.binary_output && !args.text_output,
        },
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let loaded = trzterm_config::load_config(args.config.as_deref());

    let directive = args.log_level.clone().unwrap_or_else(|| match &loaded {
        Ok(config) => format!("trztermd={0},trzterm={0}", config.logging.level.as_directive()),
        Err(_) => "trztermd=info,trzterm=info".into(),
    });
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive)),
        )
        .init();

    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {e}");
        trzterm_config::TrztermConfig::default()
    });
    let settings = resolve(&args, &config);

    let listener = match TcpListener::bind(&settings.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %settings.addr, error = %e, "Failed to bind TCP listener");
            std::process::exit(1);
        }
    };
    tracing::info!(
        command = %settings.connection.command,
        binary = settings.connection.binary_output,
        "trztermd listening on {}",
        settings.addr
    );

    // Accept loop.
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let connection = settings.connection.clone();
                tokio::spawn(async move {
                    match accept(stream).await {
                        Ok(ws) => handle_connection(ws, addr, connection).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}
