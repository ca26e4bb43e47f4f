//! Client and server endpoint configuration types.

use serde::{Deserialize, Serialize};

/// Configuration for the `trzterm` client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the terminal server.
    pub url: String,
    /// Initial reconnect delay in seconds (valid range: 1-60).
    pub reconnect_delay_secs: u32,
    /// Cap on the doubling reconnect delay in seconds (valid range: 1-600).
    pub max_reconnect_delay_secs: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:28888/ws".into(),
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
        }
    }
}

/// Configuration for the `trztermd` server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Command run for each connection. Empty means the user's login shell.
    pub command: String,
    /// Send PTY output as binary frames instead of base64 text frames.
    pub binary_output: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 28888,
            command: String::new(),
            binary_output: true,
        }
    }
}
