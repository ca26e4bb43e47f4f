//! Configuration schema types for trzterm.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod logging;
mod network;
mod transfer;

pub use logging::*;
pub use network::*;
pub use transfer::*;

use serde::{Deserialize, Serialize};

/// Root configuration shared by the client and the server binaries.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TrztermConfig {
    pub transfer: TransferConfig,
    pub client: ClientConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: TrztermConfig = toml::from_str("").unwrap();
        assert_eq!(config.transfer.chunk_size, 65_536);
        assert_eq!(config.server.port, 28888);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn sections_parse_independently() {
        let toml_str = r#"
[transfer]
quiet = true

[client]
url = "wss://example.com/ws"
"#;
        let config: TrztermConfig = toml::from_str(toml_str).unwrap();
        assert!(config.transfer.quiet);
        assert_eq!(config.client.url, "wss://example.com/ws");
        assert_eq!(config.client.max_reconnect_delay_secs, 30);
        assert!(config.server.binary_output);
    }
}
