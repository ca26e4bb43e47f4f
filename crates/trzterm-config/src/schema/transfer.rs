//! File transfer configuration types.

use serde::{Deserialize, Serialize};

/// Local side of the embedded file transfer.
///
/// The remote sends its own config during the handshake; these values cover
/// what the remote cannot know (where to save, how big our chunks are) and
/// the timings of the pre-armed upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Directory downloads are saved into. `None` means the current directory.
    pub download_dir: Option<String>,
    /// Upper bound on a single data chunk in bytes (valid range: 1024-10485760).
    pub chunk_size: u32,
    /// Receive timeout in seconds used until the remote config overrides it.
    pub timeout_secs: u32,
    /// Remote command that starts an upload for a pre-armed file list.
    pub upload_command: String,
    /// Delay between the interrupt and the upload command, in milliseconds.
    pub interrupt_delay_ms: u32,
    /// How long a pre-armed upload waits for the handshake, in milliseconds.
    pub upload_start_timeout_ms: u32,
    /// Suppress the local progress bar regardless of the remote setting.
    pub quiet: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            chunk_size: 64 * 1024,
            timeout_secs: 20,
            upload_command: "trz".into(),
            interrupt_delay_ms: 200,
            upload_start_timeout_ms: 1000,
            quiet: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_config_defaults() {
        let config = TransferConfig::default();
        assert!(config.download_dir.is_none());
        assert_eq!(config.chunk_size, 65_536);
        assert_eq!(config.timeout_secs, 20);
        assert_eq!(config.upload_command, "trz");
        assert_eq!(config.interrupt_delay_ms, 200);
        assert_eq!(config.upload_start_timeout_ms, 1000);
        assert!(!config.quiet);
    }

    #[test]
    fn transfer_config_partial_toml() {
        let toml_str = r#"
download_dir = "/tmp/downloads"
chunk_size = 4096
"#;
        let config: TransferConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.download_dir.as_deref(), Some("/tmp/downloads"));
        assert_eq!(config.chunk_size, 4096);
        // Defaults preserved
        assert_eq!(config.upload_command, "trz");
        assert_eq!(config.timeout_secs, 20);
    }
}
