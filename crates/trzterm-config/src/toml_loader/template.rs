//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> String {
    r##"# trzterm Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[transfer]
# download_dir = "~/Downloads"    # unset: current directory
# chunk_size = 65536              # 1024-10485760 bytes
# timeout_secs = 20               # 1-3600, until the remote config arrives
# upload_command = "trz"
# interrupt_delay_ms = 200        # 0-5000
# upload_start_timeout_ms = 1000  # 100-60000
# quiet = false

[client]
# url = "ws://127.0.0.1:28888/ws"
# reconnect_delay_secs = 1        # 1-60
# max_reconnect_delay_secs = 30   # 1-600

[server]
# host = "127.0.0.1"
# port = 28888
# command = ""                    # empty: login shell
# binary_output = true

[logging]
# level = "info"                  # trace, debug, info, warn, error
"##
    .to_string()
}
