//! Per-section validation: transfer, client, and server.

use crate::schema::TrztermConfig;

use super::helpers::{validate_non_empty, validate_range};

/// Validate transfer constraints.
pub(crate) fn validate_transfer(errors: &mut Vec<String>, config: &TrztermConfig) {
    let transfer = &config.transfer;
    validate_range(
        errors,
        "transfer.chunk_size",
        transfer.chunk_size,
        1024,
        10 * 1024 * 1024,
    );
    validate_range(errors, "transfer.timeout_secs", transfer.timeout_secs, 1, 3600);
    validate_range(
        errors,
        "transfer.interrupt_delay_ms",
        transfer.interrupt_delay_ms,
        0,
        5000,
    );
    validate_range(
        errors,
        "transfer.upload_start_timeout_ms",
        transfer.upload_start_timeout_ms,
        100,
        60_000,
    );
    validate_non_empty(errors, "transfer.upload_command", &transfer.upload_command);
}

/// Validate client constraints.
pub(crate) fn validate_client(errors: &mut Vec<String>, config: &TrztermConfig) {
    let client = &config.client;
    validate_non_empty(errors, "client.url", &client.url);
    if !client.url.starts_with("ws://") && !client.url.starts_with("wss://") {
        errors.push(format!("client.url = {} must use ws:// or wss://", client.url));
    }
    validate_range(
        errors,
        "client.reconnect_delay_secs",
        client.reconnect_delay_secs,
        1,
        60,
    );
    validate_range(
        errors,
        "client.max_reconnect_delay_secs",
        client.max_reconnect_delay_secs,
        1,
        600,
    );
    if client.max_reconnect_delay_secs < client.reconnect_delay_secs {
        errors.push(
            "client.max_reconnect_delay_secs must be >= client.reconnect_delay_secs".into(),
        );
    }
}

/// Validate server constraints.
pub(crate) fn validate_server(errors: &mut Vec<String>, config: &TrztermConfig) {
    validate_non_empty(errors, "server.host", &config.server.host);
    if config.server.port == 0 {
        errors.push("server.port must not be 0".into());
    }
}
