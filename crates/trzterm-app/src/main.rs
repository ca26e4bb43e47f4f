mod channel;
mod cli;
mod progress;
mod terminal;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use trzterm_fs::{LocalPicker, LocalSaver};
use trzterm_mux::MuxOptions;
use trzterm_transfer::TransferProviders;

use crate::channel::ChannelConfig;
use crate::progress::TextProgressFactory;

#[tokio::main]
async fn main() {
    let args = cli::parse();

    let loaded = trzterm_config::load_config(args.config.as_deref());

    // Logs go to stderr so stdout stays a clean terminal stream.
    let directive = args.log_directive(loaded.as_ref().ok());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive)),
        )
        .init();

    tracing::info!("trzterm v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Some(ref path) = args.config {
        tracing::info!("Using config override: {}", path.display());
    }
    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!("Config load failed, using defaults: {e}");
        trzterm_config::TrztermConfig::default()
    });

    let download_dir = args.download_dir(&config);
    tracing::info!(
        download_dir = ?download_dir,
        send = args.send.len(),
        "Transfer endpoints resolved"
    );

    let providers = TransferProviders {
        picker: Arc::new(LocalPicker::new(args.send.clone(), download_dir)),
        opener: Arc::new(LocalSaver::new()),
        progress: Some(Arc::new(TextProgressFactory)),
    };
    let channel_config = ChannelConfig {
        url: args.url(&config),
        reconnect_delay: Duration::from_secs(config.client.reconnect_delay_secs as u64),
        max_reconnect_delay: Duration::from_secs(config.client.max_reconnect_delay_secs as u64),
        mux: MuxOptions::from_config(&config.transfer),
        providers,
        upload: args.upload.then(|| args.send.clone()),
    };

    let raw_mode = terminal::RawModeGuard::enable();
    tracing::debug!(raw = raw_mode.is_enabled(), "Terminal ready");

    let (input_tx, input_rx) = mpsc::unbounded_channel();
    terminal::spawn_stdin_reader(input_tx.clone());
    terminal::spawn_signal_forwarder(input_tx);

    channel::run_channel(channel_config, input_rx).await;

    drop(raw_mode);
    tracing::info!("Shutdown complete");
    // The stdin reader thread may still be parked in read().
    std::process::exit(0);
}
