//! WebSocket channel to the terminal server, with auto-reconnect.
//!
//! Each connection gets its own [`Multiplexer`]; the channel layer owns the
//! socket and the reconnect policy, the multiplexer owns everything else.

use std::path::PathBuf;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use trzterm_mux::{Frame, Multiplexer, MuxHandle, MuxOptions};
use trzterm_transfer::{FileReader, TransferProviders};

use crate::terminal::{self, LocalInput, StdoutDisplay};

pub struct ChannelConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub mux: MuxOptions,
    pub providers: TransferProviders,
    /// Paths to push with a pre-armed upload on the first connection.
    pub upload: Option<Vec<PathBuf>>,
}

enum SessionResult {
    Shutdown,
    Disconnected(String),
}

/// Run the client until the server ends the session or stdin closes.
pub async fn run_channel(
    mut config: ChannelConfig,
    mut input: mpsc::UnboundedReceiver<LocalInput>,
) {
    let mut backoff = config.reconnect_delay;

    loop {
        tracing::info!(url = %config.url, "Connecting...");

        match connect_async(config.url.as_str()).await {
            Ok((ws, _)) => {
                backoff = config.reconnect_delay;
                tracing::info!("Connected");
                match connection(ws, &mut config, &mut input).await {
                    SessionResult::Shutdown => {
                        tracing::info!("Client shutting down");
                        return;
                    }
                    SessionResult::Disconnected(reason) => {
                        tracing::warn!(reason = %reason, "Connection lost");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to connect");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = wait_for_eof(&mut input) => return,
        }

        backoff = next_backoff(backoff, config.max_reconnect_delay);
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

/// Swallow input while disconnected; resolves when stdin is gone.
async fn wait_for_eof(input: &mut mpsc::UnboundedReceiver<LocalInput>) {
    while let Some(local) = input.recv().await {
        if local == LocalInput::Eof {
            return;
        }
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
    }
}

/// One live connection: socket ⇄ multiplexer ⇄ local terminal.
async fn connection(
    ws: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    config: &mut ChannelConfig,
    input: &mut mpsc::UnboundedReceiver<LocalInput>,
) -> SessionResult {
    let (mut sink, mut stream) = ws.split();
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<Frame>();
    let (mux, handle) = Multiplexer::new(
        frame_tx,
        StdoutDisplay,
        config.providers.clone(),
        config.mux.clone(),
    );
    tokio::spawn(mux.run());

    if let Some((rows, cols)) = terminal::size() {
        let _ = handle.resize(rows, cols);
    }
    if let Some(paths) = config.upload.take() {
        spawn_upload(handle.clone(), paths);
    }

    let result = loop {
        tokio::select! {
            // Multiplexer → server
            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    break SessionResult::Shutdown;
                };
                if let Err(e) = sink.send(to_message(frame)).await {
                    break SessionResult::Disconnected(format!("send failed: {e}"));
                }
            }

            // Server → multiplexer
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let _ = handle.inbound(Frame::Text(text.as_str().to_owned()));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let _ = handle.inbound(Frame::Binary(data.to_vec()));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("Server closed the session");
                        break SessionResult::Shutdown;
                    }
                    None => {
                        break SessionResult::Disconnected("server went away".into());
                    }
                    Some(Err(e)) => {
                        break SessionResult::Disconnected(format!("ws error: {e}"));
                    }
                    _ => {}
                }
            }

            // Local terminal → multiplexer
            local = input.recv() => {
                match local {
                    Some(LocalInput::Eof) | None => {
                        let _ = sink.close().await;
                        break SessionResult::Shutdown;
                    }
                    Some(local) => forward_local(&handle, local),
                }
            }
        }
    };

    handle.shutdown();
    result
}

fn forward_local(handle: &MuxHandle, input: LocalInput) {
    let sent = match input {
        LocalInput::Keys(keys) => match terminal::split_keys(keys) {
            Ok(text) => handle.keystroke(text),
            Err(bytes) => handle.binary_input(bytes),
        },
        LocalInput::Interrupt => handle.keystroke("\x03"),
        LocalInput::Resized { rows, cols } => handle.resize(rows, cols),
        LocalInput::Eof => return,
    };
    if let Err(e) = sent {
        tracing::debug!(error = %e, "Multiplexer gone, input dropped");
    }
}

fn spawn_upload(handle: MuxHandle, paths: Vec<PathBuf>) {
    tokio::spawn(async move {
        let collected =
            tokio::task::spawn_blocking(move || trzterm_fs::collect_send_files(&paths, true)).await;
        let files: Vec<Box<dyn FileReader>> = match collected {
            Ok(Ok(readers)) => readers
                .into_iter()
                .map(|r| Box::new(r) as Box<dyn FileReader>)
                .collect(),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Cannot upload");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "File scan panicked");
                return;
            }
        };
        match handle.upload_files(files).await {
            Ok(summary) => tracing::info!(files = summary.names.len(), "{}", summary.message),
            Err(e) => tracing::warn!(error = %e, "Upload did not complete"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let max = Duration::from_secs(30);
        let mut delay = Duration::from_secs(1);
        let mut seen = Vec::new();
        for _ in 0..7 {
            delay = next_backoff(delay, max);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![2, 4, 8, 16, 30, 30, 30]);
    }

    #[test]
    fn frames_map_to_ws_messages() {
        assert_eq!(
            to_message(Frame::Text("1;ls".into())),
            Message::Text("1;ls".into())
        );
        assert_eq!(
            to_message(Frame::Binary(vec![0, 0, 1])),
            Message::Binary(vec![0u8, 0, 1].into())
        );
    }

    #[tokio::test]
    async fn local_input_reaches_the_multiplexer() {
        let (frame_tx, mut frames) = mpsc::unbounded_channel::<Frame>();
        let providers = TransferProviders {
            picker: std::sync::Arc::new(trzterm_fs::LocalPicker::default()),
            opener: std::sync::Arc::new(trzterm_fs::LocalSaver::new()),
            progress: None,
        };
        let (mux, handle) =
            Multiplexer::new(frame_tx, StdoutDisplay, providers, MuxOptions::default());
        tokio::spawn(mux.run());

        forward_local(&handle, LocalInput::Keys(b"ls\r".to_vec()));
        forward_local(&handle, LocalInput::Keys(vec![0xff]));
        forward_local(&handle, LocalInput::Resized { rows: 24, cols: 80 });
        forward_local(&handle, LocalInput::Interrupt);

        assert_eq!(frames.recv().await, Some(Frame::Text("1;ls\r".into())));
        assert_eq!(frames.recv().await, Some(Frame::Binary(vec![0, 0, 0xff])));
        assert_eq!(frames.recv().await, Some(Frame::Text("2;24;80".into())));
        assert_eq!(frames.recv().await, Some(Frame::Text("1;\x03".into())));
    }
}
