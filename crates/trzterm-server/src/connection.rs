//! Per-connection handler: one PTY command per WebSocket client.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use trzterm_common::TrztermError;
use trzterm_mux::frame::{decode_input_frame, exit_frame, output_frame};
use trzterm_mux::{Frame, InputEvent};

use crate::pty::{PtyProcess, DEFAULT_COLS, DEFAULT_ROWS};

/// How long to wait for trailing output once the command has exited.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(200);

/// The only path that accepts a WebSocket upgrade.
pub const WS_PATH: &str = "/ws";

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub command: String,
    pub binary_output: bool,
}

pub(crate) fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(data) => Message::Binary(data.into()),
    }
}

/// Complete the WebSocket handshake, refusing every path but [`WS_PATH`].
pub async fn accept(stream: TcpStream) -> Result<WebSocketStream<TcpStream>, tungstenite::Error> {
    accept_hdr_async(stream, |req: &Request, resp: Response| {
        if req.uri().path() == WS_PATH {
            return Ok(resp);
        }
        let mut refusal = ErrorResponse::new(Some(format!(
            "no WebSocket endpoint at {}",
            req.uri().path()
        )));
        *refusal.status_mut() = StatusCode::NOT_FOUND;
        Err(refusal)
    })
    .await
}

fn apply_input(process: &PtyProcess, event: InputEvent) -> Result<(), TrztermError> {
    match event {
        InputEvent::Input(data) => process.write(&data),
        InputEvent::Text(text) => process.write(text.as_bytes()),
        InputEvent::Resize { rows, cols } => process.resize(rows, cols),
    }
}

/// Handle a single WebSocket connection until the client leaves or the
/// command exits.
pub async fn handle_connection(
    ws: WebSocketStream<TcpStream>,
    addr: SocketAddr,
    settings: ConnectionSettings,
) {
    let (mut sink, mut stream) = ws.split();

    let mut process = match PtyProcess::spawn(&settings.command, DEFAULT_ROWS, DEFAULT_COLS) {
        Ok(process) => process,
        Err(e) => {
            tracing::error!(peer = %addr, error = %e, "Failed to start command");
            let notice = Frame::Text(format!("1;{e}"));
            let _ = sink.send(to_message(notice)).await;
            let _ = sink.close().await;
            return;
        }
    };
    tracing::info!(peer = %addr, "Client attached");

    loop {
        tokio::select! {
            // Client → PTY
            msg = stream.next() => {
                let frame = match msg {
                    Some(Ok(Message::Text(text))) => Frame::Text(text.as_str().to_owned()),
                    Some(Ok(Message::Binary(data))) => Frame::Binary(data.to_vec()),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(peer = %addr, "Client closed, killing command");
                        process.kill();
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(peer = %addr, error = %e, "WebSocket error, killing command");
                        process.kill();
                        break;
                    }
                    _ => continue,
                };
                match decode_input_frame(frame) {
                    Ok(event) => {
                        if let Err(e) = apply_input(&process, event) {
                            tracing::warn!(peer = %addr, error = %e, "PTY input failed");
                        }
                    }
                    Err(e) => tracing::warn!(peer = %addr, error = %e, "Dropping client frame"),
                }
            }

            // PTY → client
            Some(chunk) = process.output_rx.recv() => {
                let frame = output_frame(&chunk, settings.binary_output);
                if sink.send(to_message(frame)).await.is_err() {
                    tracing::info!(peer = %addr, "Send failed, killing command");
                    process.kill();
                    break;
                }
            }

            // Command exited: flush what is left, report, hang up.
            code = &mut process.exit_rx => {
                let code = code.unwrap_or(1);
                while let Ok(Some(chunk)) =
                    tokio::time::timeout(EXIT_DRAIN_GRACE, process.output_rx.recv()).await
                {
                    let frame = output_frame(&chunk, settings.binary_output);
                    let _ = sink.send(to_message(frame)).await;
                }
                tracing::info!(peer = %addr, code, "Command exited");
                let _ = sink.send(to_message(exit_frame(code))).await;
                let _ = sink.close().await;
                break;
            }
        }
    }

    tracing::info!(peer = %addr, "Client detached");
}
