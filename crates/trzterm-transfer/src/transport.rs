//! Line transport for one transfer session.
//!
//! Outbound lines go through a [`RemoteWriter`]; inbound terminal chunks
//! arrive on an unbounded channel and are split into protocol lines here.
//! Every receive observes the cancellation token and the current timeout.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use trzterm_common::{Payload, TransferError};

use crate::ansi::strip_ansi;
use crate::codec;
use crate::protocol::{format_line, tag, DEFAULT_NEWLINE, WINDOWS_NEWLINE};

/// Where a session's outbound protocol lines go.
pub trait RemoteWriter: Send + Sync {
    fn write_remote(&self, line: String) -> Result<(), TransferError>;
}

impl RemoteWriter for mpsc::UnboundedSender<String> {
    fn write_remote(&self, line: String) -> Result<(), TransferError> {
        self.send(line).map_err(|_| TransferError::ChannelClosed)
    }
}

/// Run `fut` unless the token fires first; bound it by `limit` when given.
pub(crate) async fn guarded<T, F>(
    cancel: &CancellationToken,
    limit: Option<Duration>,
    fut: F,
) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, TransferError>>,
{
    let bounded = async {
        match limit {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(TransferError::Protocol(format!(
                    "receive timed out after {}s",
                    limit.as_secs()
                ))),
            },
            None => fut.await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        result = bounded => result,
    }
}

pub struct Transport {
    writer: Box<dyn RemoteWriter>,
    inbound: mpsc::UnboundedReceiver<Payload>,
    buffer: Vec<u8>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    newline: String,
    remote_is_windows: bool,
}

impl Transport {
    pub fn new(
        writer: Box<dyn RemoteWriter>,
        inbound: mpsc::UnboundedReceiver<Payload>,
        cancel: CancellationToken,
        timeout: Duration,
        remote_is_windows: bool,
    ) -> Self {
        let newline = if remote_is_windows {
            WINDOWS_NEWLINE
        } else {
            DEFAULT_NEWLINE
        };
        Self {
            writer,
            inbound,
            buffer: Vec::new(),
            cancel,
            timeout: (!timeout.is_zero()).then_some(timeout),
            newline: newline.to_string(),
            remote_is_windows,
        }
    }

    /// Seconds per receive as announced by the remote; 0 disables the limit.
    pub fn set_timeout_secs(&mut self, secs: u64) {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    /// Windows remotes keep their newline no matter what the config says.
    pub fn set_newline(&mut self, newline: &str) {
        if !self.remote_is_windows && !newline.is_empty() {
            self.newline = newline.to_string();
        }
    }

    pub fn newline(&self) -> &str {
        &self.newline
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn check_cancelled(&self) -> Result<(), TransferError> {
        if self.cancel.is_cancelled() {
            Err(TransferError::Cancelled)
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Sending
    // =========================================================================

    pub fn send_line(&self, typ: &str, body: &str) -> Result<(), TransferError> {
        self.writer.write_remote(format_line(typ, body, &self.newline))
    }

    pub fn send_integer(&self, typ: &str, value: u64) -> Result<(), TransferError> {
        self.send_line(typ, &value.to_string())
    }

    pub fn send_string(&self, typ: &str, text: &str) -> Result<(), TransferError> {
        self.send_line(typ, &codec::encode_str(text)?)
    }

    pub fn send_binary(&self, typ: &str, data: &[u8]) -> Result<(), TransferError> {
        self.send_line(typ, &codec::encode(data)?)
    }

    pub fn send_data(&self, data: &[u8]) -> Result<(), TransferError> {
        self.send_binary(tag::DATA, data)
    }

    /// Final summary for the remote tool to print.
    pub fn client_exit(&self, message: &str) -> Result<(), TransferError> {
        self.send_string(tag::EXIT, message)
    }

    /// Tell the remote tool why the local side gave up.
    pub fn client_error(&self, err: &TransferError) -> Result<(), TransferError> {
        let typ = if err.is_user_facing() {
            tag::FAIL_USER
        } else {
            tag::FAIL
        };
        self.send_string(typ, &err.to_string())
    }

    // =========================================================================
    // Receiving
    // =========================================================================

    async fn read_line(&mut self) -> Result<String, TransferError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let mut raw: Vec<u8> = self.buffer.drain(..=pos).collect();
                raw.pop();
                let line = self.clean_line(&raw);
                if line.is_empty() {
                    continue;
                }
                return Ok(line);
            }
            let chunk = self
                .inbound
                .recv()
                .await
                .ok_or(TransferError::ChannelClosed)?;
            self.buffer.extend_from_slice(chunk.as_bytes());
        }
    }

    fn clean_line(&self, raw: &[u8]) -> String {
        let text = String::from_utf8_lossy(raw);
        if self.remote_is_windows {
            strip_ansi(&text).replace('\r', "")
        } else {
            text.trim_end_matches('\r').to_string()
        }
    }

    /// Next line of type `expect`, returning its body.
    ///
    /// With `may_have_junk` (and always for Windows remotes) lines that carry
    /// no message are skipped and text before the last `#` is ignored.
    async fn recv_line(
        &mut self,
        expect: &str,
        may_have_junk: bool,
    ) -> Result<String, TransferError> {
        let tolerant = may_have_junk || self.remote_is_windows;
        let cancel = self.cancel.clone();
        let limit = self.timeout;
        loop {
            let line = guarded(&cancel, limit, self.read_line()).await?;
            let message = match line.rfind('#') {
                Some(idx) if tolerant || idx == 0 => &line[idx + 1..],
                _ if tolerant => {
                    tracing::debug!(line = %line, "Skipping junk before protocol message");
                    continue;
                }
                _ => {
                    return Err(TransferError::Protocol(format!(
                        "expected {expect}, got {line:?}"
                    )))
                }
            };
            let Some((typ, body)) = message.split_once(':') else {
                if tolerant {
                    continue;
                }
                return Err(TransferError::Protocol(format!(
                    "expected {expect}, got {line:?}"
                )));
            };
            if typ == expect {
                return Ok(body.to_string());
            }
            if typ == tag::FAIL || typ == tag::FAIL_USER || typ == tag::EXIT {
                let reason = codec::decode_string(body).unwrap_or_else(|_| body.to_string());
                return Err(TransferError::RemoteFailure(reason));
            }
            return Err(TransferError::Protocol(format!(
                "expected {expect}, got {typ}"
            )));
        }
    }

    pub async fn recv_integer(&mut self, typ: &str) -> Result<u64, TransferError> {
        let body = self.recv_line(typ, false).await?;
        body.trim()
            .parse()
            .map_err(|_| TransferError::Protocol(format!("invalid {typ} value: {body:?}")))
    }

    pub async fn recv_string(&mut self, typ: &str) -> Result<String, TransferError> {
        let body = self.recv_line(typ, false).await?;
        codec::decode_string(&body)
    }

    pub async fn recv_binary(&mut self, typ: &str) -> Result<Vec<u8>, TransferError> {
        let body = self.recv_line(typ, false).await?;
        codec::decode(&body)
    }

    pub async fn recv_data(&mut self) -> Result<Vec<u8>, TransferError> {
        self.recv_binary(tag::DATA).await
    }

    /// The remote config arrives right after our action; the remote shell may
    /// still be echoing around it.
    pub async fn recv_config(&mut self) -> Result<String, TransferError> {
        let body = self.recv_line(tag::CONFIG, true).await?;
        codec::decode_string(&body)
    }

    /// Wait for the remote to acknowledge `expected`.
    pub async fn check_integer(&mut self, expected: u64) -> Result<(), TransferError> {
        let got = self.recv_integer(tag::SUCC).await?;
        if got != expected {
            return Err(TransferError::Protocol(format!(
                "integer check [{got}] <> [{expected}]"
            )));
        }
        Ok(())
    }

    pub async fn check_binary(&mut self, expected: &[u8]) -> Result<(), TransferError> {
        let got = self.recv_binary(tag::SUCC).await?;
        if got != expected {
            return Err(TransferError::Protocol("binary check failed".into()));
        }
        Ok(())
    }
}
