//! Per-channel actor routing terminal traffic and transfer sessions.
//!
//! Everything that touches the channel goes through one inbox: inbound
//! frames, local input, upload requests, session output, timers and session
//! completion. Handling is strictly sequential.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use trzterm_common::{Payload, TransferError, TrztermError};
use trzterm_config::schema::TransferConfig;
use trzterm_transfer::ansi::strip_ansi;
use trzterm_transfer::files::has_directory;
use trzterm_transfer::{
    detect, FileReader, MagicKey, RemoteWriter, SessionChannel, SessionOptions, SessionReport,
    SessionState, TransferProviders, TransferSession, TransferSummary, UniqueIdCache,
};

use crate::frame::{binary_input_frame, decode_output_frame, keystroke_frame, resize_frame, Frame};

const INTERRUPT: &str = "\x03";

pub type UploadResult = Result<TransferSummary, TransferError>;

/// Outbound half of the channel; owned by the actor.
pub trait ChannelSink: Send {
    fn send(&mut self, frame: Frame) -> Result<(), TrztermError>;
}

impl ChannelSink for mpsc::UnboundedSender<Frame> {
    fn send(&mut self, frame: Frame) -> Result<(), TrztermError> {
        mpsc::UnboundedSender::send(self, frame)
            .map_err(|_| TrztermError::Network("channel sink closed".into()))
    }
}

/// Where terminal output is shown.
pub trait TerminalDisplay: Send {
    fn write(&mut self, payload: &Payload);
}

#[derive(Debug, Clone)]
pub struct MuxOptions {
    pub session: SessionOptions,
    pub upload_command: String,
    pub interrupt_delay: Duration,
    pub upload_start_timeout: Duration,
}

impl MuxOptions {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            session: SessionOptions {
                chunk_size: config.chunk_size as usize,
                timeout: Duration::from_secs(config.timeout_secs as u64),
                quiet: config.quiet,
            },
            upload_command: config.upload_command.clone(),
            interrupt_delay: Duration::from_millis(config.interrupt_delay_ms as u64),
            upload_start_timeout: Duration::from_millis(config.upload_start_timeout_ms as u64),
        }
    }
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self::from_config(&TransferConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    InterruptElapsed,
    StartTimeout,
}

enum MuxCommand {
    Inbound(Frame),
    Keystroke(String),
    Resize { rows: u16, cols: u16 },
    BinaryInput(Vec<u8>),
    Upload {
        files: Vec<Box<dyn FileReader>>,
        reply: oneshot::Sender<UploadResult>,
    },
    SessionOutput { session: u64, line: String },
    SessionDone { session: u64, report: SessionReport },
    Timer { ticket: u64, kind: TimerKind },
    Shutdown,
}

/// Cloneable front door to a running [`Multiplexer`].
#[derive(Clone)]
pub struct MuxHandle {
    tx: mpsc::UnboundedSender<MuxCommand>,
}

impl MuxHandle {
    fn post(&self, cmd: MuxCommand) -> Result<(), TransferError> {
        self.tx.send(cmd).map_err(|_| TransferError::ChannelClosed)
    }

    /// A frame arrived from the remote end.
    pub fn inbound(&self, frame: Frame) -> Result<(), TransferError> {
        self.post(MuxCommand::Inbound(frame))
    }

    pub fn keystroke(&self, text: impl Into<String>) -> Result<(), TransferError> {
        self.post(MuxCommand::Keystroke(text.into()))
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), TransferError> {
        self.post(MuxCommand::Resize { rows, cols })
    }

    pub fn binary_input(&self, data: Vec<u8>) -> Result<(), TransferError> {
        self.post(MuxCommand::BinaryInput(data))
    }

    /// Start the remote upload command for `files` and wait for the transfer.
    ///
    /// Resolves once: with the session's outcome, or `NotStarted` when the
    /// remote never answers with a handshake.
    pub async fn upload_files(&self, files: Vec<Box<dyn FileReader>>) -> UploadResult {
        let (reply, rx) = oneshot::channel();
        self.post(MuxCommand::Upload { files, reply })?;
        rx.await.map_err(|_| TransferError::ChannelClosed)?
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(MuxCommand::Shutdown);
    }
}

/// Session output is routed back through the inbox so only the actor
/// touches the sink.
struct SessionWriter {
    inbox: mpsc::UnboundedSender<MuxCommand>,
    session: u64,
}

impl RemoteWriter for SessionWriter {
    fn write_remote(&self, line: String) -> Result<(), TransferError> {
        self.inbox
            .send(MuxCommand::SessionOutput {
                session: self.session,
                line,
            })
            .map_err(|_| TransferError::ChannelClosed)
    }
}

struct BoundSession {
    id: u64,
    inbound: mpsc::UnboundedSender<Payload>,
    cancel: CancellationToken,
    reply: Option<oneshot::Sender<UploadResult>>,
}

enum UploadPhase {
    /// Interrupt sent; output is swallowed until the delay elapses.
    Interrupting,
    /// Command sent; the next chunk may be its echo.
    AwaitingMarker { echo_pending: bool },
}

struct PendingUpload {
    ticket: u64,
    command: String,
    phase: UploadPhase,
    files: Vec<Box<dyn FileReader>>,
    reply: oneshot::Sender<UploadResult>,
}

pub struct Multiplexer<S, D> {
    sink: S,
    display: D,
    inbox: mpsc::UnboundedReceiver<MuxCommand>,
    weak_tx: mpsc::WeakUnboundedSender<MuxCommand>,
    dedup: UniqueIdCache,
    providers: TransferProviders,
    options: MuxOptions,
    bound: Option<BoundSession>,
    pending: Option<PendingUpload>,
    next_id: u64,
}

impl<S: ChannelSink, D: TerminalDisplay> Multiplexer<S, D> {
    pub fn new(
        sink: S,
        display: D,
        providers: TransferProviders,
        options: MuxOptions,
    ) -> (Self, MuxHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let mux = Self {
            sink,
            display,
            inbox,
            weak_tx: tx.downgrade(),
            dedup: UniqueIdCache::new(),
            providers,
            options,
            bound: None,
            pending: None,
            next_id: 0,
        };
        (mux, MuxHandle { tx })
    }

    /// Process commands until shutdown, the sink fails, or every handle is gone.
    pub async fn run(mut self) {
        while let Some(cmd) = self.inbox.recv().await {
            let result = match cmd {
                MuxCommand::Inbound(frame) => self.on_inbound(frame),
                MuxCommand::Keystroke(text) => self.on_keystroke(text),
                MuxCommand::Resize { rows, cols } => self.sink.send(resize_frame(rows, cols)),
                MuxCommand::BinaryInput(data) => self.on_binary_input(data),
                MuxCommand::Upload { files, reply } => self.on_upload(files, reply),
                MuxCommand::SessionOutput { session, line } => {
                    self.on_session_output(session, line)
                }
                MuxCommand::SessionDone { session, report } => {
                    self.on_session_done(session, report);
                    Ok(())
                }
                MuxCommand::Timer { ticket, kind } => self.on_timer(ticket, kind),
                MuxCommand::Shutdown => break,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "Channel sink failed, stopping multiplexer");
                break;
            }
        }
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(bound) = self.bound.take() {
            bound.cancel.cancel();
            if let Some(reply) = bound.reply {
                let _ = reply.send(Err(TransferError::ChannelClosed));
            }
        }
        if let Some(pending) = self.pending.take() {
            let _ = pending.reply.send(Err(TransferError::ChannelClosed));
        }
        tracing::debug!("Multiplexer stopped");
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn arm_timer(&self, ticket: u64, kind: TimerKind, after: Duration) {
        let weak = self.weak_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(MuxCommand::Timer { ticket, kind });
            }
        });
    }

    // =========================================================================
    // Inbound output
    // =========================================================================

    fn on_inbound(&mut self, frame: Frame) -> Result<(), TrztermError> {
        let payload = match decode_output_frame(frame) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                return Ok(());
            }
        };

        if let Some(bound) = &self.bound {
            if bound.inbound.send(payload).is_err() {
                tracing::debug!(session = bound.id, "Session no longer reading output");
            }
            return Ok(());
        }

        if let Some(pending) = self.pending.as_mut() {
            match &mut pending.phase {
                UploadPhase::Interrupting => return Ok(()),
                UploadPhase::AwaitingMarker { echo_pending } if *echo_pending => {
                    *echo_pending = false;
                    if strip_ansi(&payload.to_text()).trim() == pending.command {
                        self.display.write(&Payload::from("\r\n"));
                        return Ok(());
                    }
                }
                UploadPhase::AwaitingMarker { .. } => {}
            }
        }

        self.display.write(&payload);

        let Some(key) = detect(&payload) else {
            return Ok(());
        };
        if self.dedup.seen(&key.unique_id) {
            tracing::debug!(unique_id = %key.unique_id, "Ignoring repeated transfer marker");
            return Ok(());
        }
        self.start_session(key);
        Ok(())
    }

    fn start_session(&mut self, key: MagicKey) {
        let Some(inbox) = self.weak_tx.upgrade() else {
            return;
        };

        let (prearmed, reply) = match self.pending.take() {
            Some(pending) if key.mode.is_upload() => (Some(pending.files), Some(pending.reply)),
            other => {
                self.pending = other;
                (None, None)
            }
        };

        let id = self.allocate_id();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = TransferSession::new(
            key.clone(),
            SessionChannel {
                writer: Box::new(SessionWriter {
                    inbox: inbox.clone(),
                    session: id,
                }),
                inbound: inbound_rx,
                cancel: cancel.clone(),
            },
            self.providers.clone(),
            self.options.session.clone(),
            prearmed,
        );

        tracing::info!(session = id, mode = ?key.mode, "Binding transfer session");
        self.bound = Some(BoundSession {
            id,
            inbound: inbound_tx,
            cancel,
            reply,
        });

        tokio::spawn(async move {
            let report = session.run().await;
            let _ = inbox.send(MuxCommand::SessionDone {
                session: id,
                report,
            });
        });
    }

    fn on_session_output(&mut self, session: u64, line: String) -> Result<(), TrztermError> {
        match &self.bound {
            Some(bound) if bound.id == session => self.sink.send(keystroke_frame(&line)),
            _ => {
                tracing::debug!(session, "Dropping output of unbound session");
                Ok(())
            }
        }
    }

    fn on_session_done(&mut self, session: u64, report: SessionReport) {
        let Some(bound) = self.bound.take_if(|bound| bound.id == session) else {
            return;
        };
        tracing::info!(session, state = %report.state, "Transfer session unbound");

        if report.state == SessionState::Failed {
            if let Err(e) = &report.result {
                self.display.write(&Payload::from(format!("\r\n{e}\r\n")));
            }
        }
        if let Some(reply) = bound.reply {
            let _ = reply.send(report.result);
        }
    }

    // =========================================================================
    // Local input
    // =========================================================================

    fn on_keystroke(&mut self, text: String) -> Result<(), TrztermError> {
        match &self.bound {
            Some(bound) => {
                if text.contains(INTERRUPT) {
                    tracing::info!(session = bound.id, "Interrupt received, cancelling transfer");
                    bound.cancel.cancel();
                }
                Ok(())
            }
            None => self.sink.send(keystroke_frame(&text)),
        }
    }

    fn on_binary_input(&mut self, data: Vec<u8>) -> Result<(), TrztermError> {
        if self.bound.is_some() {
            return Ok(());
        }
        self.sink.send(binary_input_frame(&data))
    }

    // =========================================================================
    // Pre-armed upload
    // =========================================================================

    fn on_upload(
        &mut self,
        files: Vec<Box<dyn FileReader>>,
        reply: oneshot::Sender<UploadResult>,
    ) -> Result<(), TrztermError> {
        if self.bound.is_some() {
            let _ = reply.send(Err(TransferError::Busy(
                "a transfer is already in progress".into(),
            )));
            return Ok(());
        }
        if self.pending.is_some() {
            let _ = reply.send(Err(TransferError::Busy(
                "another upload is waiting to start".into(),
            )));
            return Ok(());
        }
        if files.is_empty() {
            let _ = reply.send(Err(TransferError::NoSelection));
            return Ok(());
        }

        let command = if has_directory(&files) {
            format!("{} -d", self.options.upload_command)
        } else {
            self.options.upload_command.clone()
        };
        let ticket = self.allocate_id();
        tracing::info!(count = files.len(), command = %command, "Pre-arming upload");

        self.sink.send(keystroke_frame(INTERRUPT))?;
        self.pending = Some(PendingUpload {
            ticket,
            command,
            phase: UploadPhase::Interrupting,
            files,
            reply,
        });
        self.arm_timer(ticket, TimerKind::InterruptElapsed, self.options.interrupt_delay);
        Ok(())
    }

    fn on_timer(&mut self, ticket: u64, kind: TimerKind) -> Result<(), TrztermError> {
        let Some(pending) = self.pending.as_mut().filter(|p| p.ticket == ticket) else {
            return Ok(());
        };
        match kind {
            TimerKind::InterruptElapsed => {
                if !matches!(pending.phase, UploadPhase::Interrupting) {
                    return Ok(());
                }
                pending.phase = UploadPhase::AwaitingMarker { echo_pending: true };
                let line = format!("{}\r", pending.command);
                self.sink.send(keystroke_frame(&line))?;
                self.arm_timer(ticket, TimerKind::StartTimeout, self.options.upload_start_timeout);
            }
            TimerKind::StartTimeout => {
                if let Some(pending) = self.pending.take() {
                    tracing::warn!(command = %pending.command, "Upload did not start in time");
                    let _ = pending.reply.send(Err(TransferError::NotStarted));
                }
            }
        }
        Ok(())
    }
}
