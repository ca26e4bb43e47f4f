//! One file transfer from handshake to teardown.
//!
//! A session is created when the scanner reports a fresh marker, owns every
//! file descriptor it touches, and always ends in `Done`, `Failed` or
//! `Cancelled` with its descriptors closed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use trzterm_common::{Payload, TransferError};

use crate::files::{
    check_duplicate_names, display_name, has_directory, FilePicker, FileReader, FileWriter,
    SaveFileOpener,
};
use crate::magic::{MagicKey, TransferMode};
use crate::progress::{Progress, ProgressFactory};
use crate::protocol::{
    format_summary, tag, validate_path_name, Action, EntryHeader, RemoteConfig,
};
use crate::transport::{guarded, RemoteWriter, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Negotiating,
    ExchangingConfig,
    Transferring,
    Finishing,
    Done,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Done | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Negotiating => "negotiating",
            SessionState::ExchangingConfig => "exchanging-config",
            SessionState::Transferring => "transferring",
            SessionState::Finishing => "finishing",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// What a completed transfer moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub mode: TransferMode,
    /// Top-level names: remote names for uploads, local names for downloads.
    pub names: Vec<String>,
    /// Save directory of a download.
    pub destination: Option<PathBuf>,
    /// The text sent to the remote in `EXIT`.
    pub message: String,
}

/// Final outcome handed back to whoever spawned the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    pub result: Result<TransferSummary, TransferError>,
}

/// The session's end of the shared terminal channel.
pub struct SessionChannel {
    pub writer: Box<dyn RemoteWriter>,
    pub inbound: mpsc::UnboundedReceiver<Payload>,
    pub cancel: CancellationToken,
}

/// Local knobs, fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub chunk_size: usize,
    /// Receive timeout until the remote config replaces it.
    pub timeout: Duration,
    /// Suppress progress reporting regardless of the remote's wish.
    pub quiet: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            timeout: Duration::from_secs(20),
            quiet: false,
        }
    }
}

/// External collaborators a session calls out to.
#[derive(Clone)]
pub struct TransferProviders {
    pub picker: Arc<dyn FilePicker>,
    pub opener: Arc<dyn SaveFileOpener>,
    pub progress: Option<Arc<dyn ProgressFactory>>,
}

pub struct TransferSession {
    key: MagicKey,
    state: SessionState,
    transport: Transport,
    providers: TransferProviders,
    options: SessionOptions,
    remote: RemoteConfig,
    progress: Progress,
    prearmed: Option<Vec<Box<dyn FileReader>>>,
    readers: Vec<Box<dyn FileReader>>,
    writers: Vec<Box<dyn FileWriter>>,
    /// Download target currently receiving data; deleted if the session dies.
    partial: Option<Box<dyn FileWriter>>,
}

impl TransferSession {
    /// `prearmed` replaces the picker for upload modes.
    pub fn new(
        key: MagicKey,
        channel: SessionChannel,
        providers: TransferProviders,
        options: SessionOptions,
        prearmed: Option<Vec<Box<dyn FileReader>>>,
    ) -> Self {
        let transport = Transport::new(
            channel.writer,
            channel.inbound,
            channel.cancel,
            options.timeout,
            key.remote_is_windows,
        );
        Self {
            key,
            state: SessionState::Idle,
            transport,
            providers,
            options,
            remote: RemoteConfig::default(),
            progress: Progress::silent(),
            prearmed,
            readers: Vec::new(),
            writers: Vec::new(),
            partial: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the transfer to a terminal state and release everything.
    pub async fn run(mut self) -> SessionReport {
        tracing::info!(
            mode = ?self.key.mode,
            version = %self.key.version,
            unique_id = %self.key.unique_id,
            "Transfer session started"
        );

        let outcome = self.execute().await;
        let result = match outcome {
            Ok(summary) => {
                self.state = SessionState::Done;
                Ok(summary)
            }
            Err(TransferError::Cancelled) => {
                self.state = SessionState::Cancelled;
                match self.transport.client_error(&TransferError::Cancelled) {
                    Ok(()) => Err(TransferError::Cancelled),
                    Err(e) => Err(e),
                }
            }
            Err(TransferError::NoSelection) => {
                self.state = SessionState::Done;
                Err(TransferError::NoSelection)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                if !matches!(
                    e,
                    TransferError::RemoteFailure(_) | TransferError::ChannelClosed
                ) {
                    if let Err(send_err) = self.transport.client_error(&e) {
                        tracing::warn!(error = %send_err, "Failed to report error to remote");
                    }
                }
                Err(e)
            }
        };

        self.teardown().await;

        match &result {
            Ok(summary) => {
                tracing::info!(count = summary.names.len(), "Transfer session finished")
            }
            Err(e) => tracing::info!(state = %self.state, error = %e, "Transfer session ended"),
        }
        SessionReport {
            state: self.state,
            result,
        }
    }

    async fn execute(&mut self) -> Result<TransferSummary, TransferError> {
        self.state = SessionState::Negotiating;
        if self.key.mode.is_upload() {
            self.upload().await
        } else {
            self.download().await
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut writer) = self.partial.take() {
            if let Err(e) = writer.delete().await {
                tracing::warn!(name = writer.local_name(), error = %e, "Failed to delete partial file");
            }
            writer.close().await;
        }
        for reader in self.readers.iter_mut() {
            reader.close().await;
        }
        for writer in self.writers.iter_mut() {
            writer.close().await;
        }
        self.progress.done();
    }

    fn send_action(&self, confirm: bool) -> Result<(), TransferError> {
        let action = Action::new(confirm, self.key.remote_is_windows);
        let json = serde_json::to_string(&action)
            .map_err(|e| TransferError::Protocol(format!("encode action: {e}")))?;
        self.transport.send_string(tag::ACTION, &json)
    }

    async fn exchange_config(&mut self) -> Result<(), TransferError> {
        self.state = SessionState::ExchangingConfig;
        let json = self.transport.recv_config().await?;
        let remote = RemoteConfig::from_json(&json)?;
        tracing::debug!(
            overwrite = remote.overwrite,
            directory = remote.directory,
            timeout = remote.timeout,
            max_buf_size = remote.max_buf_size,
            "Remote config received"
        );

        self.transport.set_timeout_secs(remote.timeout);
        self.transport.set_newline(&remote.newline);
        if !remote.quiet && !self.options.quiet {
            if let Some(factory) = &self.providers.progress {
                self.progress.attach(factory.create());
                if remote.tmux_pane_width > 0 {
                    self.progress.width_hint(remote.tmux_pane_width);
                }
            }
        }
        self.remote = remote;
        Ok(())
    }

    // =========================================================================
    // Upload
    // =========================================================================

    async fn upload(&mut self) -> Result<TransferSummary, TransferError> {
        let directory = self.key.mode == TransferMode::Directory;
        let selection = match self.prearmed.take() {
            Some(files) => Some(files),
            None => {
                let cancel = self.transport.cancel_token();
                let picker = self.providers.picker.clone();
                guarded(&cancel, None, picker.choose_send_files(directory)).await?
            }
        };
        match selection {
            Some(files) if !files.is_empty() => self.readers = files,
            _ => {
                self.send_action(false)?;
                return Err(TransferError::NoSelection);
            }
        }

        self.send_action(true)?;
        self.exchange_config().await?;
        self.state = SessionState::Transferring;

        if has_directory(&self.readers) && !self.remote.directory {
            return Err(TransferError::Protocol(
                "remote does not support directories".into(),
            ));
        }
        if !self.remote.overwrite {
            check_duplicate_names(&self.readers)?;
        }

        let names = self.send_files().await?;

        self.state = SessionState::Finishing;
        let message = format_summary("Sent", &names, "");
        self.transport.client_exit(&message)?;
        Ok(TransferSummary {
            mode: self.key.mode,
            names,
            destination: None,
            message,
        })
    }

    async fn send_files(&mut self) -> Result<Vec<String>, TransferError> {
        let chunk_len = self
            .options
            .chunk_size
            .min(self.remote.max_buf_size)
            .max(1);
        let cancel = self.transport.cancel_token();
        let count = self.readers.len();

        self.transport.send_integer(tag::NUM, count as u64)?;
        self.transport.check_integer(count as u64).await?;
        self.progress.count(count);

        let mut names = Vec::new();
        let mut announced = HashSet::new();
        for reader in self.readers.iter_mut() {
            self.transport.check_cancelled()?;

            let name = display_name(reader.rel_path()).to_string();
            if self.remote.directory {
                let header = EntryHeader {
                    path_id: reader.path_id(),
                    path_name: reader.rel_path().to_vec(),
                    is_dir: reader.is_dir(),
                };
                self.transport.send_string(tag::NAME, &header.to_json()?)?;
            } else {
                self.transport.send_string(tag::NAME, &name)?;
            }
            let remote_name = self.transport.recv_string(tag::SUCC).await?;
            if announced.insert(reader.path_id()) {
                names.push(remote_name);
            }
            self.progress.name(&name);

            if reader.is_dir() {
                continue;
            }

            let size = reader.size();
            self.transport.send_integer(tag::SIZE, size)?;
            self.transport.check_integer(size).await?;
            self.progress.size(size);

            let mut digest = md5::Context::new();
            let mut step = 0u64;
            while step < size {
                self.transport.check_cancelled()?;
                let chunk = guarded(&cancel, None, reader.read_chunk(chunk_len)).await?;
                if chunk.is_empty() {
                    break;
                }
                self.transport.send_data(&chunk)?;
                self.transport.check_integer(chunk.len() as u64).await?;
                digest.consume(&chunk);
                step += chunk.len() as u64;
                self.progress.step(step);
            }
            if step != size {
                return Err(TransferError::File(format!(
                    "{name}: size changed during transfer ({step} of {size} bytes)"
                )));
            }

            let md5 = digest.compute().0;
            self.transport.send_binary(tag::MD5, &md5)?;
            self.transport.check_binary(&md5).await?;
            tracing::debug!(name = %name, size, "File sent");
        }
        Ok(names)
    }

    // =========================================================================
    // Download
    // =========================================================================

    async fn download(&mut self) -> Result<TransferSummary, TransferError> {
        let cancel = self.transport.cancel_token();
        let picker = self.providers.picker.clone();
        let Some(save_dir) = guarded(&cancel, None, picker.choose_save_dir()).await? else {
            self.send_action(false)?;
            return Err(TransferError::NoSelection);
        };

        self.send_action(true)?;
        self.exchange_config().await?;
        self.state = SessionState::Transferring;

        let names = self.recv_files(&save_dir).await?;

        self.state = SessionState::Finishing;
        let dest = save_dir.display().to_string();
        let message = format_summary("Saved", &names, &dest);
        self.transport.client_exit(&message)?;
        Ok(TransferSummary {
            mode: self.key.mode,
            names,
            destination: Some(save_dir),
            message,
        })
    }

    async fn recv_files(&mut self, save_dir: &Path) -> Result<Vec<String>, TransferError> {
        let cancel = self.transport.cancel_token();
        let overwrite = self.remote.overwrite;
        let opener = self.providers.opener.clone();

        let count = self.transport.recv_integer(tag::NUM).await?;
        self.transport.send_integer(tag::SUCC, count)?;
        self.progress.count(count as usize);

        let mut names = Vec::new();
        let mut top_names: HashMap<u32, String> = HashMap::new();
        for index in 0..count {
            self.transport.check_cancelled()?;

            let body = self.transport.recv_string(tag::NAME).await?;
            let header = if self.remote.directory {
                EntryHeader::from_json(&body)?
            } else {
                let path_name = vec![body];
                validate_path_name(&path_name)?;
                EntryHeader {
                    path_id: index as u32,
                    path_name,
                    is_dir: false,
                }
            };

            let top = match top_names.get(&header.path_id) {
                Some(top) => top.clone(),
                None => {
                    let top = guarded(
                        &cancel,
                        None,
                        opener.resolve_top_name(save_dir, &header.path_name[0], overwrite),
                    )
                    .await?;
                    top_names.insert(header.path_id, top.clone());
                    names.push(top.clone());
                    top
                }
            };
            let mut rel_path = header.path_name.clone();
            rel_path[0] = top;

            let writer = guarded(
                &cancel,
                None,
                opener.open_save_file(save_dir, &rel_path, header.is_dir, overwrite),
            )
            .await?;
            self.transport.send_string(tag::SUCC, writer.local_name())?;
            let name = display_name(&rel_path).to_string();
            self.progress.name(&name);

            if header.is_dir {
                self.writers.push(writer);
                continue;
            }
            self.partial = Some(writer);
            self.recv_file_data(&name).await?;
            if let Some(mut writer) = self.partial.take() {
                let finished = guarded(&cancel, None, writer.finish()).await;
                self.writers.push(writer);
                finished?;
            }
            tracing::debug!(name = %name, "File saved");
        }
        Ok(names)
    }

    async fn recv_file_data(&mut self, name: &str) -> Result<(), TransferError> {
        let cancel = self.transport.cancel_token();
        let size = self.transport.recv_integer(tag::SIZE).await?;
        self.transport.send_integer(tag::SUCC, size)?;
        self.progress.size(size);

        let Some(writer) = self.partial.as_mut() else {
            return Err(TransferError::File(format!("{name}: no open writer")));
        };
        let mut digest = md5::Context::new();
        let mut step = 0u64;
        while step < size {
            self.transport.check_cancelled()?;
            let data = self.transport.recv_data().await?;
            step += data.len() as u64;
            if step > size {
                return Err(TransferError::Protocol(format!(
                    "{name}: received {step} bytes, expected {size}"
                )));
            }
            guarded(&cancel, None, writer.write_chunk(&data)).await?;
            digest.consume(&data);
            self.transport.send_integer(tag::SUCC, data.len() as u64)?;
            self.progress.step(step);
        }

        let expected = self.transport.recv_binary(tag::MD5).await?;
        let actual = digest.compute().0;
        if expected != actual {
            return Err(TransferError::Protocol(format!("{name}: md5 check failed")));
        }
        self.transport.send_binary(tag::SUCC, &actual)
    }
}

#[cfg(test)]
mod tests;
