//! Local terminal plumbing: raw mode, stdin reader, stdout display.

use std::io::{Read, Write};
use std::thread;

use tokio::sync::mpsc;
use trzterm_common::Payload;
use trzterm_mux::TerminalDisplay;

const STDIN_READ_CHUNK: usize = 4096;

// =============================================================================
// RAW MODE
// =============================================================================

/// Raw mode for the lifetime of the guard. A no-op when stdin is not a tty.
pub struct RawModeGuard {
    enabled: bool,
}

impl RawModeGuard {
    pub fn enable() -> Self {
        match crossterm::terminal::enable_raw_mode() {
            Ok(()) => Self { enabled: true },
            Err(e) => {
                tracing::debug!(error = %e, "Raw mode unavailable");
                Self { enabled: false }
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.enabled {
            let _ = crossterm::terminal::disable_raw_mode();
        }
    }
}

/// Current size as (rows, cols), if stdout is a terminal.
pub fn size() -> Option<(u16, u16)> {
    crossterm::terminal::size()
        .ok()
        .map(|(cols, rows)| (rows, cols))
}

// =============================================================================
// INPUT
// =============================================================================

/// Something typed locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalInput {
    Keys(Vec<u8>),
    Interrupt,
    Resized { rows: u16, cols: u16 },
    /// stdin reached end of file.
    Eof,
}

/// Read stdin on a background thread, ending with [`LocalInput::Eof`].
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<LocalInput>) {
    let spawned = thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; STDIN_READ_CHUNK];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(LocalInput::Keys(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::debug!("stdin read error: {e}");
                        break;
                    }
                }
            }
            tracing::debug!("stdin closed");
            let _ = tx.send(LocalInput::Eof);
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "Failed to spawn stdin reader");
    }
}

/// Forward SIGINT as an interrupt key (only seen when raw mode is off) and
/// window changes as resizes.
pub fn spawn_signal_forwarder(tx: mpsc::UnboundedSender<LocalInput>) {
    let interrupt_tx = tx.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_tx.send(LocalInput::Interrupt).is_err() {
                break;
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut winch = match signal(SignalKind::window_change()) {
            Ok(winch) => winch,
            Err(e) => {
                tracing::debug!(error = %e, "No SIGWINCH handler");
                return;
            }
        };
        while winch.recv().await.is_some() {
            if let Some((rows, cols)) = size() {
                if tx.send(LocalInput::Resized { rows, cols }).is_err() {
                    break;
                }
            }
        }
    });
    #[cfg(not(unix))]
    drop(tx);
}

/// Keystrokes go out as text when they are valid UTF-8.
pub fn split_keys(keys: Vec<u8>) -> Result<String, Vec<u8>> {
    String::from_utf8(keys).map_err(|e| e.into_bytes())
}

// =============================================================================
// OUTPUT
// =============================================================================

/// Writes remote output straight to stdout.
pub struct StdoutDisplay;

impl TerminalDisplay for StdoutDisplay {
    fn write(&mut self, payload: &Payload) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout
            .write_all(payload.as_bytes())
            .and_then(|()| stdout.flush())
        {
            tracing::warn!(error = %e, "stdout write failed");
        }
    }
}
