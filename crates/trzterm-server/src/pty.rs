//! PTY-backed command: spawn, feed input, stream output, observe exit.

use std::io::{Read, Write};
use std::thread;

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::{mpsc, oneshot};
use trzterm_common::TrztermError;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Maximum bytes to read from the PTY at once (8 KB).
pub const PTY_READ_CHUNK: usize = 8_192;

pub const DEFAULT_COLS: u16 = 80;
pub const DEFAULT_ROWS: u16 = 24;

// =============================================================================
// COMMAND
// =============================================================================

/// An empty command runs the user's login shell; anything else goes
/// through the platform shell.
pub fn build_command(command: &str) -> CommandBuilder {
    let mut cmd = if command.trim().is_empty() {
        CommandBuilder::new_default_prog()
    } else {
        #[cfg(unix)]
        {
            let mut cmd = CommandBuilder::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
        #[cfg(windows)]
        {
            let mut cmd = CommandBuilder::new("cmd.exe");
            cmd.args(["/C", command]);
            cmd
        }
    };
    cmd.env("TERM", "xterm-256color");
    cmd
}

fn terminal_error(context: &str, err: impl std::fmt::Display) -> TrztermError {
    TrztermError::Terminal(format!("{context}: {err}"))
}

// =============================================================================
// PROCESS
// =============================================================================

/// A running command and the master side of its PTY.
pub struct PtyProcess {
    /// Input for the writer thread; writes to the PTY may block.
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    /// Output chunks from the reader thread; closes on EOF.
    pub output_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Exit code, once the child has been reaped.
    pub exit_rx: oneshot::Receiver<u32>,
}

impl PtyProcess {
    pub fn spawn(command: &str, rows: u16, cols: u16) -> Result<Self, TrztermError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| terminal_error("failed to open PTY", e))?;

        let mut child = pair
            .slave
            .spawn_command(build_command(command))
            .map_err(|e| terminal_error("failed to spawn command", e))?;
        // Only the master side is needed from here on.
        drop(pair.slave);

        let killer = child.clone_killer();
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| terminal_error("failed to take PTY writer", e))?;
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| terminal_error("failed to clone PTY reader", e))?;

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("pty-reader".to_string())
            .spawn(move || {
                let mut buf = [0u8; PTY_READ_CHUNK];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => {
                            if output_tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            // EIO once the child side is gone.
                            tracing::debug!("PTY reader error: {e}");
                            break;
                        }
                    }
                }
            })
            .map_err(|e| terminal_error("failed to spawn PTY reader thread", e))?;

        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        thread::Builder::new()
            .name("pty-writer".to_string())
            .spawn(move || {
                while let Some(data) = input_rx.blocking_recv() {
                    if let Err(e) = writer.write_all(&data).and_then(|()| writer.flush()) {
                        tracing::debug!("PTY writer error: {e}");
                        break;
                    }
                }
            })
            .map_err(|e| terminal_error("failed to spawn PTY writer thread", e))?;

        let (exit_tx, exit_rx) = oneshot::channel();
        thread::Builder::new()
            .name("pty-waiter".to_string())
            .spawn(move || {
                let code = match child.wait() {
                    Ok(status) => status.exit_code(),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to wait for command");
                        1
                    }
                };
                let _ = exit_tx.send(code);
            })
            .map_err(|e| terminal_error("failed to spawn PTY waiter thread", e))?;

        tracing::info!(command = %command, rows, cols, "Command started");
        Ok(Self {
            input_tx,
            master: pair.master,
            killer,
            output_rx,
            exit_rx,
        })
    }

    /// Queue input for the command; never blocks the caller.
    pub fn write(&self, data: &[u8]) -> Result<(), TrztermError> {
        self.input_tx
            .send(data.to_vec())
            .map_err(|_| TrztermError::Terminal("PTY writer has stopped".into()))
    }

    pub fn resize(&self, rows: u16, cols: u16) -> Result<(), TrztermError> {
        self.master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| terminal_error("failed to resize PTY", e))
    }

    pub fn kill(&mut self) {
        match self.killer.kill() {
            Ok(()) => tracing::debug!("Command killed"),
            Err(e) => tracing::debug!(error = %e, "Kill failed, command already gone?"),
        }
    }
}
