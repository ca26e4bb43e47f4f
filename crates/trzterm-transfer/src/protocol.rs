//! Transfer protocol message shapes.
//!
//! Every message is one line `#<TYPE>:<body><newline>`. Bodies are either
//! decimal integers or Codec envelopes; structured bodies are JSON inside
//! the envelope.

use serde::{Deserialize, Serialize};
use trzterm_common::TransferError;

/// Message type tags.
pub mod tag {
    pub const ACTION: &str = "ACT";
    pub const CONFIG: &str = "CFG";
    pub const NUM: &str = "NUM";
    pub const NAME: &str = "NAME";
    pub const SIZE: &str = "SIZE";
    pub const DATA: &str = "DATA";
    pub const MD5: &str = "MD5";
    pub const SUCC: &str = "SUCC";
    pub const EXIT: &str = "EXIT";
    /// Protocol-level failure.
    pub const FAIL: &str = "FAIL";
    /// User-level failure (cancel, bad selection).
    pub const FAIL_USER: &str = "fail";
}

/// Newline the remote expects before its config says otherwise.
pub const DEFAULT_NEWLINE: &str = "\n";

/// Windows consoles eat a bare trailing newline; the remote strips the `!`.
pub const WINDOWS_NEWLINE: &str = "!\n";

/// Hard cap on a chunk when the remote does not announce one.
pub const DEFAULT_MAX_BUF_SIZE: usize = 10 * 1024 * 1024;

/// First message from the local side: do we go ahead or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub lang: String,
    pub confirm: bool,
    pub version: String,
    pub support_dir: bool,
    pub binary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newline: Option<String>,
}

impl Action {
    pub fn new(confirm: bool, remote_is_windows: bool) -> Self {
        Self {
            lang: "rs".into(),
            confirm,
            version: env!("CARGO_PKG_VERSION").into(),
            support_dir: true,
            binary: false,
            newline: remote_is_windows.then(|| WINDOWS_NEWLINE.to_string()),
        }
    }
}

/// Settings the remote tool announces after a confirmed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub quiet: bool,
    pub overwrite: bool,
    /// Remote supports the JSON name header and directory entries.
    pub directory: bool,
    /// Per-message receive timeout in seconds; 0 disables it.
    pub timeout: u64,
    pub newline: String,
    pub max_buf_size: usize,
    /// Width of the remote terminal pane, 0 when unknown.
    pub tmux_pane_width: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            quiet: false,
            overwrite: false,
            directory: false,
            timeout: 20,
            newline: DEFAULT_NEWLINE.into(),
            max_buf_size: DEFAULT_MAX_BUF_SIZE,
            tmux_pane_width: 0,
        }
    }
}

impl RemoteConfig {
    pub fn from_json(json: &str) -> Result<Self, TransferError> {
        serde_json::from_str(json)
            .map_err(|e| TransferError::Protocol(format!("invalid config: {e}")))
    }
}

/// Per-entry header used when the remote supports directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryHeader {
    pub path_id: u32,
    pub path_name: Vec<String>,
    pub is_dir: bool,
}

impl EntryHeader {
    pub fn from_json(json: &str) -> Result<Self, TransferError> {
        let header: EntryHeader = serde_json::from_str(json)
            .map_err(|e| TransferError::Protocol(format!("invalid file header: {e}")))?;
        validate_path_name(&header.path_name)?;
        Ok(header)
    }

    pub fn to_json(&self) -> Result<String, TransferError> {
        serde_json::to_string(self)
            .map_err(|e| TransferError::Protocol(format!("encode file header: {e}")))
    }
}

/// Reject path segments that could escape the save directory.
pub fn validate_path_name(segments: &[String]) -> Result<(), TransferError> {
    if segments.is_empty() {
        return Err(TransferError::Protocol("empty path".into()));
    }
    for segment in segments {
        if segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains('/')
            || segment.contains('\\')
            || segment.contains('\0')
        {
            return Err(TransferError::Protocol(format!(
                "invalid path segment: {segment:?}"
            )));
        }
    }
    Ok(())
}

/// Render one protocol line.
pub fn format_line(typ: &str, body: &str, newline: &str) -> String {
    format!("#{typ}:{body}{newline}")
}

/// Completion summary sent to the remote in the final `EXIT` message.
/// `verb` is `Saved` for downloads and `Sent` for uploads.
pub fn format_summary(verb: &str, names: &[String], dest: &str) -> String {
    let noun = if names.len() > 1 {
        "files/directories"
    } else {
        "file/directory"
    };
    let mut msg = format!("{verb} {} {noun}", names.len());
    if !dest.is_empty() {
        msg.push_str(" to ");
        msg.push_str(dest);
    }
    for name in names {
        msg.push_str("\r\n- ");
        msg.push_str(name);
    }
    msg
}
