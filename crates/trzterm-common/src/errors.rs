use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Wire-level framing failures on the terminal channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown frame tag: {0}")]
    UnknownTag(String),
}

/// Failures of a single file transfer. None of these are fatal for the
/// channel; they end the bound session only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// The remote side reported a failure or exited; carries its decoded message.
    #[error("{0}")]
    RemoteFailure(String),

    #[error("Stopped")]
    Cancelled,

    #[error("no files selected")]
    NoSelection,

    #[error("transfer did not start")]
    NotStarted,

    #[error("{0}")]
    Busy(String),

    #[error("file error: {0}")]
    File(String),

    #[error("channel closed")]
    ChannelClosed,
}

impl TransferError {
    /// Errors the user caused or asked for, as opposed to protocol breakage.
    /// Decides between the `fail` and `FAIL` notices sent to the remote.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            TransferError::Cancelled
                | TransferError::DuplicateName(_)
                | TransferError::NoSelection
                | TransferError::File(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TrztermError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("terminal error: {0}")]
    Terminal(String),
}
