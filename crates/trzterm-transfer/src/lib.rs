//! File transfer embedded in a terminal stream.
//!
//! The remote tool announces a transfer by printing a marker; from then on
//! both sides exchange line-based messages over the same terminal channel
//! until the session ends and the terminal gets its output back.

pub mod ansi;
pub mod codec;
pub mod dedup;
pub mod files;
pub mod magic;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod progress;
pub mod protocol;
pub mod session;
pub mod transport;

pub use dedup::UniqueIdCache;
pub use files::{FilePicker, FileReader, FileWriter, SaveFileOpener, MAX_NAME_SUFFIX};
pub use magic::{detect, MagicKey, TransferMode};
pub use progress::{ProgressFactory, ProgressSink};
pub use session::{
    SessionChannel, SessionOptions, SessionReport, SessionState, TransferProviders,
    TransferSession, TransferSummary,
};
pub use transport::RemoteWriter;
