pub mod errors;
pub mod types;

pub use errors::{ConfigError, FrameError, TransferError, TrztermError};
pub use types::Payload;

pub type Result<T> = std::result::Result<T, TrztermError>;
