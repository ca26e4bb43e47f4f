//! Local filesystem side of the transfer: what to send, where to save.

pub mod picker;
pub mod reader;
pub mod saver;

pub use picker::LocalPicker;
pub use reader::{collect_send_files, LocalFileReader};
pub use saver::LocalSaver;

use std::path::Path;

use trzterm_common::TransferError;

pub(crate) fn file_error(path: &Path, err: std::io::Error) -> TransferError {
    TransferError::File(format!("{}: {err}", path.display()))
}
