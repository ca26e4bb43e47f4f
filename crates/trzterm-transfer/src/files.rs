//! File descriptor contracts the session drives.
//!
//! Implementations live outside the core (local disk, browser blobs, memory);
//! the session only sees these traits.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use trzterm_common::TransferError;

/// A readable entry selected for upload.
#[async_trait]
pub trait FileReader: Send {
    /// Groups entries that came from the same top-level selection.
    fn path_id(&self) -> u32;

    /// Path segments relative to the selection root; the first segment is
    /// the top-level name.
    fn rel_path(&self) -> &[String];

    fn is_dir(&self) -> bool;

    fn size(&self) -> u64;

    /// Next chunk of at most `max_len` bytes; empty at end of file.
    async fn read_chunk(&mut self, max_len: usize) -> Result<Vec<u8>, TransferError>;

    async fn close(&mut self);
}

/// A writable target opened for a downloaded entry.
#[async_trait]
pub trait FileWriter: Send {
    /// Local top-level name the entry was saved under.
    fn local_name(&self) -> &str;

    fn is_dir(&self) -> bool;

    async fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransferError>;

    /// Flush everything; the target is complete afterwards.
    async fn finish(&mut self) -> Result<(), TransferError>;

    /// Remove a partially written target.
    async fn delete(&mut self) -> Result<(), TransferError>;

    async fn close(&mut self);
}

/// Highest numeric suffix tried when making a top-level name unique.
pub const MAX_NAME_SUFFIX: u32 = 1000;

/// Factory for download targets.
#[async_trait]
pub trait SaveFileOpener: Send + Sync {
    /// Local name for a new top-level entry. With `overwrite` off the result
    /// must not collide with anything already in `save_dir`.
    async fn resolve_top_name(
        &self,
        save_dir: &Path,
        name: &str,
        overwrite: bool,
    ) -> Result<String, TransferError>;

    /// Open a writer for `rel_path` (first segment already resolved).
    async fn open_save_file(
        &self,
        save_dir: &Path,
        rel_path: &[String],
        is_dir: bool,
        overwrite: bool,
    ) -> Result<Box<dyn FileWriter>, TransferError>;
}

/// Resolves a user gesture into files to send or a place to save.
#[async_trait]
pub trait FilePicker: Send + Sync {
    /// `None` when the user selected nothing or cancelled.
    async fn choose_send_files(
        &self,
        directory: bool,
    ) -> Result<Option<Vec<Box<dyn FileReader>>>, TransferError>;

    async fn choose_save_dir(&self) -> Result<Option<PathBuf>, TransferError>;
}

/// Fail fast when two entries would land on the same remote path.
pub fn check_duplicate_names(files: &[Box<dyn FileReader>]) -> Result<(), TransferError> {
    let mut seen = HashSet::new();
    for file in files {
        let path = file.rel_path().join("/");
        if !seen.insert(path.clone()) {
            return Err(TransferError::DuplicateName(path));
        }
    }
    Ok(())
}

/// Whether the selection needs the directory protocol.
pub fn has_directory(files: &[Box<dyn FileReader>]) -> bool {
    files
        .iter()
        .any(|file| file.is_dir() || file.rel_path().len() > 1)
}

/// Name shown to the user for an entry.
pub fn display_name(rel_path: &[String]) -> &str {
    rel_path.last().map(String::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryFile;

    fn boxed(files: Vec<MemoryFile>) -> Vec<Box<dyn FileReader>> {
        files
            .into_iter()
            .map(|f| Box::new(f) as Box<dyn FileReader>)
            .collect()
    }

    #[test]
    fn duplicate_relative_paths_rejected() {
        let files = boxed(vec![
            MemoryFile::file(1, &["a", "b.txt"], b"one"),
            MemoryFile::file(2, &["a", "b.txt"], b"two"),
        ]);
        let err = check_duplicate_names(&files).unwrap_err();
        assert_eq!(err, TransferError::DuplicateName("a/b.txt".into()));
    }

    #[test]
    fn same_leaf_in_different_dirs_is_fine() {
        let files = boxed(vec![
            MemoryFile::file(1, &["a", "b.txt"], b"one"),
            MemoryFile::file(2, &["c", "b.txt"], b"two"),
        ]);
        assert!(check_duplicate_names(&files).is_ok());
    }

    #[test]
    fn nested_entries_need_directory_protocol() {
        let flat = boxed(vec![MemoryFile::file(1, &["x.txt"], b"")]);
        assert!(!has_directory(&flat));

        let nested = boxed(vec![MemoryFile::file(1, &["d", "x.txt"], b"")]);
        assert!(has_directory(&nested));

        let dir = boxed(vec![MemoryFile::dir(1, &["d"])]);
        assert!(has_directory(&dir));
    }

    #[test]
    fn display_name_is_leaf() {
        let path = vec!["a".to_string(), "b.txt".to_string()];
        assert_eq!(display_name(&path), "b.txt");
        assert_eq!(display_name(&[]), "");
    }
}
