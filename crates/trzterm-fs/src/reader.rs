//! Expanding selected paths into upload entries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use trzterm_common::TransferError;
use trzterm_transfer::FileReader;
use walkdir::WalkDir;

use crate::file_error;

/// One file or directory on local disk, opened lazily on first read.
#[derive(Debug)]
pub struct LocalFileReader {
    path: PathBuf,
    path_id: u32,
    rel_path: Vec<String>,
    is_dir: bool,
    size: u64,
    file: Option<File>,
}

impl LocalFileReader {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl FileReader for LocalFileReader {
    fn path_id(&self) -> u32 {
        self.path_id
    }

    fn rel_path(&self) -> &[String] {
        &self.rel_path
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_chunk(&mut self, max_len: usize) -> Result<Vec<u8>, TransferError> {
        if self.is_dir {
            return Ok(Vec::new());
        }
        if self.file.is_none() {
            let file = File::open(&self.path)
                .await
                .map_err(|e| file_error(&self.path, e))?;
            self.file = Some(file);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(Vec::new());
        };
        let mut buf = vec![0u8; max_len];
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| file_error(&self.path, e))?;
        buf.truncate(n);
        Ok(buf)
    }

    async fn close(&mut self) {
        self.file = None;
    }
}

fn name_of(path: &Path) -> Result<String, TransferError> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| TransferError::File(format!("{}: has no file name", path.display())))
}

/// Expand `paths` into readers in transfer order.
///
/// Each selected path gets its own path-id. Directories are walked sorted by
/// name and every directory comes before its contents. Without `directory`
/// support a selected directory is an error.
pub fn collect_send_files(
    paths: &[PathBuf],
    directory: bool,
) -> Result<Vec<LocalFileReader>, TransferError> {
    let mut readers = Vec::new();
    for (index, path) in paths.iter().enumerate() {
        let path_id = index as u32;
        let metadata = std::fs::metadata(path).map_err(|e| file_error(path, e))?;
        let top = name_of(path)?;

        if !metadata.is_dir() {
            readers.push(LocalFileReader {
                path: path.clone(),
                path_id,
                rel_path: vec![top],
                is_dir: false,
                size: metadata.len(),
                file: None,
            });
            continue;
        }
        if !directory {
            return Err(TransferError::File(format!(
                "{}: is a directory",
                path.display()
            )));
        }

        for entry in WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = entry.map_err(|e| TransferError::File(e.to_string()))?;
            let file_type = entry.file_type();
            if !file_type.is_dir() && !file_type.is_file() {
                tracing::debug!(path = %entry.path().display(), "Skipping special file");
                continue;
            }
            let size = if file_type.is_file() {
                entry
                    .metadata()
                    .map_err(|e| TransferError::File(e.to_string()))?
                    .len()
            } else {
                0
            };
            let mut rel_path = vec![top.clone()];
            if let Ok(rest) = entry.path().strip_prefix(path) {
                rel_path.extend(
                    rest.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned()),
                );
            }
            readers.push(LocalFileReader {
                path: entry.path().to_path_buf(),
                path_id,
                rel_path,
                is_dir: file_type.is_dir(),
                size,
                file: None,
            });
        }
    }
    tracing::debug!(count = readers.len(), "Collected files to send");
    Ok(readers)
}
