//! Writing downloads into a local directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use trzterm_common::TransferError;
use trzterm_transfer::{FileWriter, SaveFileOpener, MAX_NAME_SUFFIX};

use crate::file_error;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalSaver;

impl LocalSaver {
    pub fn new() -> Self {
        Self
    }
}

async fn exists(path: &Path) -> Result<bool, TransferError> {
    fs::try_exists(path).await.map_err(|e| file_error(path, e))
}

#[async_trait]
impl SaveFileOpener for LocalSaver {
    async fn resolve_top_name(
        &self,
        save_dir: &Path,
        name: &str,
        overwrite: bool,
    ) -> Result<String, TransferError> {
        if overwrite || !exists(&save_dir.join(name)).await? {
            return Ok(name.to_string());
        }
        for n in 0..MAX_NAME_SUFFIX {
            let candidate = format!("{name}.{n}");
            if !exists(&save_dir.join(&candidate)).await? {
                return Ok(candidate);
            }
        }
        Err(TransferError::File(format!(
            "{}: too many duplicate names",
            save_dir.join(name).display()
        )))
    }

    async fn open_save_file(
        &self,
        save_dir: &Path,
        rel_path: &[String],
        is_dir: bool,
        _overwrite: bool,
    ) -> Result<Box<dyn FileWriter>, TransferError> {
        let local_name = rel_path
            .first()
            .cloned()
            .ok_or_else(|| TransferError::File("empty path".into()))?;
        let path = rel_path
            .iter()
            .fold(save_dir.to_path_buf(), |path, segment| path.join(segment));

        let existing = match fs::metadata(&path).await {
            Ok(metadata) => Some(metadata.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(file_error(&path, e)),
        };

        let file = if is_dir {
            if existing == Some(false) {
                return Err(TransferError::File(format!(
                    "{}: exists and is not a directory",
                    path.display()
                )));
            }
            fs::create_dir_all(&path)
                .await
                .map_err(|e| file_error(&path, e))?;
            None
        } else {
            if existing == Some(true) {
                return Err(TransferError::File(format!(
                    "{}: exists and is a directory",
                    path.display()
                )));
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| file_error(parent, e))?;
            }
            Some(File::create(&path).await.map_err(|e| file_error(&path, e))?)
        };

        tracing::debug!(path = %path.display(), is_dir, "Opened save target");
        Ok(Box::new(LocalFileWriter {
            path,
            local_name,
            is_dir,
            file,
        }))
    }
}

struct LocalFileWriter {
    path: PathBuf,
    local_name: String,
    is_dir: bool,
    file: Option<File>,
}

#[async_trait]
impl FileWriter for LocalFileWriter {
    fn local_name(&self) -> &str {
        &self.local_name
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    async fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let Some(file) = self.file.as_mut() else {
            return Err(TransferError::File(format!(
                "{}: not open for writing",
                self.path.display()
            )));
        };
        file.write_all(data)
            .await
            .map_err(|e| file_error(&self.path, e))
    }

    async fn finish(&mut self) -> Result<(), TransferError> {
        if let Some(file) = self.file.as_mut() {
            file.flush().await.map_err(|e| file_error(&self.path, e))?;
        }
        Ok(())
    }

    async fn delete(&mut self) -> Result<(), TransferError> {
        if self.is_dir {
            return Ok(());
        }
        self.file = None;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(file_error(&self.path, e)),
        }
    }

    async fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush().await {
                tracing::warn!(path = %self.path.display(), error = %e, "Flush on close failed");
            }
        }
    }
}
