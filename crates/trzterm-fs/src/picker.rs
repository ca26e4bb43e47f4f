use std::path::PathBuf;

use async_trait::async_trait;
use trzterm_common::TransferError;
use trzterm_transfer::{FilePicker, FileReader};

use crate::reader::collect_send_files;

/// Picker driven by configuration rather than a dialog.
#[derive(Debug, Clone, Default)]
pub struct LocalPicker {
    send_paths: Vec<PathBuf>,
    download_dir: Option<PathBuf>,
}

impl LocalPicker {
    pub fn new(send_paths: Vec<PathBuf>, download_dir: Option<PathBuf>) -> Self {
        Self {
            send_paths,
            download_dir,
        }
    }
}

#[async_trait]
impl FilePicker for LocalPicker {
    async fn choose_send_files(
        &self,
        directory: bool,
    ) -> Result<Option<Vec<Box<dyn FileReader>>>, TransferError> {
        if self.send_paths.is_empty() {
            tracing::info!("Remote asked for files but none are configured");
            return Ok(None);
        }
        let paths = self.send_paths.clone();
        let readers = tokio::task::spawn_blocking(move || collect_send_files(&paths, directory))
            .await
            .map_err(|e| TransferError::File(format!("file scan failed: {e}")))??;
        Ok(Some(
            readers
                .into_iter()
                .map(|r| Box::new(r) as Box<dyn FileReader>)
                .collect(),
        ))
    }

    async fn choose_save_dir(&self) -> Result<Option<PathBuf>, TransferError> {
        Ok(self.download_dir.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn nothing_configured_means_no_selection() {
        let picker = LocalPicker::default();
        assert!(picker.choose_send_files(true).await.unwrap().is_none());
        assert!(picker.choose_save_dir().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn configured_paths_are_expanded() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();

        let picker = LocalPicker::new(vec![file], Some(dir.path().to_path_buf()));
        let files = picker.choose_send_files(false).await.unwrap().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].rel_path(), ["a.txt"]);
        assert_eq!(
            picker.choose_save_dir().await.unwrap().as_deref(),
            Some(dir.path())
        );
    }
}
