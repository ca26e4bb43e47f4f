//! In-memory file providers for exercising sessions without touching the
//! disk. Built for this crate's tests and, behind the `testing` feature, for
//! downstream crates' tests.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use trzterm_common::TransferError;

use crate::files::{FilePicker, FileReader, FileWriter, SaveFileOpener, MAX_NAME_SUFFIX};

/// A readable entry backed by a byte buffer.
#[derive(Debug)]
pub struct MemoryFile {
    path_id: u32,
    rel_path: Vec<String>,
    is_dir: bool,
    data: Vec<u8>,
    pos: usize,
    closed: Arc<AtomicBool>,
}

impl MemoryFile {
    pub fn file(path_id: u32, rel_path: &[&str], data: &[u8]) -> Self {
        Self {
            path_id,
            rel_path: rel_path.iter().map(|s| s.to_string()).collect(),
            is_dir: false,
            data: data.to_vec(),
            pos: 0,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dir(path_id: u32, rel_path: &[&str]) -> Self {
        Self {
            is_dir: true,
            ..Self::file(path_id, rel_path, &[])
        }
    }

    /// Flag that flips once the session closes this entry.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

#[async_trait]
impl FileReader for MemoryFile {
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
        self.data.len() as u64
    }

    async fn read_chunk(&mut self, max_len: usize) -> Result<Vec<u8>, TransferError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransferError::File("read after close".into()));
        }
        let end = (self.pos + max_len).min(self.data.len());
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(chunk)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// What a [`MemorySaver`] holds for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub is_dir: bool,
    pub data: Vec<u8>,
    pub complete: bool,
}

type Store = Arc<Mutex<BTreeMap<String, MemoryEntry>>>;
type Closed = Arc<Mutex<Vec<String>>>;

fn lock(store: &Store) -> MutexGuard<'_, BTreeMap<String, MemoryEntry>> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn entry_key(save_dir: &Path, rel_path: &[String]) -> String {
    format!("{}/{}", save_dir.display(), rel_path.join("/"))
}

/// Download target keeping every saved entry in a shared map keyed by
/// `<save_dir>/<rel/path>`.
#[derive(Debug, Clone, Default)]
pub struct MemorySaver {
    store: Store,
    closed: Closed,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend `name` already exists in `save_dir`.
    pub fn preload(&self, save_dir: &Path, name: &str, data: &[u8]) {
        lock(&self.store).insert(
            entry_key(save_dir, &[name.to_string()]),
            MemoryEntry {
                is_dir: false,
                data: data.to_vec(),
                complete: true,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<MemoryEntry> {
        lock(&self.store).get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.store).keys().cloned().collect()
    }

    /// Whether the writer opened for `key` has been closed, even if the
    /// entry itself was deleted.
    pub fn is_closed(&self, key: &str) -> bool {
        self.closed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|closed| closed == key)
    }

    fn top_level_exists(&self, save_dir: &Path, name: &str) -> bool {
        let key = entry_key(save_dir, &[name.to_string()]);
        let nested = format!("{key}/");
        lock(&self.store)
            .keys()
            .any(|existing| *existing == key || existing.starts_with(&nested))
    }
}

#[async_trait]
impl SaveFileOpener for MemorySaver {
    async fn resolve_top_name(
        &self,
        save_dir: &Path,
        name: &str,
        overwrite: bool,
    ) -> Result<String, TransferError> {
        if overwrite || !self.top_level_exists(save_dir, name) {
            return Ok(name.to_string());
        }
        (0..MAX_NAME_SUFFIX)
            .map(|n| format!("{name}.{n}"))
            .find(|candidate| !self.top_level_exists(save_dir, candidate))
            .ok_or_else(|| TransferError::File(format!("{name}: too many duplicate names")))
    }

    async fn open_save_file(
        &self,
        save_dir: &Path,
        rel_path: &[String],
        is_dir: bool,
        _overwrite: bool,
    ) -> Result<Box<dyn FileWriter>, TransferError> {
        let key = entry_key(save_dir, rel_path);
        let local_name = rel_path.first().cloned().unwrap_or_default();
        lock(&self.store).insert(
            key.clone(),
            MemoryEntry {
                is_dir,
                data: Vec::new(),
                complete: is_dir,
            },
        );
        Ok(Box::new(MemoryWriter {
            store: self.store.clone(),
            closed: self.closed.clone(),
            key,
            local_name,
            is_dir,
        }))
    }
}

struct MemoryWriter {
    store: Store,
    closed: Closed,
    key: String,
    local_name: String,
    is_dir: bool,
}

#[async_trait]
impl FileWriter for MemoryWriter {
    fn local_name(&self) -> &str {
        &self.local_name
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }

    async fn write_chunk(&mut self, data: &[u8]) -> Result<(), TransferError> {
        let mut store = lock(&self.store);
        let entry = store
            .get_mut(&self.key)
            .ok_or_else(|| TransferError::File(format!("{}: entry vanished", self.key)))?;
        entry.data.extend_from_slice(data);
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), TransferError> {
        if let Some(entry) = lock(&self.store).get_mut(&self.key) {
            entry.complete = true;
        }
        Ok(())
    }

    async fn delete(&mut self) -> Result<(), TransferError> {
        lock(&self.store).remove(&self.key);
        Ok(())
    }

    async fn close(&mut self) {
        self.closed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(self.key.clone());
    }
}

/// Picker returning a fixed selection once.
#[derive(Default)]
pub struct MemoryPicker {
    send_files: Mutex<Option<Vec<MemoryFile>>>,
    save_dir: Option<PathBuf>,
}

impl MemoryPicker {
    pub fn new(send_files: Option<Vec<MemoryFile>>, save_dir: Option<PathBuf>) -> Self {
        Self {
            send_files: Mutex::new(send_files),
            save_dir,
        }
    }
}

#[async_trait]
impl FilePicker for MemoryPicker {
    async fn choose_send_files(
        &self,
        _directory: bool,
    ) -> Result<Option<Vec<Box<dyn FileReader>>>, TransferError> {
        let files = self
            .send_files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        Ok(files.map(|files| {
            files
                .into_iter()
                .map(|f| Box::new(f) as Box<dyn FileReader>)
                .collect()
        }))
    }

    async fn choose_save_dir(&self) -> Result<Option<PathBuf>, TransferError> {
        Ok(self.save_dir.clone())
    }
}
