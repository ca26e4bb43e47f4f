use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use trzterm_common::{Payload, TransferError};

use super::*;
use crate::codec;
use crate::magic::parse_magic_key;
use crate::memory::{MemoryFile, MemoryPicker, MemorySaver};
use crate::progress::{ProgressFactory, ProgressSink};

// =========================================================================
// Scripted remote
// =========================================================================

struct Remote {
    lines: mpsc::UnboundedReceiver<String>,
    output: mpsc::UnboundedSender<Payload>,
    cancel: CancellationToken,
    session: JoinHandle<SessionReport>,
}

impl Remote {
    async fn expect(&mut self, typ: &str) -> String {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.recv())
            .await
            .expect("session went silent")
            .expect("session closed its writer");
        let line = line.strip_suffix('\n').expect("line without newline");
        let (got, body) = line
            .strip_prefix('#')
            .and_then(|l| l.split_once(':'))
            .expect("not a protocol line");
        assert_eq!(got, typ, "unexpected line {line:?}");
        body.to_string()
    }

    async fn expect_string(&mut self, typ: &str) -> String {
        codec::decode_string(&self.expect(typ).await).unwrap()
    }

    async fn expect_binary(&mut self, typ: &str) -> Vec<u8> {
        codec::decode(&self.expect(typ).await).unwrap()
    }

    fn send(&self, typ: &str, body: &str) {
        self.output
            .send(Payload::from(format!("#{typ}:{body}\r\n")))
            .unwrap();
    }

    fn send_string(&self, typ: &str, text: &str) {
        self.send(typ, &codec::encode_str(text).unwrap());
    }

    fn send_binary(&self, typ: &str, data: &[u8]) {
        self.send(typ, &codec::encode(data).unwrap());
    }

    async fn handshake(&mut self, config: &str) -> Action {
        let action: Action = serde_json::from_str(&self.expect_string("ACT").await).unwrap();
        assert!(action.confirm);
        self.send_string("CFG", config);
        action
    }

    async fn finish(self) -> SessionReport {
        tokio::time::timeout(Duration::from_secs(5), self.session)
            .await
            .expect("session did not finish")
            .unwrap()
    }
}

fn start(
    marker: &str,
    picker: MemoryPicker,
    saver: MemorySaver,
    progress: Option<Arc<dyn ProgressFactory>>,
    prearmed: Option<Vec<MemoryFile>>,
) -> Remote {
    let (line_tx, lines) = mpsc::unbounded_channel::<String>();
    let (output, inbound) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let session = TransferSession::new(
        parse_magic_key(marker).unwrap(),
        SessionChannel {
            writer: Box::new(line_tx),
            inbound,
            cancel: cancel.clone(),
        },
        TransferProviders {
            picker: Arc::new(picker),
            opener: Arc::new(saver),
            progress,
        },
        SessionOptions::default(),
        prearmed.map(|files| {
            files
                .into_iter()
                .map(|f| Box::new(f) as Box<dyn FileReader>)
                .collect()
        }),
    );
    Remote {
        lines,
        output,
        cancel,
        session: tokio::spawn(session.run()),
    }
}

fn header(path_id: u32, path: &[&str], is_dir: bool) -> String {
    EntryHeader {
        path_id,
        path_name: path.iter().map(|s| s.to_string()).collect(),
        is_dir,
    }
    .to_json()
    .unwrap()
}

#[derive(Default)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

struct RecordingSink(Arc<Mutex<Vec<String>>>);

impl ProgressSink for RecordingSink {
    fn on_count(&mut self, count: usize) {
        self.0.lock().unwrap().push(format!("count {count}"));
    }
    fn on_name(&mut self, name: &str) {
        self.0.lock().unwrap().push(format!("name {name}"));
    }
    fn on_size(&mut self, size: u64) {
        self.0.lock().unwrap().push(format!("size {size}"));
    }
    fn on_step(&mut self, step: u64) {
        self.0.lock().unwrap().push(format!("step {step}"));
    }
    fn on_done(&mut self) {
        self.0.lock().unwrap().push("done".into());
    }
    fn on_width_hint(&mut self, columns: u32) {
        self.0.lock().unwrap().push(format!("width {columns}"));
    }
}

impl ProgressFactory for Recorder {
    fn create(&self) -> Box<dyn ProgressSink> {
        Box::new(RecordingSink(self.events.clone()))
    }
}

const DOWNLOAD: &str = "::TRZSZ:TRANSFER:S:1.2.3:12345678";
const UPLOAD: &str = "::TRZSZ:TRANSFER:R:1.2.3:12345678";
const UPLOAD_DIR: &str = "::TRZSZ:TRANSFER:D:1.2.3:12345678";

// =========================================================================
// Download
// =========================================================================

#[tokio::test]
async fn download_saves_files_and_directories() {
    let saver = MemorySaver::new();
    let picker = MemoryPicker::new(None, Some(PathBuf::from("/dl")));
    let mut remote = start(DOWNLOAD, picker, saver.clone(), None, None);

    remote
        .handshake(r#"{"directory":true,"overwrite":false,"timeout":5}"#)
        .await;

    remote.send("NUM", "3");
    assert_eq!(remote.expect("SUCC").await, "3");

    remote.send_string("NAME", &header(0, &["a.txt"], false));
    assert_eq!(remote.expect_string("SUCC").await, "a.txt");
    remote.send("SIZE", "5");
    assert_eq!(remote.expect("SUCC").await, "5");
    remote.send_binary("DATA", b"hello");
    assert_eq!(remote.expect("SUCC").await, "5");
    let digest = md5::compute(b"hello").0;
    remote.send_binary("MD5", &digest);
    assert_eq!(remote.expect_binary("SUCC").await, digest);

    remote.send_string("NAME", &header(1, &["docs"], true));
    assert_eq!(remote.expect_string("SUCC").await, "docs");
    remote.send_string("NAME", &header(1, &["docs", "x.md"], false));
    assert_eq!(remote.expect_string("SUCC").await, "docs");
    remote.send("SIZE", "0");
    assert_eq!(remote.expect("SUCC").await, "0");
    let empty = md5::compute(b"").0;
    remote.send_binary("MD5", &empty);
    assert_eq!(remote.expect_binary("SUCC").await, empty);

    let exit = remote.expect_string("EXIT").await;
    assert_eq!(exit, "Saved 2 files/directories to /dl\r\n- a.txt\r\n- docs");

    let report = remote.finish().await;
    assert_eq!(report.state, SessionState::Done);
    let summary = report.result.unwrap();
    assert_eq!(summary.names, vec!["a.txt", "docs"]);
    assert_eq!(summary.destination, Some(PathBuf::from("/dl")));

    let saved = saver.get("/dl/a.txt").unwrap();
    assert_eq!(saved.data, b"hello");
    assert!(saved.complete);
    assert!(saver.get("/dl/docs").unwrap().is_dir);
    assert!(saver.get("/dl/docs/x.md").unwrap().complete);
}

#[tokio::test]
async fn download_renames_existing_top_level_name() {
    let saver = MemorySaver::new();
    saver.preload(&PathBuf::from("/dl"), "a.txt", b"old");
    let picker = MemoryPicker::new(None, Some(PathBuf::from("/dl")));
    let mut remote = start(DOWNLOAD, picker, saver.clone(), None, None);

    remote.handshake(r#"{"overwrite":false}"#).await;
    remote.send("NUM", "1");
    remote.expect("SUCC").await;
    remote.send_string("NAME", "a.txt");
    assert_eq!(remote.expect_string("SUCC").await, "a.txt.0");
    remote.send("SIZE", "3");
    remote.expect("SUCC").await;
    remote.send_binary("DATA", b"new");
    remote.expect("SUCC").await;
    remote.send_binary("MD5", &md5::compute(b"new").0);
    remote.expect("SUCC").await;
    remote.expect("EXIT").await;

    assert_eq!(remote.finish().await.state, SessionState::Done);
    assert_eq!(saver.get("/dl/a.txt").unwrap().data, b"old");
    assert_eq!(saver.get("/dl/a.txt.0").unwrap().data, b"new");
}

#[tokio::test]
async fn download_without_save_dir_declines() {
    let picker = MemoryPicker::new(None, None);
    let mut remote = start(DOWNLOAD, picker, MemorySaver::new(), None, None);

    let action: Action = serde_json::from_str(&remote.expect_string("ACT").await).unwrap();
    assert!(!action.confirm);

    let report = remote.finish().await;
    assert_eq!(report.state, SessionState::Done);
    assert_eq!(report.result, Err(TransferError::NoSelection));
}

#[tokio::test]
async fn cancel_mid_download_deletes_partial_file() {
    let saver = MemorySaver::new();
    let picker = MemoryPicker::new(None, Some(PathBuf::from("/dl")));
    let mut remote = start(DOWNLOAD, picker, saver.clone(), None, None);

    remote.handshake(r#"{}"#).await;
    remote.send("NUM", "1");
    remote.expect("SUCC").await;
    remote.send_string("NAME", "big.bin");
    remote.expect_string("SUCC").await;
    remote.send("SIZE", "10");
    remote.expect("SUCC").await;
    remote.send_binary("DATA", b"0123");
    assert_eq!(remote.expect("SUCC").await, "4");
    assert!(saver.get("/dl/big.bin").is_some());

    remote.cancel.cancel();
    assert_eq!(remote.expect_string("fail").await, "Stopped");

    let report = remote.finish().await;
    assert_eq!(report.state, SessionState::Cancelled);
    assert_eq!(report.result, Err(TransferError::Cancelled));
    assert!(saver.get("/dl/big.bin").is_none());
    assert!(saver.is_closed("/dl/big.bin"));
}

#[tokio::test]
async fn traversal_in_name_is_protocol_error() {
    let saver = MemorySaver::new();
    let picker = MemoryPicker::new(None, Some(PathBuf::from("/dl")));
    let mut remote = start(DOWNLOAD, picker, saver.clone(), None, None);

    remote.handshake(r#"{"directory":true}"#).await;
    remote.send("NUM", "1");
    remote.expect("SUCC").await;
    remote.send_string("NAME", &header(0, &["..", "etc"], false));
    remote.expect("FAIL").await;

    let report = remote.finish().await;
    assert_eq!(report.state, SessionState::Failed);
    assert!(matches!(report.result, Err(TransferError::Protocol(_))));
    assert!(saver.keys().is_empty());
}

#[tokio::test]
async fn md5_mismatch_fails_download() {
    let saver = MemorySaver::new();
    let picker = MemoryPicker::new(None, Some(PathBuf::from("/dl")));
    let mut remote = start(DOWNLOAD, picker, saver.clone(), None, None);

    remote.handshake(r#"{}"#).await;
    remote.send("NUM", "1");
    remote.expect("SUCC").await;
    remote.send_string("NAME", "a.txt");
    remote.expect_string("SUCC").await;
    remote.send("SIZE", "2");
    remote.expect("SUCC").await;
    remote.send_binary("DATA", b"hi");
    remote.expect("SUCC").await;
    remote.send_binary("MD5", &md5::compute(b"ho").0);
    remote.expect("FAIL").await;

    let report = remote.finish().await;
    assert_eq!(report.state, SessionState::Failed);
    assert!(saver.get("/dl/a.txt").is_none());
}

// =========================================================================
// Upload
// =========================================================================

#[tokio::test]
async fn upload_sends_chunks_with_progress() {
    let file = MemoryFile::file(0, &["a.txt"], b"hello world");
    let closed = file.closed_flag();
    let recorder = Recorder::default();
    let events = recorder.events.clone();
    let mut remote = start(
        UPLOAD,
        MemoryPicker::new(Some(vec![file]), None),
        MemorySaver::new(),
        Some(Arc::new(recorder)),
        None,
    );

    remote
        .handshake(r#"{"max_buf_size":4,"tmux_pane_width":80}"#)
        .await;
    assert_eq!(remote.expect("NUM").await, "1");
    remote.send("SUCC", "1");
    assert_eq!(remote.expect_string("NAME").await, "a.txt");
    remote.send_string("SUCC", "a.txt");
    assert_eq!(remote.expect("SIZE").await, "11");
    remote.send("SUCC", "11");

    let mut received = Vec::new();
    for expected_len in [4, 4, 3] {
        let chunk = remote.expect_binary("DATA").await;
        assert_eq!(chunk.len(), expected_len);
        received.extend_from_slice(&chunk);
        remote.send("SUCC", &chunk.len().to_string());
    }
    assert_eq!(received, b"hello world");

    let digest = remote.expect("MD5").await;
    assert_eq!(
        codec::decode(&digest).unwrap(),
        md5::compute(b"hello world").0
    );
    remote.send("SUCC", &digest);
    assert_eq!(
        remote.expect_string("EXIT").await,
        "Sent 1 file/directory\r\n- a.txt"
    );

    let report = remote.finish().await;
    assert_eq!(report.state, SessionState::Done);
    assert!(closed.load(Ordering::SeqCst));
    assert_eq!(
        *events.lock().unwrap(),
        vec![
            "width 80", "count 1", "name a.txt", "size 11", "step 4", "step 8", "step 11",
            "done",
        ]
    );
}

#[tokio::test]
async fn quiet_remote_gets_no_progress() {
    let recorder = Recorder::default();
    let events = recorder.events.clone();
    let mut remote = start(
        UPLOAD,
        MemoryPicker::new(None, None),
        MemorySaver::new(),
        Some(Arc::new(recorder)),
        Some(vec![MemoryFile::file(0, &["e"], b"")]),
    );
    remote.handshake(r#"{"quiet":true}"#).await;
    remote.expect("NUM").await;
    remote.send("SUCC", "1");
    remote.expect("NAME").await;
    remote.send_string("SUCC", "e");
    remote.expect("SIZE").await;
    remote.send("SUCC", "0");
    let digest = remote.expect("MD5").await;
    remote.send("SUCC", &digest);
    remote.expect("EXIT").await;

    assert_eq!(remote.finish().await.state, SessionState::Done);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn directory_upload_sends_json_headers() {
    let files = vec![
        MemoryFile::dir(0, &["docs"]),
        MemoryFile::file(0, &["docs", "x.md"], b"# x"),
    ];
    let mut remote = start(
        UPLOAD_DIR,
        MemoryPicker::new(None, None),
        MemorySaver::new(),
        None,
        Some(files),
    );

    remote.handshake(r#"{"directory":true}"#).await;
    assert_eq!(remote.expect("NUM").await, "2");
    remote.send("SUCC", "2");

    let first = EntryHeader::from_json(&remote.expect_string("NAME").await).unwrap();
    assert!(first.is_dir);
    assert_eq!(first.path_name, vec!["docs"]);
    remote.send_string("SUCC", "docs.0");

    let second = EntryHeader::from_json(&remote.expect_string("NAME").await).unwrap();
    assert_eq!(second.path_id, 0);
    assert_eq!(second.path_name, vec!["docs", "x.md"]);
    remote.send_string("SUCC", "docs.0");
    remote.expect("SIZE").await;
    remote.send("SUCC", "3");
    let chunk = remote.expect("DATA").await;
    assert_eq!(codec::decode(&chunk).unwrap(), b"# x");
    remote.send("SUCC", "3");
    let digest = remote.expect("MD5").await;
    remote.send("SUCC", &digest);

    assert_eq!(
        remote.expect_string("EXIT").await,
        "Sent 1 file/directory\r\n- docs.0"
    );
    let report = remote.finish().await;
    assert_eq!(report.result.unwrap().names, vec!["docs.0"]);
}

#[tokio::test]
async fn duplicate_names_fail_before_any_data() {
    let files = vec![
        MemoryFile::file(1, &["a", "b.txt"], b"one"),
        MemoryFile::file(2, &["a", "b.txt"], b"two"),
    ];
    let mut remote = start(
        UPLOAD_DIR,
        MemoryPicker::new(None, None),
        MemorySaver::new(),
        None,
        Some(files),
    );

    remote.handshake(r#"{"directory":true,"overwrite":false}"#).await;
    assert_eq!(
        remote.expect_string("fail").await,
        "duplicate name: a/b.txt"
    );

    let report = remote.finish().await;
    assert_eq!(report.state, SessionState::Failed);
    assert_eq!(
        report.result,
        Err(TransferError::DuplicateName("a/b.txt".into()))
    );
}

#[tokio::test]
async fn duplicate_names_allowed_with_overwrite() {
    let files = vec![
        MemoryFile::file(1, &["a", "b.txt"], b"one"),
        MemoryFile::file(2, &["a", "b.txt"], b"two"),
    ];
    let mut remote = start(
        UPLOAD_DIR,
        MemoryPicker::new(None, None),
        MemorySaver::new(),
        None,
        Some(files),
    );

    remote.handshake(r#"{"directory":true,"overwrite":true}"#).await;
    assert_eq!(remote.expect("NUM").await, "2");

    remote.cancel.cancel();
    assert_eq!(remote.expect_string("fail").await, "Stopped");
    assert_eq!(remote.finish().await.state, SessionState::Cancelled);
}

#[tokio::test]
async fn cancel_mid_upload_closes_every_reader() {
    let big = MemoryFile::file(0, &["big.bin"], &[0x5a; 100_000]);
    let later = MemoryFile::file(1, &["later.txt"], b"never sent");
    let flags = [big.closed_flag(), later.closed_flag()];
    let mut remote = start(
        UPLOAD,
        MemoryPicker::new(None, None),
        MemorySaver::new(),
        None,
        Some(vec![big, later]),
    );

    remote.handshake(r#"{"max_buf_size":1024}"#).await;
    assert_eq!(remote.expect("NUM").await, "2");
    remote.send("SUCC", "2");
    assert_eq!(remote.expect_string("NAME").await, "big.bin");
    remote.send_string("SUCC", "big.bin");
    assert_eq!(remote.expect("SIZE").await, "100000");
    remote.send("SUCC", "100000");
    let chunk = remote.expect_binary("DATA").await;
    assert!(!chunk.is_empty() && chunk.len() <= 1024);
    assert!(flags.iter().all(|flag| !flag.load(Ordering::SeqCst)));

    remote.cancel.cancel();
    assert_eq!(remote.expect_string("fail").await, "Stopped");

    let report = remote.finish().await;
    assert_eq!(report.state, SessionState::Cancelled);
    assert_eq!(report.result, Err(TransferError::Cancelled));
    assert!(flags.iter().all(|flag| flag.load(Ordering::SeqCst)));
}

#[tokio::test]
async fn empty_selection_declines_upload() {
    let mut remote = start(
        UPLOAD,
        MemoryPicker::new(Some(Vec::new()), None),
        MemorySaver::new(),
        None,
        None,
    );
    let action: Action = serde_json::from_str(&remote.expect_string("ACT").await).unwrap();
    assert!(!action.confirm);
    assert_eq!(
        remote.finish().await.result,
        Err(TransferError::NoSelection)
    );
}

#[tokio::test]
async fn remote_failure_is_not_echoed_back() {
    let file = MemoryFile::file(0, &["a.txt"], b"x");
    let closed = file.closed_flag();
    let mut remote = start(
        UPLOAD,
        MemoryPicker::new(None, None),
        MemorySaver::new(),
        None,
        Some(vec![file]),
    );

    remote.expect("ACT").await;
    remote.send_string("FAIL", "permission denied");

    let Remote {
        mut lines, session, ..
    } = remote;
    let report = session.await.unwrap();
    assert_eq!(report.state, SessionState::Failed);
    assert_eq!(
        report.result,
        Err(TransferError::RemoteFailure("permission denied".into()))
    );
    assert!(closed.load(Ordering::SeqCst));
    assert!(lines.recv().await.is_none());
}

#[tokio::test]
async fn bad_config_is_protocol_error() {
    let mut remote = start(
        UPLOAD,
        MemoryPicker::new(None, None),
        MemorySaver::new(),
        None,
        Some(vec![MemoryFile::file(0, &["a"], b"")]),
    );
    remote.expect("ACT").await;
    remote.send_string("CFG", "not json");
    remote.expect("FAIL").await;

    let report = remote.finish().await;
    assert_eq!(report.state, SessionState::Failed);
    assert!(matches!(report.result, Err(TransferError::Protocol(_))));
}

#[tokio::test]
async fn windows_remote_gets_windows_newline() {
    let mut remote = start(
        "::TRZSZ:TRANSFER:R:1.2.3:1",
        MemoryPicker::new(None, None),
        MemorySaver::new(),
        None,
        Some(Vec::new()),
    );
    let line = tokio::time::timeout(Duration::from_secs(5), remote.lines.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(line.starts_with("#ACT:"));
    assert!(line.ends_with("!\n"));
    let body = line.trim_start_matches("#ACT:").trim_end_matches("!\n");
    let action: Action = serde_json::from_str(&codec::decode_string(body).unwrap()).unwrap();
    assert_eq!(action.newline.as_deref(), Some("!\n"));
}
