//! Detection of the transfer handshake marker inside terminal output.
//!
//! The remote tool prints `::TRZSZ:TRANSFER:<mode>:<version>[:<id>]` when it
//! wants to start a transfer. Output chunks are scanned independently; a
//! marker split across two chunks is never assembled.

use std::sync::LazyLock;

use regex::Regex;
use trzterm_common::Payload;

pub const MAGIC_KEY_PREFIX: &str = "::TRZSZ:TRANSFER:";

/// Binary chunks shorter than this cannot hold a complete marker.
const MIN_CHUNK_LEN: usize = 26;

/// Shortest marker; the scan resumes this far past a hit.
const MIN_MARKER_LEN: usize = 25;

const fn prefix_word(offset: usize) -> u64 {
    let b = MAGIC_KEY_PREFIX.as_bytes();
    u64::from_le_bytes([
        b[offset],
        b[offset + 1],
        b[offset + 2],
        b[offset + 3],
        b[offset + 4],
        b[offset + 5],
        b[offset + 6],
        b[offset + 7],
    ])
}

/// First 16 prefix bytes as two little-endian words.
const PREFIX_WORDS: [u64; 2] = [prefix_word(0), prefix_word(8)];

static MAGIC_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^::TRZSZ:TRANSFER:([SRD]):(\d+\.\d+\.\d+)(:\d+)?").unwrap()
});

/// Which way the files move, named from the remote tool's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Remote sends (`tsz`); the local side downloads.
    Source,
    /// Remote receives files (`trz`); the local side uploads.
    Receive,
    /// Remote receives directories (`trz -d`); the local side uploads.
    Directory,
}

impl TransferMode {
    fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "S" => Some(TransferMode::Source),
            "R" => Some(TransferMode::Receive),
            "D" => Some(TransferMode::Directory),
            _ => None,
        }
    }

    pub fn is_upload(&self) -> bool {
        matches!(self, TransferMode::Receive | TransferMode::Directory)
    }
}

/// A parsed handshake marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicKey {
    pub mode: TransferMode,
    pub version: String,
    /// Empty when the marker carries no id.
    pub unique_id: String,
    pub remote_is_windows: bool,
}

/// Return the text from the right-most marker prefix to the end of the chunk.
pub fn find_magic_key(payload: &Payload) -> Option<String> {
    match payload {
        Payload::Text(text) => text
            .rfind(MAGIC_KEY_PREFIX)
            .map(|idx| text[idx..].to_string()),
        Payload::Bytes(bytes) => {
            find_in_bytes(bytes).map(|idx| String::from_utf8_lossy(&bytes[idx..]).into_owned())
        }
    }
}

fn word_at(buf: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(word)
}

fn find_in_bytes(buf: &[u8]) -> Option<usize> {
    if buf.len() < MIN_CHUNK_LEN {
        return None;
    }

    let mut found = None;
    let mut start = 0;
    while let Some(pos) = buf[start..].iter().position(|&b| b == b':') {
        let offset = start + pos;
        if offset + 16 > buf.len() {
            break;
        }
        if word_at(buf, offset) == PREFIX_WORDS[0] && word_at(buf, offset + 8) == PREFIX_WORDS[1] {
            found = Some(offset);
            start = offset + MIN_MARKER_LEN;
        } else {
            start = offset + 1;
        }
        if start >= buf.len() {
            break;
        }
    }
    found
}

/// Match a candidate against the marker grammar.
pub fn parse_magic_key(candidate: &str) -> Option<MagicKey> {
    let caps = MAGIC_KEY_RE.captures(candidate)?;
    let mode = TransferMode::from_letter(caps.get(1)?.as_str())?;
    let version = caps.get(2)?.as_str().to_string();
    let unique_id = caps
        .get(3)
        .map(|m| m.as_str().trim_start_matches(':').to_string())
        .unwrap_or_default();
    let remote_is_windows = is_windows_id(&unique_id);
    Some(MagicKey {
        mode,
        version,
        unique_id,
        remote_is_windows,
    })
}

/// Scan a chunk and parse the last marker in it, if any.
pub fn detect(payload: &Payload) -> Option<MagicKey> {
    parse_magic_key(&find_magic_key(payload)?)
}

fn is_windows_id(unique_id: &str) -> bool {
    unique_id == "1" || (unique_id.len() == 14 && unique_id.ends_with("10"))
}
