//! Deflate-then-base64 envelope for everything the transfer protocol puts
//! on the wire.

use std::io::{Read, Write};

use base64::Engine as _;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use trzterm_common::TransferError;

/// Compress `payload` and encode it as standard base64.
pub fn encode(payload: &[u8]) -> Result<String, TransferError> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(payload.len() / 2 + 16),
        Compression::default(),
    );
    encoder
        .write_all(payload)
        .map_err(|e| TransferError::Protocol(format!("compress failed: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| TransferError::Protocol(format!("compress failed: {e}")))?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

pub fn encode_str(text: &str) -> Result<String, TransferError> {
    encode(text.as_bytes())
}

/// Reverse of [`encode`]. Surrounding whitespace is ignored.
pub fn decode(text: &str) -> Result<Vec<u8>, TransferError> {
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(text.trim())
        .map_err(|e| TransferError::Protocol(format!("invalid base64: {e}")))?;
    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| TransferError::Protocol(format!("invalid deflate stream: {e}")))?;
    Ok(out)
}

pub fn decode_string(text: &str) -> Result<String, TransferError> {
    String::from_utf8(decode(text)?)
        .map_err(|e| TransferError::Protocol(format!("invalid utf-8 payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_binary() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let encoded = encode(&data).unwrap();
        assert_eq!(decode(&encoded).unwrap(), data);
    }

    #[test]
    fn round_trip_empty() {
        let encoded = encode(&[]).unwrap();
        assert!(!encoded.is_empty());
        assert!(decode(&encoded).unwrap().is_empty());
    }

    #[test]
    fn encoded_text_is_line_safe() {
        let encoded = encode_str("line one\nline two\r\n#DATA:").unwrap();
        assert!(!encoded.contains('\n'));
        assert!(!encoded.contains('#'));
        assert_eq!(decode_string(&encoded).unwrap(), "line one\nline two\r\n#DATA:");
    }

    #[test]
    fn repetitive_input_compresses() {
        let data = vec![b'a'; 64 * 1024];
        let encoded = encode(&data).unwrap();
        assert!(encoded.len() < 1024);
    }

    #[test]
    fn malformed_base64_is_protocol_error() {
        let err = decode("not*base64!").unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_)));
    }

    #[test]
    fn corrupt_deflate_is_protocol_error() {
        let plain = base64::engine::general_purpose::STANDARD.encode(b"definitely not zlib");
        let err = decode(&plain).unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_)));
    }

    #[test]
    fn trailing_newline_is_ignored() {
        let encoded = encode(b"abc").unwrap();
        assert_eq!(decode(&format!("{encoded}\r\n")).unwrap(), b"abc");
    }
}
