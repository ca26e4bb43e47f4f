//! Wire grammar of the terminal channel.
//!
//! Client to server: `1;<text>` keystrokes, `2;<rows>;<cols>` resizes and
//! binary input behind a two-byte reserved header. The server additionally
//! accepts `0;<base64>` input. Server to client: binary frames or
//! `0;<base64>` carry raw output, `1;<text>` carries literal text.

use base64::Engine as _;
use trzterm_common::{FrameError, Payload};

/// Reserved prefix of every binary input frame.
pub const BINARY_INPUT_HEADER: [u8; 2] = [0x00, 0x00];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// A decoded client frame, as the server sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Input(Vec<u8>),
    Text(String),
    Resize { rows: u16, cols: u16 },
}

fn split_tag(text: &str) -> Result<(&str, &str), FrameError> {
    text.split_once(';')
        .ok_or_else(|| FrameError::Malformed(format!("missing tag separator: {text:?}")))
}

fn decode_base64(body: &str) -> Result<Vec<u8>, FrameError> {
    base64::engine::general_purpose::STANDARD
        .decode(body)
        .map_err(|e| FrameError::Malformed(format!("invalid base64: {e}")))
}

// =============================================================================
// Client side
// =============================================================================

pub fn keystroke_frame(text: &str) -> Frame {
    Frame::Text(format!("1;{text}"))
}

pub fn resize_frame(rows: u16, cols: u16) -> Frame {
    Frame::Text(format!("2;{rows};{cols}"))
}

pub fn binary_input_frame(data: &[u8]) -> Frame {
    let mut buf = Vec::with_capacity(BINARY_INPUT_HEADER.len() + data.len());
    buf.extend_from_slice(&BINARY_INPUT_HEADER);
    buf.extend_from_slice(data);
    Frame::Binary(buf)
}

/// Turn a server frame into terminal output.
pub fn decode_output_frame(frame: Frame) -> Result<Payload, FrameError> {
    match frame {
        Frame::Binary(bytes) => Ok(Payload::Bytes(bytes)),
        Frame::Text(text) => {
            let (tag, body) = split_tag(&text)?;
            match tag {
                "0" => Ok(Payload::Bytes(decode_base64(body)?)),
                "1" => Ok(Payload::Text(body.to_string())),
                other => Err(FrameError::UnknownTag(other.to_string())),
            }
        }
    }
}

// =============================================================================
// Server side
// =============================================================================

/// Turn a client frame into something for the PTY.
pub fn decode_input_frame(frame: Frame) -> Result<InputEvent, FrameError> {
    match frame {
        Frame::Binary(bytes) => {
            let data = bytes
                .strip_prefix(&BINARY_INPUT_HEADER[..])
                .ok_or_else(|| FrameError::Malformed("binary input without header".into()))?;
            Ok(InputEvent::Input(data.to_vec()))
        }
        Frame::Text(text) => {
            let (tag, body) = split_tag(&text)?;
            match tag {
                "0" => Ok(InputEvent::Input(decode_base64(body)?)),
                "1" => Ok(InputEvent::Text(body.to_string())),
                "2" => {
                    let (rows, cols) = body
                        .split_once(';')
                        .ok_or_else(|| FrameError::Malformed(format!("bad resize: {text:?}")))?;
                    let parse = |v: &str| {
                        v.trim()
                            .parse::<u16>()
                            .map_err(|_| FrameError::Malformed(format!("bad resize: {text:?}")))
                    };
                    Ok(InputEvent::Resize {
                        rows: parse(rows)?,
                        cols: parse(cols)?,
                    })
                }
                other => Err(FrameError::UnknownTag(other.to_string())),
            }
        }
    }
}

/// PTY output for the client, binary or base64 text.
pub fn output_frame(data: &[u8], binary: bool) -> Frame {
    if binary {
        Frame::Binary(data.to_vec())
    } else {
        Frame::Text(format!(
            "0;{}",
            base64::engine::general_purpose::STANDARD.encode(data)
        ))
    }
}

pub fn exit_frame(status: u32) -> Frame {
    Frame::Text(format!("1;Command exited with status code: {status}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frames() {
        assert_eq!(keystroke_frame("ls\r"), Frame::Text("1;ls\r".into()));
        assert_eq!(resize_frame(24, 80), Frame::Text("2;24;80".into()));
        assert_eq!(
            binary_input_frame(b"ab"),
            Frame::Binary(vec![0x00, 0x00, b'a', b'b'])
        );
    }

    #[test]
    fn output_frames_decode() {
        assert_eq!(
            decode_output_frame(Frame::Text("1;hello;world".into())).unwrap(),
            Payload::Text("hello;world".into())
        );
        assert_eq!(
            decode_output_frame(output_frame(&[0xff, 0x00, b'x'], false)).unwrap(),
            Payload::Bytes(vec![0xff, 0x00, b'x'])
        );
        assert_eq!(
            decode_output_frame(output_frame(b"raw", true)).unwrap(),
            Payload::Bytes(b"raw".to_vec())
        );
    }

    #[test]
    fn bad_output_frames() {
        assert!(matches!(
            decode_output_frame(Frame::Text("no separator".into())),
            Err(FrameError::Malformed(_))
        ));
        assert_eq!(
            decode_output_frame(Frame::Text("7;x".into())),
            Err(FrameError::UnknownTag("7".into()))
        );
        assert!(decode_output_frame(Frame::Text("0;***".into())).is_err());
    }

    #[test]
    fn input_frames_decode() {
        assert_eq!(
            decode_input_frame(keystroke_frame("pwd\r")).unwrap(),
            InputEvent::Text("pwd\r".into())
        );
        assert_eq!(
            decode_input_frame(resize_frame(40, 120)).unwrap(),
            InputEvent::Resize { rows: 40, cols: 120 }
        );
        assert_eq!(
            decode_input_frame(binary_input_frame(&[1, 2, 3])).unwrap(),
            InputEvent::Input(vec![1, 2, 3])
        );
        assert_eq!(
            decode_input_frame(Frame::Text("0;aGk=".into())).unwrap(),
            InputEvent::Input(b"hi".to_vec())
        );
    }

    #[test]
    fn bad_input_frames() {
        assert!(decode_input_frame(Frame::Binary(vec![1, 2])).is_err());
        assert!(decode_input_frame(Frame::Text("2;24".into())).is_err());
        assert!(decode_input_frame(Frame::Text("2;a;b".into())).is_err());
        assert!(decode_input_frame(Frame::Text("9;x".into())).is_err());
    }

    #[test]
    fn exit_frame_text() {
        assert_eq!(
            exit_frame(0),
            Frame::Text("1;Command exited with status code: 0".into())
        );
    }
}
