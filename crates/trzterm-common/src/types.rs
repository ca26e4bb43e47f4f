use std::borrow::Cow;

/// One chunk of terminal output, either already-decoded text or raw bytes.
///
/// Transport layers convert at the boundary; everything past it works on
/// this tagged form only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Text(text) => text.as_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Payload::Text(text) => text.into_bytes(),
            Payload::Bytes(bytes) => bytes,
        }
    }

    /// Text view; invalid UTF-8 in a byte payload is replaced.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Payload::Text(text) => Cow::Borrowed(text),
            Payload::Bytes(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_bytes_share_byte_view() {
        let text = Payload::from("hello");
        let bytes = Payload::from(b"hello".to_vec());
        assert_eq!(text.as_bytes(), bytes.as_bytes());
        assert_eq!(text.len(), 5);
        assert!(!bytes.is_empty());
    }

    #[test]
    fn lossy_text_view_of_bytes() {
        let payload = Payload::Bytes(vec![b'o', b'k', 0xff]);
        assert_eq!(payload.to_text(), "ok\u{fffd}");
    }

    #[test]
    fn into_bytes_consumes() {
        assert_eq!(Payload::from("ab").into_bytes(), b"ab".to_vec());
        assert!(Payload::Bytes(Vec::new()).is_empty());
    }
}
