//! Raw RFC 5322 message split into header block and body.

use crate::header::Headers;
use crate::tree::MimeTree;

/// A raw message split at the first blank line.
#[derive(Debug, Clone)]
pub struct Message {
    /// Raw header block, ending with the CRLF of the last header line.
    header_block: Vec<u8>,
    /// Parsed headers.
    headers: Headers,
    /// Raw body bytes after the blank line.
    body: Vec<u8>,
}

impl Message {
    /// Splits a raw message into headers and body.
    ///
    /// A message without a blank line is all headers and an empty body.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let (header_block, body) = if raw.starts_with(b"\r\n") {
            (&raw[..0], &raw[2..])
        } else {
            raw.windows(4)
                .position(|w| w == b"\r\n\r\n")
                .map_or((raw, &raw[raw.len()..]), |idx| (&raw[..idx + 2], &raw[idx + 4..]))
        };

        Self {
            headers: Headers::parse_bytes(header_block),
            header_block: header_block.to_vec(),
            body: body.to_vec(),
        }
    }

    /// Gets the parsed headers.
    #[must_use]
    pub const fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Gets the raw header block.
    #[must_use]
    pub fn header_block(&self) -> &[u8] {
        &self.header_block
    }

    /// Gets the raw body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Gets the Subject header.
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.headers.get("subject")
    }

    /// Gets the Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.headers.get("message-id")
    }

    /// Parses the body into a MIME tree.
    #[must_use]
    pub fn tree(&self) -> MimeTree {
        MimeTree::parse(&self.headers, &self.body)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_message_split() {
        let raw = b"Subject: Hi\r\nMessage-ID: <a@b>\r\n\r\nBody\r\n";
        let message = Message::parse(raw);
        assert_eq!(message.header_block(), b"Subject: Hi\r\nMessage-ID: <a@b>\r\n");
        assert_eq!(message.body(), b"Body\r\n");
        assert_eq!(message.subject(), Some("Hi"));
        assert_eq!(message.message_id(), Some("<a@b>"));
        assert_eq!(message.tree().to_bytes(), b"Body\r\n");
    }

    #[test]
    fn test_message_without_body() {
        let message = Message::parse(b"Subject: only headers\r\n");
        assert!(message.body().is_empty());
        assert_eq!(message.subject(), Some("only headers"));
    }

    #[test]
    fn test_message_without_headers() {
        let message = Message::parse(b"\r\njust body");
        assert!(message.headers().is_empty());
        assert_eq!(message.body(), b"just body");
    }
}
