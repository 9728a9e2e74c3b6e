//! The message sent to the task inbox.

use chrono::{DateTime, Utc};
use maildrop_mime::Message;

/// Default content type when the original message declares none.
const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// A relayed message ready for submission.
///
/// Carries fresh `Date`, `From`, `To` and `Subject` headers and forwards the
/// original's MIME headers so the annotated body keeps its meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    pub to: Vec<String>,
    /// Encoded subject line.
    pub subject: String,
    /// Date header.
    pub date: DateTime<Utc>,
    /// MIME-Version header.
    pub mime_version: String,
    /// Content-Type header, including the original boundary.
    pub content_type: String,
    /// Content-Transfer-Encoding header, if the original had one.
    pub transfer_encoding: Option<String>,
    /// Annotated body.
    pub body: Vec<u8>,
}

impl OutgoingMessage {
    /// Builds the relay of `original` with an already annotated body.
    #[must_use]
    pub fn assemble(
        original: &Message,
        body: Vec<u8>,
        from: impl Into<String>,
        subject: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        let headers = original.headers();
        Self {
            from: from.into(),
            to: Vec::new(),
            subject: subject.into(),
            date,
            mime_version: headers.get("mime-version").unwrap_or("1.0").to_string(),
            content_type: headers
                .get("content-type")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string(),
            transfer_encoding: headers
                .get("content-transfer-encoding")
                .map(ToString::to_string),
            body,
        }
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: impl Into<String>) -> Self {
        self.to.push(recipient.into());
        self
    }

    /// Builds the RFC 5322 formatted message.
    #[must_use]
    pub fn to_rfc5322(&self) -> Vec<u8> {
        use std::fmt::Write;

        let mut head = String::new();

        let _ = writeln!(head, "Date: {}\r", self.date.to_rfc2822());
        let _ = writeln!(head, "From: {}\r", self.from);
        if !self.to.is_empty() {
            let _ = writeln!(head, "To: {}\r", self.to.join(", "));
        }
        let _ = writeln!(head, "Subject: {}\r", self.subject);
        let _ = writeln!(head, "MIME-Version: {}\r", self.mime_version);
        let _ = writeln!(head, "Content-Type: {}\r", self.content_type);
        if let Some(encoding) = &self.transfer_encoding {
            let _ = writeln!(head, "Content-Transfer-Encoding: {encoding}\r");
        }

        // Empty line between headers and body
        head.push_str("\r\n");

        let mut message = head.into_bytes();
        message.extend_from_slice(&self.body);
        message
    }
}
