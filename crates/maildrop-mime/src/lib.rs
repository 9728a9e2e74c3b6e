//! # maildrop-mime
//!
//! MIME handling for relaying messages into a task inbox.
//!
//! ## Features
//!
//! - **Tree parsing**: Parse a message body into a byte-faithful MIME tree
//! - **Annotation**: Prepend a permalink to every text part, honoring each
//!   part's transfer encoding
//! - **Subject rewriting**: Scrub and prefix subjects, re-encoded as a single
//!   RFC 2047 encoded-word
//!
//! ## Quick Start
//!
//! ```
//! use maildrop_mime::{AnnotationPayload, Message, SubjectContext, inject, rewrite};
//!
//! let raw = b"Subject: Lunch?\r\n\
//!             Message-ID: <42@example.com>\r\n\
//!             Content-Type: text/plain\r\n\
//!             \r\n\
//!             See you at noon.\r\n";
//!
//! let message = Message::parse(raw);
//! let payload = AnnotationPayload::permalink(message.message_id().unwrap_or_default());
//! let body = inject(&message.tree(), &payload).to_bytes();
//! assert!(body.starts_with(b"message:<42@example.com>"));
//!
//! let subject = rewrite(message.subject().unwrap_or_default(), &[], &SubjectContext::new("Task:"));
//! assert_eq!(subject, "=?UTF-8?Q?Task=3A=20Lunch=3F?=");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod error;
mod header;
mod message;
mod tree;

pub mod annotate;
pub mod encoding;
pub mod subject;

pub use annotate::{AnnotationPayload, inject};
pub use content_type::{ContentDisposition, ContentType};
pub use error::{Error, Result};
pub use header::Headers;
pub use message::Message;
pub use subject::{SubjectContext, rewrite};
pub use tree::{Leaf, MimeNode, MimeTree, Multipart, Part, TransferEncoding};
