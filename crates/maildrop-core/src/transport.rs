//! Boundary to the mail servers.
//!
//! The relay core never talks IMAP or SMTP itself. It drives a [`MailStore`]
//! and a [`MailSender`], obtained from a [`MailConnector`], one awaited call
//! at a time.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::{AccountConfig, SmtpConfig};
use crate::flags::{Flag, FlagDelta, Flags};

/// Errors reported by a mail transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Mailbox does not exist.
    #[error("Mailbox not found: {0}")]
    NoMailbox(String),

    /// Message does not exist in the selected mailbox.
    #[error("Message not found: UID {0}")]
    NoMessage(Uid),

    /// Operation failed.
    #[error("Operation failed: {0}")]
    Operation(String),
}

/// Mailbox-scoped unique message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub u32);

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderType {
    /// Inbox folder.
    Inbox,
    /// Sent mail folder.
    Sent,
    /// Drafts folder.
    Drafts,
    /// Trash folder.
    Trash,
    /// Spam/junk folder.
    Spam,
    /// Archive folder.
    Archive,
    /// Regular folder.
    Regular,
}

impl FolderType {
    /// Detect folder type from its name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower == "inbox" {
            Self::Inbox
        } else if lower.contains("sent") {
            Self::Sent
        } else if lower.contains("draft") {
            Self::Drafts
        } else if lower.contains("trash") || lower.contains("deleted") {
            Self::Trash
        } else if lower.contains("spam") || lower.contains("junk") {
            Self::Spam
        } else if lower.contains("archive") {
            Self::Archive
        } else {
            Self::Regular
        }
    }

    /// Returns true for folders where a `\Flagged` mark is kept during cleanup.
    #[must_use]
    pub const fn keeps_flagged(self) -> bool {
        matches!(self, Self::Inbox | Self::Archive)
    }
}

/// Mailbox attributes from a LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// Mailbox cannot be selected.
    NoSelect,
    /// Mailbox does not exist (RFC 5258).
    NonExistent,
    /// Mailbox has children.
    HasChildren,
    /// Mailbox has no children.
    HasNoChildren,
    /// Any other attribute, kept as sent.
    Other(String),
}

impl MailboxAttribute {
    /// Parses a mailbox attribute string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NONEXISTENT" => Self::NonExistent,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            _ => Self::Other(s.to_string()),
        }
    }
}

/// A mailbox as returned by LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInfo {
    /// Full mailbox name, including the hierarchy.
    pub name: String,
    /// Hierarchy delimiter, if the server reports one.
    pub delimiter: Option<char>,
    /// LIST attributes.
    pub attributes: Vec<MailboxAttribute>,
}

impl MailboxInfo {
    /// Creates mailbox info without attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, delimiter: Option<char>) -> Self {
        Self {
            name: name.into(),
            delimiter,
            attributes: Vec::new(),
        }
    }

    /// Sets the LIST attributes.
    #[must_use]
    pub fn with_attributes(mut self, attributes: Vec<MailboxAttribute>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Returns false for `\Noselect` and `\NonExistent` mailboxes.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| matches!(a, MailboxAttribute::NoSelect | MailboxAttribute::NonExistent))
    }

    /// Returns the last component of the hierarchical name.
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.delimiter
            .and_then(|d| self.name.rsplit(d).next())
            .unwrap_or(&self.name)
    }

    /// Classifies the mailbox by its short name.
    #[must_use]
    pub fn folder_type(&self) -> FolderType {
        FolderType::from_name(self.short_name())
    }
}

/// Envelope fields used by the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Display name of the first sender.
    pub from_name: Option<String>,
    /// Address of the first sender.
    pub from_address: Option<String>,
    /// Subject as sent.
    pub subject: Option<String>,
    /// Message-ID header value.
    pub message_id: Option<String>,
    /// Date header value.
    pub date: Option<String>,
}

impl Envelope {
    /// Returns the sender's display name, or the address when there is none.
    #[must_use]
    pub fn sender_label(&self) -> Option<&str> {
        self.from_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.from_address.as_deref())
    }
}

/// Metadata fetched for a single message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMeta {
    /// Message UID.
    pub uid: Uid,
    /// Current flags.
    pub flags: Flags,
    /// Envelope.
    pub envelope: Envelope,
    /// Server-side arrival time.
    pub internal_date: Option<DateTime<Utc>>,
}

impl MessageMeta {
    /// Returns the best known timestamp for the message.
    ///
    /// Falls back to the envelope's RFC 2822 `Date` when the server did not
    /// report an internal date.
    #[must_use]
    pub fn received_at(&self) -> Option<DateTime<Utc>> {
        self.internal_date.or_else(|| {
            self.envelope
                .date
                .as_deref()
                .and_then(|date| DateTime::parse_from_rfc2822(date.trim()).ok())
                .map(|date| date.with_timezone(&Utc))
        })
    }
}

/// UID SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages with \Deleted flag.
    Deleted,
    /// Messages without \Deleted flag.
    Undeleted,
    /// Messages with \Flagged flag.
    Flagged,
    /// Messages with \Seen flag.
    Seen,
    /// Messages without \Seen flag.
    Unseen,
    /// Messages carrying a keyword.
    Keyword(String),
    /// Messages with an internal date earlier than the given day.
    Before(NaiveDate),
    /// Subject contains text.
    Subject(String),
    /// From contains text.
    From(String),
    /// To contains text.
    To(String),
    /// Cc contains text.
    Cc(String),
    /// Body contains text.
    Body(String),
    /// Text in header or body.
    Text(String),
    /// Header field contains value.
    Header(String, String),
    /// AND of criteria.
    And(Vec<Self>),
    /// OR of criteria.
    Or(Box<Self>, Box<Self>),
    /// NOT of criteria.
    Not(Box<Self>),
}

impl SearchCriteria {
    /// Negates a criterion.
    #[must_use]
    pub fn not(criteria: Self) -> Self {
        Self::Not(Box::new(criteria))
    }

    /// Matches either criterion.
    #[must_use]
    pub fn or(a: Self, b: Self) -> Self {
        Self::Or(Box::new(a), Box::new(b))
    }

    /// Matches messages carrying `flag`.
    ///
    /// Flags without a search key of their own become a KEYWORD search.
    #[must_use]
    pub fn has_flag(flag: &Flag) -> Self {
        match flag {
            Flag::Seen => Self::Seen,
            Flag::Deleted => Self::Deleted,
            Flag::Flagged => Self::Flagged,
            other => Self::Keyword(other.as_str().to_string()),
        }
    }

    /// Builds a text search on a named field, as used by delete rules.
    ///
    /// Unknown field names search the header of that name.
    #[must_use]
    pub fn field(name: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match name.to_ascii_lowercase().as_str() {
            "from" => Self::From(value),
            "to" => Self::To(value),
            "cc" => Self::Cc(value),
            "subject" => Self::Subject(value),
            "body" => Self::Body(value),
            "text" => Self::Text(value),
            _ => Self::Header(name.to_string(), value),
        }
    }
}

impl fmt::Display for SearchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("ALL"),
            Self::Deleted => f.write_str("DELETED"),
            Self::Undeleted => f.write_str("UNDELETED"),
            Self::Flagged => f.write_str("FLAGGED"),
            Self::Seen => f.write_str("SEEN"),
            Self::Unseen => f.write_str("UNSEEN"),
            Self::Keyword(k) => write!(f, "KEYWORD {k}"),
            Self::Before(date) => write!(f, "BEFORE {}", date.format("%d-%b-%Y")),
            Self::Subject(s) => write!(f, "SUBJECT {}", quote(s)),
            Self::From(s) => write!(f, "FROM {}", quote(s)),
            Self::To(s) => write!(f, "TO {}", quote(s)),
            Self::Cc(s) => write!(f, "CC {}", quote(s)),
            Self::Body(s) => write!(f, "BODY {}", quote(s)),
            Self::Text(s) => write!(f, "TEXT {}", quote(s)),
            Self::Header(name, value) => write!(f, "HEADER {} {}", quote(name), quote(value)),
            Self::And(criteria) => {
                if criteria.is_empty() {
                    return f.write_str("ALL");
                }
                let parts: Vec<String> = criteria.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(" "))
            }
            Self::Or(a, b) => write!(f, "OR {a} {b}"),
            Self::Not(c) => write!(f, "NOT {c}"),
        }
    }
}

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// STORE actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Add flags (+FLAGS.SILENT).
    AddFlags(Vec<Flag>),
    /// Remove flags (-FLAGS.SILENT).
    RemoveFlags(Vec<Flag>),
}

impl StoreAction {
    /// Splits a delta into the STORE actions that apply it, additions first.
    #[must_use]
    pub fn from_delta(delta: &FlagDelta) -> Vec<Self> {
        let mut actions = Vec::with_capacity(2);
        if !delta.add.is_empty() {
            actions.push(Self::AddFlags(delta.add.clone()));
        }
        if !delta.remove.is_empty() {
            actions.push(Self::RemoveFlags(delta.remove.clone()));
        }
        actions
    }
}

/// An authenticated IMAP session.
#[allow(async_fn_in_trait)]
pub trait MailStore {
    /// Lists mailboxes matching `pattern` under `reference`.
    async fn list(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Vec<MailboxInfo>, TransportError>;

    /// Selects a mailbox for read-write access.
    async fn select(&mut self, mailbox: &str) -> Result<(), TransportError>;

    /// Searches the selected mailbox, returning matching UIDs.
    async fn search(&mut self, criteria: &SearchCriteria) -> Result<Vec<Uid>, TransportError>;

    /// Fetches flags, envelope and internal date.
    async fn fetch_meta(&mut self, uid: Uid) -> Result<MessageMeta, TransportError>;

    /// Fetches the full RFC 5322 message.
    async fn fetch_raw(&mut self, uid: Uid) -> Result<Vec<u8>, TransportError>;

    /// Stores a flag change on a message.
    async fn store(&mut self, uid: Uid, action: &StoreAction) -> Result<(), TransportError>;

    /// Creates a mailbox.
    async fn create(&mut self, mailbox: &str) -> Result<(), TransportError>;

    /// Permanently removes messages marked `\Deleted` from the selected mailbox.
    async fn expunge(&mut self) -> Result<(), TransportError>;

    /// Ends the session.
    async fn logout(&mut self) -> Result<(), TransportError>;
}

/// An authenticated SMTP submission session.
#[allow(async_fn_in_trait)]
pub trait MailSender {
    /// Submits a raw message for delivery.
    async fn send(&mut self, raw: &[u8], from: &str, to: &[String]) -> Result<(), TransportError>;

    /// Sends NOOP to check that the session is still open.
    async fn noop(&mut self) -> Result<(), TransportError>;
}

/// Opens transport sessions from configuration and resolved secrets.
#[allow(async_fn_in_trait)]
pub trait MailConnector {
    /// Store session type.
    type Store: MailStore;
    /// Sender session type.
    type Sender: MailSender;

    /// Connects and logs in to an account's IMAP server.
    async fn connect_store(
        &self,
        account: &AccountConfig,
        password: &str,
    ) -> Result<Self::Store, TransportError>;

    /// Connects and authenticates to the SMTP server.
    ///
    /// Runs once before any account is processed, so a bad SMTP credential
    /// stops the run before anything is flagged. Runs again whenever the
    /// session is found closed before an account's relay phase.
    async fn connect_sender(
        &self,
        smtp: &SmtpConfig,
        password: &str,
    ) -> Result<Self::Sender, TransportError>;
}

/// Returns true if `mailbox` exists on the server.
///
/// # Errors
///
/// Returns an error if the LIST command fails.
pub async fn mailbox_exists<S: MailStore>(
    store: &mut S,
    mailbox: &str,
) -> Result<bool, TransportError> {
    Ok(!store.list("", mailbox).await?.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_folder_type_detection() {
        assert_eq!(FolderType::from_name("INBOX"), FolderType::Inbox);
        assert_eq!(FolderType::from_name("Sent Messages"), FolderType::Sent);
        assert_eq!(FolderType::from_name("Archive"), FolderType::Archive);
        assert_eq!(FolderType::from_name("Projects"), FolderType::Regular);
        assert!(FolderType::Archive.keeps_flagged());
        assert!(!FolderType::Regular.keeps_flagged());
    }

    #[test]
    fn test_short_name() {
        let mailbox = MailboxInfo::new("Tasks/Work/Urgent", Some('/'));
        assert_eq!(mailbox.short_name(), "Urgent");
        assert_eq!(MailboxInfo::new("INBOX", None).short_name(), "INBOX");
        assert_eq!(
            MailboxInfo::new("[Gmail].All Archive", Some('.')).folder_type(),
            FolderType::Archive
        );
    }

    #[test]
    fn test_noselect_mailbox() {
        assert_eq!(
            MailboxAttribute::parse("\\Noselect"),
            MailboxAttribute::NoSelect
        );
        assert_eq!(
            MailboxAttribute::parse("\\Sent"),
            MailboxAttribute::Other("\\Sent".into())
        );

        let gmail = MailboxInfo::new("[Gmail]", Some('/'))
            .with_attributes(vec![MailboxAttribute::parse("\\NoSelect")]);
        assert!(!gmail.is_selectable());
        let inbox = MailboxInfo::new("INBOX", Some('/'))
            .with_attributes(vec![MailboxAttribute::HasNoChildren]);
        assert!(inbox.is_selectable());
    }

    #[test]
    fn test_sender_label() {
        let mut envelope = Envelope {
            from_address: Some("bob@example.com".into()),
            ..Envelope::default()
        };
        assert_eq!(envelope.sender_label(), Some("bob@example.com"));
        envelope.from_name = Some("Bob".into());
        assert_eq!(envelope.sender_label(), Some("Bob"));
    }

    #[test]
    fn test_received_at_falls_back_to_date_header() {
        let meta = MessageMeta {
            uid: Uid(1),
            flags: Flags::new(),
            envelope: Envelope {
                date: Some("Fri, 01 Mar 2024 09:30:00 +0000".into()),
                ..Envelope::default()
            },
            internal_date: None,
        };
        assert_eq!(
            meta.received_at(),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_search_criteria_display() {
        let criteria = SearchCriteria::And(vec![
            SearchCriteria::Undeleted,
            SearchCriteria::not(SearchCriteria::has_flag(&Flag::SentToRelay)),
            SearchCriteria::Before(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        ]);
        assert_eq!(
            criteria.to_string(),
            "(UNDELETED NOT KEYWORD SentToMailDrop BEFORE 01-Mar-2024)"
        );
        assert_eq!(
            SearchCriteria::or(SearchCriteria::Flagged, SearchCriteria::Seen).to_string(),
            "OR FLAGGED SEEN"
        );
    }

    #[test]
    fn test_field_criteria() {
        assert_eq!(
            SearchCriteria::field("FROM", "spam@example.com"),
            SearchCriteria::From("spam@example.com".into())
        );
        assert_eq!(
            SearchCriteria::field("X-Mailer", "bulk").to_string(),
            "HEADER \"X-Mailer\" \"bulk\""
        );
    }

    #[test]
    fn test_store_actions_from_delta() {
        let delta = FlagDelta::new()
            .add(Flag::SentReminder)
            .remove(Flag::SentToRelay);
        assert_eq!(
            StoreAction::from_delta(&delta),
            vec![
                StoreAction::AddFlags(vec![Flag::SentReminder]),
                StoreAction::RemoveFlags(vec![Flag::SentToRelay]),
            ]
        );
        assert!(StoreAction::from_delta(&FlagDelta::new()).is_empty());
    }
}
