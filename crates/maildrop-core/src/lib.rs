//! # maildrop-core
//!
//! Flag-driven relay of mailbox messages into a task inbox.
//!
//! This crate provides:
//! - The relay state machine, keyed entirely on IMAP flags
//! - A depth-first relay of the task mailbox hierarchy
//! - Cleanup of relay bookkeeping once messages are filed away
//! - Housekeeping: mark seen, delete by rule, expunge
//! - JSON configuration and keyring-backed secrets
//!
//! IMAP and SMTP sessions are supplied by the caller through the
//! [`MailStore`], [`MailSender`] and [`MailConnector`] traits.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod admin;
pub mod cleanup;
pub mod config;
pub mod credentials;
mod error;
pub mod flags;
pub mod relay;
pub mod runner;
pub mod time;
pub mod transport;

pub use config::{
    AccountConfig, Config, DeleteRule, ReminderDays, SmtpConfig, ValidationError,
    ValidationResult, validate_config,
};
pub use credentials::{KeyringSecretProvider, SecretError, SecretProvider};
pub use error::{Error, Result};
pub use flags::{Flag, FlagDelta, Flags};
pub use relay::{RelayDecision, RelayPolicy, RelayReport, RelaySettings, relay_mailboxes};
pub use runner::{AccountReport, RunReport, SmtpSession, run, run_account};
pub use transport::{
    Envelope, FolderType, MailConnector, MailSender, MailStore, MailboxAttribute, MailboxInfo,
    MessageMeta, SearchCriteria, StoreAction, TransportError, Uid,
};
