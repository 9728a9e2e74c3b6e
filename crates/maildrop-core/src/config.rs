//! Configuration file model and validation.
//!
//! The configuration is a JSON document with one SMTP section and a list of
//! IMAP accounts. Secrets are not part of it; see [`crate::credentials`].
//!
//! ```json
//! {
//!   "smtp": {
//!     "server": "smtp.example.com",
//!     "helo_domain": "example.com",
//!     "username": "alice",
//!     "from_address": "alice@example.com",
//!     "to_address": "tasks@sync.example.net"
//!   },
//!   "accounts": [
//!     {
//!       "description": "Work",
//!       "imap_server": "imap.example.com",
//!       "login": "alice",
//!       "days_until_reminder": [3, 7],
//!       "email_prefix": "Work:",
//!       "reminder_email_prefix": "REMINDER"
//!     }
//!   ]
//! }
//! ```
//!
//! Key names match the YAML layout used by earlier versions of the tool,
//! so an existing `config.yaml` carries over after converting it to JSON
//! (for example `yq -o json config.yaml > config.json`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::relay::RelayPolicy;

/// Default mailbox whose hierarchy is relayed.
pub const DEFAULT_TASK_MAILBOX: &str = "OmniFocus tasks";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Outgoing relay settings, shared by all accounts.
    pub smtp: SmtpConfig,
    /// Accounts processed in order.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl Config {
    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or does not match the model.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// validation.
    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let json = tokio::fs::read_to_string(path).await?;
        let config = Self::from_json(&json)?;
        validate_config(&config).map_err(Error::Validation)?;
        Ok(config)
    }

    /// Returns `<config_dir>/maildrop/config.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform has no configuration directory.
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("maildrop").join("config.json"))
            .ok_or_else(|| Error::Config("no configuration directory on this platform".into()))
    }
}

/// SMTP submission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Server hostname; also the keyring service name.
    pub server: String,
    /// Submission port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Domain announced in EHLO.
    #[serde(default)]
    pub helo_domain: String,
    /// Login name; also the keyring account name.
    pub username: String,
    /// Envelope and header sender of relayed messages.
    pub from_address: String,
    /// Task inbox address that receives relayed messages.
    pub to_address: String,
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_imap_port() -> u16 {
    993
}

fn default_task_mailbox() -> String {
    DEFAULT_TASK_MAILBOX.to_string()
}

/// One IMAP account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Label used in logs.
    #[serde(default)]
    pub description: String,
    /// Server hostname; also the keyring service name.
    pub imap_server: String,
    /// Server port.
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    /// Login name; also the keyring account name.
    pub login: String,
    /// Root of the mailbox hierarchy that is relayed.
    #[serde(default = "default_task_mailbox")]
    pub task_mailbox: String,
    /// Only relay messages that carry `\Flagged`.
    #[serde(default)]
    pub require_flagged: bool,
    /// Age in days after which a reminder is relayed.
    #[serde(default)]
    pub days_until_reminder: Option<ReminderDays>,
    /// Subject prefix; `{sender}` expands to the sender's name.
    #[serde(default)]
    pub email_prefix: String,
    /// Extra prefix placed first on reminder subjects.
    #[serde(default)]
    pub reminder_email_prefix: String,
    /// Terms removed from subjects before relaying.
    #[serde(default)]
    pub scrub_words: Vec<String>,
    /// Mailboxes whose unseen messages are marked seen.
    #[serde(default)]
    pub mark_as_seen: Vec<String>,
    /// Rules marking messages deleted.
    #[serde(default)]
    pub delete_messages: Vec<DeleteRule>,
    /// Mailboxes expunged at the end of the run.
    #[serde(default)]
    pub expunge_mailboxes: Vec<String>,
}

impl AccountConfig {
    /// Returns the name used in logs.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.login
        } else {
            &self.description
        }
    }

    /// Returns the relay policy for this account.
    #[must_use]
    pub fn relay_policy(&self) -> RelayPolicy {
        RelayPolicy {
            require_flagged: self.require_flagged,
            reminder_days: self
                .days_until_reminder
                .as_ref()
                .map(ReminderDays::days)
                .unwrap_or_default(),
        }
    }
}

/// Reminder threshold, either a single number of days or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReminderDays {
    /// One threshold.
    One(u32),
    /// Several thresholds; a message is eligible once it passes any of them.
    Many(Vec<u32>),
}

impl ReminderDays {
    /// Returns the thresholds in days.
    #[must_use]
    pub fn days(&self) -> Vec<u32> {
        match self {
            Self::One(days) => vec![*days],
            Self::Many(days) => days.clone(),
        }
    }
}

/// Marks messages in one mailbox as deleted when a field matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRule {
    /// Mailbox to search.
    pub in_mailbox: String,
    /// Search field, e.g. `from` or `subject`.
    pub field: String,
    /// Value the field must contain.
    pub address: String,
}

/// Validation error for the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// SMTP server is empty.
    EmptySmtpServer,
    /// SMTP port is invalid.
    InvalidSmtpPort,
    /// SMTP username is empty.
    EmptySmtpUsername,
    /// Sender address is missing or malformed.
    InvalidFromAddress,
    /// Task inbox address is missing or malformed.
    InvalidToAddress,
    /// IMAP server is empty.
    EmptyImapServer {
        /// Account index.
        account: usize,
    },
    /// IMAP port is invalid.
    InvalidImapPort {
        /// Account index.
        account: usize,
    },
    /// IMAP login is empty.
    EmptyLogin {
        /// Account index.
        account: usize,
    },
    /// Task mailbox is empty.
    EmptyTaskMailbox {
        /// Account index.
        account: usize,
    },
    /// A reminder threshold of zero days.
    InvalidReminderDays {
        /// Account index.
        account: usize,
    },
    /// A delete rule with an empty mailbox, field or value.
    IncompleteDeleteRule {
        /// Account index.
        account: usize,
        /// Rule index.
        rule: usize,
    },
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptySmtpServer => "SMTP server is required",
            Self::InvalidSmtpPort => "SMTP port must be 1-65535",
            Self::EmptySmtpUsername => "SMTP username is required",
            Self::InvalidFromAddress => "Invalid sender address",
            Self::InvalidToAddress => "Invalid task inbox address",
            Self::EmptyImapServer { .. } => "IMAP server is required",
            Self::InvalidImapPort { .. } => "IMAP port must be 1-65535",
            Self::EmptyLogin { .. } => "IMAP login is required",
            Self::EmptyTaskMailbox { .. } => "Task mailbox name is required",
            Self::InvalidReminderDays { .. } => "Reminder days must be at least 1",
            Self::IncompleteDeleteRule { .. } => {
                "Delete rule needs a mailbox, a field and a value"
            }
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptySmtpServer => "smtp.server",
            Self::InvalidSmtpPort => "smtp.port",
            Self::EmptySmtpUsername => "smtp.username",
            Self::InvalidFromAddress => "smtp.from_address",
            Self::InvalidToAddress => "smtp.to_address",
            Self::EmptyImapServer { .. } => "imap_server",
            Self::InvalidImapPort { .. } => "imap_port",
            Self::EmptyLogin { .. } => "login",
            Self::EmptyTaskMailbox { .. } => "task_mailbox",
            Self::InvalidReminderDays { .. } => "days_until_reminder",
            Self::IncompleteDeleteRule { .. } => "delete_messages",
        }
    }

    const fn account(&self) -> Option<usize> {
        match self {
            Self::EmptyImapServer { account }
            | Self::InvalidImapPort { account }
            | Self::EmptyLogin { account }
            | Self::EmptyTaskMailbox { account }
            | Self::InvalidReminderDays { account }
            | Self::IncompleteDeleteRule { account, .. } => Some(*account),
            _ => None,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.account() {
            Some(account) => write!(f, "accounts[{account}]: {}", self.message()),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating a configuration.
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a configuration.
///
/// Returns `Ok(())` if valid, or `Err(Vec<ValidationError>)` with all errors.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut errors = Vec::new();

    let smtp = &config.smtp;
    if smtp.server.trim().is_empty() {
        errors.push(ValidationError::EmptySmtpServer);
    }
    if smtp.port == 0 {
        errors.push(ValidationError::InvalidSmtpPort);
    }
    if smtp.username.trim().is_empty() {
        errors.push(ValidationError::EmptySmtpUsername);
    }
    if !is_valid_email(&smtp.from_address) {
        errors.push(ValidationError::InvalidFromAddress);
    }
    if !is_valid_email(&smtp.to_address) {
        errors.push(ValidationError::InvalidToAddress);
    }

    for (account, config) in config.accounts.iter().enumerate() {
        if config.imap_server.trim().is_empty() {
            errors.push(ValidationError::EmptyImapServer { account });
        }
        if config.imap_port == 0 {
            errors.push(ValidationError::InvalidImapPort { account });
        }
        if config.login.trim().is_empty() {
            errors.push(ValidationError::EmptyLogin { account });
        }
        if config.task_mailbox.trim().is_empty() {
            errors.push(ValidationError::EmptyTaskMailbox { account });
        }
        if config
            .days_until_reminder
            .as_ref()
            .is_some_and(|days| days.days().contains(&0))
        {
            errors.push(ValidationError::InvalidReminderDays { account });
        }
        for (rule, delete) in config.delete_messages.iter().enumerate() {
            if delete.in_mailbox.trim().is_empty()
                || delete.field.trim().is_empty()
                || delete.address.trim().is_empty()
            {
                errors.push(ValidationError::IncompleteDeleteRule { account, rule });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.trim().split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|part| !part.is_empty())
}
