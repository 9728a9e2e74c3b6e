//! Per-account run sequence.
//!
//! A run checks the SMTP credential once, then processes each account in
//! order: mark seen, delete by rule, relay, cleanup, expunge, logout.
//! A missing or locked secret stops the whole run. Any other failure stops
//! only the account it happened in.
//!
//! The SMTP session stays open across accounts. It is checked with NOOP
//! before each relay phase and reopened if the server has dropped it.

use tracing::{info, warn};

use crate::admin::{MailboxCount, delete_messages, expunge_mailboxes, mark_as_seen};
use crate::cleanup::{SweepReport, cleanup_mailboxes};
use crate::config::{AccountConfig, Config, SmtpConfig, validate_config};
use crate::credentials::SecretProvider;
use crate::error::{Error, Result};
use crate::relay::{RelayReport, RelaySettings, relay_mailboxes};
use crate::time::Clock;
use crate::transport::{MailConnector, MailSender, MailStore};

/// An SMTP session that reconnects when the server has closed it.
pub struct SmtpSession<'a, C: MailConnector> {
    connector: &'a C,
    smtp: &'a SmtpConfig,
    password: String,
    sender: C::Sender,
}

impl<'a, C: MailConnector> SmtpSession<'a, C> {
    /// Opens the session.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached or rejects the login.
    pub async fn open(connector: &'a C, smtp: &'a SmtpConfig, password: String) -> Result<Self> {
        let sender = connector.connect_sender(smtp, &password).await?;
        info!("Connected to SMTP server {}", smtp.server);
        Ok(Self {
            connector,
            smtp,
            password,
            sender,
        })
    }

    /// Returns the SMTP settings of the session.
    #[must_use]
    pub const fn smtp(&self) -> &SmtpConfig {
        self.smtp
    }

    /// Returns a live sender, reconnecting if NOOP fails.
    ///
    /// # Errors
    ///
    /// Returns an error if reconnecting fails.
    pub async fn ready(&mut self) -> Result<&mut C::Sender> {
        if let Err(e) = self.sender.noop().await {
            warn!("SMTP session to {} lost ({e}), reconnecting", self.smtp.server);
            self.sender = self
                .connector
                .connect_sender(self.smtp, &self.password)
                .await?;
        }
        Ok(&mut self.sender)
    }
}

/// Results for one account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountReport {
    /// Account label.
    pub account: String,
    /// Messages marked seen per mailbox.
    pub seen: Vec<MailboxCount>,
    /// Messages marked deleted per rule.
    pub deleted: Vec<MailboxCount>,
    /// Relay results.
    pub relay: RelayReport,
    /// Cleanup results.
    pub cleanup: Vec<SweepReport>,
    /// Mailboxes expunged.
    pub expunged: Vec<String>,
}

/// An account whose processing stopped early.
#[derive(Debug)]
pub struct AccountFailure {
    /// Account label.
    pub account: String,
    /// What stopped it.
    pub error: Error,
}

/// Results of a whole run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Accounts processed to the end.
    pub accounts: Vec<AccountReport>,
    /// Accounts that stopped early.
    pub failures: Vec<AccountFailure>,
}

impl RunReport {
    /// Returns true if every account was processed to the end.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs every configured account.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a secret cannot be
/// read, or the SMTP session cannot be opened.
pub async fn run<C, P, K>(
    config: &Config,
    secrets: &P,
    connector: &C,
    clock: &K,
) -> Result<RunReport>
where
    C: MailConnector,
    P: SecretProvider + ?Sized,
    K: Clock + ?Sized,
{
    validate_config(config).map_err(Error::Validation)?;

    let smtp_password = secrets.get_secret(&config.smtp.server, &config.smtp.username)?;
    let mut session = SmtpSession::open(connector, &config.smtp, smtp_password).await?;

    let mut report = RunReport::default();
    for account in &config.accounts {
        info!("Processing {}", account.label());
        let password = secrets.get_secret(&account.imap_server, &account.login)?;

        let result = match connector.connect_store(account, &password).await {
            Ok(mut store) => {
                let result = run_account(&mut store, &mut session, account, clock).await;
                if let Err(e) = store.logout().await {
                    warn!("Logout from {} failed: {e}", account.imap_server);
                }
                result
            }
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(account_report) => report.accounts.push(account_report),
            Err(error) => {
                warn!("Account {} stopped: {error}", account.label());
                report.failures.push(AccountFailure {
                    account: account.label().to_string(),
                    error,
                });
            }
        }
    }

    Ok(report)
}

/// Runs the full sequence for one account on an open session.
///
/// # Errors
///
/// Returns an error if a mailbox-level server command fails or the SMTP
/// session cannot be reopened.
pub async fn run_account<S, C, K>(
    store: &mut S,
    session: &mut SmtpSession<'_, C>,
    account: &AccountConfig,
    clock: &K,
) -> Result<AccountReport>
where
    S: MailStore,
    C: MailConnector,
    K: Clock + ?Sized,
{
    let seen = mark_as_seen(store, &account.mark_as_seen).await?;
    let deleted = delete_messages(store, &account.delete_messages).await?;

    let settings = RelaySettings::from_config(account, session.smtp());
    let sender = session.ready().await?;
    let relay = relay_mailboxes(store, sender, &settings, clock).await?;
    info!(
        "Relayed {} message(s) from {}, {} failure(s)",
        relay.sent(),
        account.label(),
        relay.failed()
    );

    let cleanup = cleanup_mailboxes(store, &account.task_mailbox).await?;
    let expunged = expunge_mailboxes(store, &account.expunge_mailboxes).await?;

    Ok(AccountReport {
        account: account.label().to_string(),
        seen,
        deleted,
        relay,
        cleanup,
        expunged,
    })
}
