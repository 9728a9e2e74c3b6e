//! Housekeeping run around the relay: mark seen, delete by rule, expunge.
//!
//! Mailboxes that do not exist on the server are skipped.

use tracing::{debug, info};

use crate::config::DeleteRule;
use crate::error::Result;
use crate::flags::Flag;
use crate::transport::{MailStore, SearchCriteria, StoreAction, mailbox_exists};

/// Number of messages changed in one mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxCount {
    /// Mailbox name.
    pub mailbox: String,
    /// Messages changed.
    pub count: usize,
}

/// Marks every unseen message in `mailboxes` as seen.
///
/// # Errors
///
/// Returns an error if any server command fails.
pub async fn mark_as_seen<S: MailStore>(
    store: &mut S,
    mailboxes: &[String],
) -> Result<Vec<MailboxCount>> {
    let action = StoreAction::AddFlags(vec![Flag::Seen]);
    let mut counts = Vec::new();

    for mailbox in mailboxes {
        if !mailbox_exists(store, mailbox).await? {
            debug!("Skipping missing mailbox '{mailbox}'");
            continue;
        }
        store.select(mailbox).await?;
        let uids = store.search(&SearchCriteria::Unseen).await?;
        for uid in &uids {
            store.store(*uid, &action).await?;
        }
        info!("Marked {} message(s) seen in '{mailbox}'", uids.len());
        counts.push(MailboxCount {
            mailbox: mailbox.clone(),
            count: uids.len(),
        });
    }

    Ok(counts)
}

/// Marks messages matching each rule as deleted.
///
/// # Errors
///
/// Returns an error if any server command fails.
pub async fn delete_messages<S: MailStore>(
    store: &mut S,
    rules: &[DeleteRule],
) -> Result<Vec<MailboxCount>> {
    let action = StoreAction::AddFlags(vec![Flag::Deleted]);
    let mut counts = Vec::new();

    for rule in rules {
        if !mailbox_exists(store, &rule.in_mailbox).await? {
            debug!("Skipping missing mailbox '{}'", rule.in_mailbox);
            continue;
        }
        store.select(&rule.in_mailbox).await?;
        let criteria = SearchCriteria::field(&rule.field, rule.address.as_str());
        let uids = store.search(&criteria).await?;
        for uid in &uids {
            store.store(*uid, &action).await?;
        }
        info!(
            "Marked {} message(s) deleted in '{}' ({criteria})",
            uids.len(),
            rule.in_mailbox
        );
        counts.push(MailboxCount {
            mailbox: rule.in_mailbox.clone(),
            count: uids.len(),
        });
    }

    Ok(counts)
}

/// Expunges each mailbox, returning the names that were expunged.
///
/// # Errors
///
/// Returns an error if any server command fails.
pub async fn expunge_mailboxes<S: MailStore>(
    store: &mut S,
    mailboxes: &[String],
) -> Result<Vec<String>> {
    let mut expunged = Vec::new();

    for mailbox in mailboxes {
        if !mailbox_exists(store, mailbox).await? {
            debug!("Skipping missing mailbox '{mailbox}'");
            continue;
        }
        store.select(mailbox).await?;
        store.expunge().await?;
        info!("Expunged '{mailbox}'");
        expunged.push(mailbox.clone());
    }

    Ok(expunged)
}
