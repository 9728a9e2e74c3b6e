//! Retraction of relay bookkeeping flags.
//!
//! Once a relayed message is filed out of the task mailbox and loses its
//! `\Flagged` mark, its relay keywords are no longer needed. Outside inbox
//! and archive folders the `\Flagged` mark set by the relay is removed too.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::flags::{Flag, FlagDelta, Flags};
use crate::transport::{
    FolderType, MailStore, MailboxInfo, SearchCriteria, StoreAction, TransportError, Uid,
};

/// Cleanup results for one mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Mailbox name.
    pub mailbox: String,
    /// Messages carrying relay keywords.
    pub examined: usize,
    /// Messages whose flags were changed.
    pub cleaned: usize,
    /// Messages that could not be fetched or stored, or one if the mailbox
    /// itself could not be opened or searched.
    pub failed: usize,
}

/// Returns the flags to remove from a message during cleanup.
///
/// A single application converges: applying the sweep again to the result
/// yields an empty delta.
#[must_use]
pub fn sweep_delta(flags: &Flags, folder: FolderType) -> FlagDelta {
    let mut delta = FlagDelta::new();
    if !flags.has_relay_flags() {
        return delta;
    }

    let mut flagged = flags.is_flagged();
    if flagged && !folder.keeps_flagged() {
        delta = delta.remove(Flag::Flagged);
        flagged = false;
    }
    if !flagged {
        for flag in [Flag::SentReminder, Flag::SentToRelay] {
            if flags.contains(&flag) {
                delta = delta.remove(flag);
            }
        }
    }
    delta
}

/// Criteria matching messages with any relay keyword.
#[must_use]
pub fn bookkeeping_criteria() -> SearchCriteria {
    SearchCriteria::or(
        SearchCriteria::has_flag(&Flag::SentToRelay),
        SearchCriteria::has_flag(&Flag::SentReminder),
    )
}

/// Sweeps every mailbox except the task mailbox hierarchy.
///
/// Mailboxes that cannot be selected are skipped. A mailbox that fails to
/// open or search is logged and counted as failed; the sweep moves on.
///
/// # Errors
///
/// Returns an error if listing mailboxes fails.
pub async fn cleanup_mailboxes<S: MailStore>(
    store: &mut S,
    task_mailbox: &str,
) -> Result<Vec<SweepReport>> {
    let mut reports = Vec::new();

    for mailbox in store.list("", "*").await? {
        if mailbox.name.contains(task_mailbox) {
            continue;
        }
        if !mailbox.is_selectable() {
            debug!("Skipping unselectable mailbox '{}'", mailbox.name);
            continue;
        }

        let report = sweep_mailbox(store, &mailbox).await;
        if report.examined > 0 {
            info!(
                "Cleaned {}/{} message(s) in '{}'",
                report.cleaned, report.examined, report.mailbox
            );
        }
        reports.push(report);
    }

    Ok(reports)
}

async fn sweep_mailbox<S: MailStore>(store: &mut S, mailbox: &MailboxInfo) -> SweepReport {
    let mut report = SweepReport {
        mailbox: mailbox.name.clone(),
        ..SweepReport::default()
    };

    let uids = match open_and_search(store, &mailbox.name).await {
        Ok(uids) => uids,
        Err(e) => {
            warn!("Skipping cleanup of '{}': {e}", mailbox.name);
            report.failed += 1;
            return report;
        }
    };
    report.examined = uids.len();

    let folder = mailbox.folder_type();
    for uid in uids {
        match sweep_message(store, uid, folder).await {
            Ok(true) => report.cleaned += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to clean UID {uid} in '{}': {e}", mailbox.name);
                report.failed += 1;
            }
        }
    }
    report
}

async fn open_and_search<S: MailStore>(
    store: &mut S,
    mailbox: &str,
) -> std::result::Result<Vec<Uid>, TransportError> {
    store.select(mailbox).await?;
    store.search(&bookkeeping_criteria()).await
}

async fn sweep_message<S: MailStore>(
    store: &mut S,
    uid: Uid,
    folder: FolderType,
) -> std::result::Result<bool, TransportError> {
    let meta = store.fetch_meta(uid).await?;
    let delta = sweep_delta(&meta.flags, folder);
    if delta.is_empty() {
        return Ok(false);
    }

    debug!("Removing {:?} from UID {uid}", delta.remove);
    for action in StoreAction::from_delta(&delta) {
        store.store(uid, &action).await?;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(list: &[Flag]) -> Flags {
        list.iter().cloned().collect()
    }

    fn swept(list: &[Flag], folder: FolderType) -> Flags {
        let mut result = flags(list);
        result.apply(&sweep_delta(&result, folder));
        result
    }

    #[test]
    fn test_unflagged_reminder_is_cleared() {
        assert!(swept(&[Flag::SentReminder], FolderType::Regular).is_empty());
    }

    #[test]
    fn test_flagged_outside_inbox_is_cleared() {
        let result = swept(
            &[Flag::Flagged, Flag::SentToRelay, Flag::Seen],
            FolderType::Regular,
        );
        assert_eq!(result, flags(&[Flag::Seen]));
    }

    #[test]
    fn test_flagged_in_inbox_is_kept() {
        let original = [Flag::Flagged, Flag::SentToRelay];
        assert_eq!(swept(&original, FolderType::Inbox), flags(&original));
        assert_eq!(swept(&original, FolderType::Archive), flags(&original));
    }

    #[test]
    fn test_unflagged_in_inbox_is_cleared() {
        let result = swept(&[Flag::SentToRelay, Flag::SentReminder], FolderType::Inbox);
        assert!(result.is_empty());
    }

    #[test]
    fn test_plain_flagged_untouched() {
        assert_eq!(
            sweep_delta(&flags(&[Flag::Flagged]), FolderType::Regular),
            FlagDelta::new()
        );
    }

    #[test]
    fn test_one_sweep_converges() {
        for folder in [FolderType::Inbox, FolderType::Regular, FolderType::Archive] {
            let once = swept(&[Flag::Flagged, Flag::SentReminder], folder);
            assert!(sweep_delta(&once, folder).is_empty());
        }
    }
}
