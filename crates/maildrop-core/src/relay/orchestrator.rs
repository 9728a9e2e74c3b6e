//! Depth-first relay of the task mailbox hierarchy.

use std::collections::BTreeSet;

use chrono::{DateTime, TimeDelta, Utc};
use html_escape::decode_html_entities;
use maildrop_mime::{AnnotationPayload, Message, SubjectContext, inject, rewrite};
use tracing::{debug, info, warn};

use super::outgoing::OutgoingMessage;
use super::state::{
    RelayDecision, RelayPolicy, classify, commit, initial_criteria, reminder_criteria,
    reminder_cutoffs,
};
use crate::config::{AccountConfig, SmtpConfig};
use crate::error::Result;
use crate::time::Clock;
use crate::transport::{
    MailSender, MailStore, MailboxInfo, MessageMeta, StoreAction, TransportError, Uid,
};

/// Placeholder in the subject prefix replaced by the sender's name.
pub const SENDER_PLACEHOLDER: &str = "{sender}";

/// Everything the relay needs to know about one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    /// Root of the relayed mailbox hierarchy.
    pub task_mailbox: String,
    /// Sender of relayed messages.
    pub from_address: String,
    /// Task inbox address.
    pub to_address: String,
    /// Subject prefix of the root mailbox.
    pub subject_prefix: String,
    /// Prefix placed first on reminder subjects.
    pub reminder_prefix: String,
    /// Terms removed from subjects.
    pub scrub_words: Vec<String>,
    /// Selection policy.
    pub policy: RelayPolicy,
}

impl RelaySettings {
    /// Combines account and SMTP configuration.
    #[must_use]
    pub fn from_config(account: &AccountConfig, smtp: &SmtpConfig) -> Self {
        Self {
            task_mailbox: account.task_mailbox.clone(),
            from_address: smtp.from_address.clone(),
            to_address: smtp.to_address.clone(),
            subject_prefix: account.email_prefix.clone(),
            reminder_prefix: account.reminder_email_prefix.clone(),
            scrub_words: account.scrub_words.clone(),
            policy: account.relay_policy(),
        }
    }
}

/// Relay results for one mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxReport {
    /// Mailbox name.
    pub mailbox: String,
    /// Subject prefix used for the mailbox.
    pub prefix: String,
    /// UIDs returned by the candidate searches.
    pub candidates: usize,
    /// Messages relayed for the first time.
    pub relayed: usize,
    /// Reminders relayed.
    pub reminded: usize,
    /// Candidates that were no longer eligible.
    pub skipped: usize,
    /// Messages that could not be fetched or sent.
    pub failed: usize,
    /// Messages sent whose flags could not be stored.
    pub uncommitted: usize,
}

/// Relay results for a whole account, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Per-mailbox results; children come before their parent.
    pub mailboxes: Vec<MailboxReport>,
}

impl RelayReport {
    /// Total messages sent, first relays and reminders.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.mailboxes.iter().map(|m| m.relayed + m.reminded).sum()
    }

    /// Total per-message failures.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.mailboxes.iter().map(|m| m.failed + m.uncommitted).sum()
    }
}

enum Visit {
    Enter(MailboxInfo, String),
    Process(MailboxInfo, String),
}

enum Outcome {
    Skipped,
    Sent {
        decision: RelayDecision,
        committed: bool,
    },
}

/// Relays every eligible message below the task mailbox.
///
/// Creates the task mailbox when it does not exist. Child mailboxes are
/// processed before their parent, each with the parent's prefix extended by
/// the child's short name.
///
/// # Errors
///
/// Returns an error if listing, selecting or searching a mailbox fails.
/// Failures on single messages are logged and counted in the report.
pub async fn relay_mailboxes<S, M, C>(
    store: &mut S,
    sender: &mut M,
    settings: &RelaySettings,
    clock: &C,
) -> Result<RelayReport>
where
    S: MailStore,
    M: MailSender,
    C: Clock + ?Sized,
{
    let root = open_root(store, &settings.task_mailbox).await?;
    let mut report = RelayReport::default();
    let mut stack = vec![Visit::Enter(root, settings.subject_prefix.trim().to_string())];

    while let Some(visit) = stack.pop() {
        match visit {
            Visit::Enter(mailbox, prefix) => {
                let children = list_children(store, &mailbox).await?;
                stack.push(Visit::Process(mailbox, prefix.clone()));
                for child in children.into_iter().rev() {
                    let child_prefix = extend_prefix(&prefix, child.short_name());
                    stack.push(Visit::Enter(child, child_prefix));
                }
            }
            Visit::Process(mailbox, _) if !mailbox.is_selectable() => {
                debug!("Skipping unselectable mailbox '{}'", mailbox.name);
            }
            Visit::Process(mailbox, prefix) => {
                let mailbox_report =
                    relay_mailbox(store, sender, settings, clock, &mailbox.name, prefix).await?;
                report.mailboxes.push(mailbox_report);
            }
        }
    }

    Ok(report)
}

async fn open_root<S: MailStore>(store: &mut S, name: &str) -> Result<MailboxInfo> {
    if let Some(root) = store.list("", name).await?.into_iter().next() {
        return Ok(root);
    }

    info!("Creating mailbox {name}");
    store.create(name).await?;
    Ok(store
        .list("", name)
        .await?
        .into_iter()
        .next()
        .unwrap_or_else(|| MailboxInfo::new(name, None)))
}

async fn list_children<S: MailStore>(
    store: &mut S,
    mailbox: &MailboxInfo,
) -> Result<Vec<MailboxInfo>> {
    let Some(delimiter) = mailbox.delimiter else {
        return Ok(Vec::new());
    };
    let pattern = format!("{}{delimiter}%", mailbox.name);
    Ok(store.list("", &pattern).await?)
}

fn extend_prefix(prefix: &str, short_name: &str) -> String {
    if prefix.is_empty() {
        format!("{short_name}:")
    } else {
        format!("{prefix} {short_name}:")
    }
}

async fn relay_mailbox<S, M, C>(
    store: &mut S,
    sender: &mut M,
    settings: &RelaySettings,
    clock: &C,
    mailbox: &str,
    prefix: String,
) -> Result<MailboxReport>
where
    S: MailStore,
    M: MailSender,
    C: Clock + ?Sized,
{
    store.select(mailbox).await?;

    let mut candidates: BTreeSet<Uid> = store
        .search(&initial_criteria(&settings.policy))
        .await?
        .into_iter()
        .collect();
    for cutoff in reminder_cutoffs(&settings.policy, clock.today()) {
        debug!("Searching {mailbox} for reminders before {cutoff}");
        candidates.extend(store.search(&reminder_criteria(cutoff)).await?);
    }

    let mut report = MailboxReport {
        mailbox: mailbox.to_string(),
        candidates: candidates.len(),
        ..MailboxReport::default()
    };
    info!(
        "Relaying {} candidate(s) in '{mailbox}' with prefix '{prefix}'",
        report.candidates
    );

    for uid in candidates {
        match relay_message(store, sender, settings, clock, uid, &prefix).await {
            Ok(Outcome::Skipped) => report.skipped += 1,
            Ok(Outcome::Sent {
                decision,
                committed,
            }) => {
                if decision == RelayDecision::ReminderRelay {
                    report.reminded += 1;
                } else {
                    report.relayed += 1;
                }
                if !committed {
                    report.uncommitted += 1;
                }
            }
            Err(e) => {
                warn!("Failed to relay UID {uid} in '{mailbox}': {e}");
                report.failed += 1;
            }
        }
    }

    report.prefix = prefix;
    Ok(report)
}

async fn relay_message<S, M, C>(
    store: &mut S,
    sender: &mut M,
    settings: &RelaySettings,
    clock: &C,
    uid: Uid,
    prefix: &str,
) -> std::result::Result<Outcome, TransportError>
where
    S: MailStore,
    M: MailSender,
    C: Clock + ?Sized,
{
    let meta = store.fetch_meta(uid).await?;
    let age = meta
        .received_at()
        .map_or_else(TimeDelta::zero, |received| clock.age_of(received));
    let decision = classify(&meta.flags, age, &settings.policy);
    if decision == RelayDecision::Skip {
        debug!("Skipping UID {uid}");
        return Ok(Outcome::Skipped);
    }

    let raw = store.fetch_raw(uid).await?;
    let outgoing = build_relay(&raw, &meta, decision, prefix, settings, clock.now());
    debug!(
        "Sending UID {uid} ({decision:?}) from {}",
        meta.envelope.sender_label().unwrap_or("unknown sender")
    );
    sender
        .send(&outgoing.to_rfc5322(), &outgoing.from, &outgoing.to)
        .await?;

    let mut committed = true;
    for action in StoreAction::from_delta(&commit(decision)) {
        if let Err(e) = store.store(uid, &action).await {
            warn!("Sent UID {uid} but could not store {action:?}: {e}");
            committed = false;
        }
    }

    Ok(Outcome::Sent {
        decision,
        committed,
    })
}

/// Builds the relayed form of a raw message.
///
/// Text parts get a permalink to the original when a Message-ID is known.
/// The subject is rewritten with `prefix`, after `{sender}` expansion, and
/// for reminders with the reminder prefix in front. HTML entities in the
/// prefixes and the subject are decoded first.
#[must_use]
pub fn build_relay(
    raw: &[u8],
    meta: &MessageMeta,
    decision: RelayDecision,
    prefix: &str,
    settings: &RelaySettings,
    now: DateTime<Utc>,
) -> OutgoingMessage {
    let message = Message::parse(raw);
    let tree = message.tree();

    let message_id = meta
        .envelope
        .message_id
        .as_deref()
        .or_else(|| message.message_id())
        .filter(|id| !id.trim().is_empty());
    let body = match message_id {
        Some(id) => inject(&tree, &AnnotationPayload::permalink(id)).to_bytes(),
        None => tree.to_bytes(),
    };

    let sender = meta.envelope.sender_label().unwrap_or_default();
    let prefix = decode_html_entities(prefix).replace(SENDER_PLACEHOLDER, sender);
    let mut context = SubjectContext::new(prefix);
    if decision == RelayDecision::ReminderRelay {
        context = context.with_reminder(decode_html_entities(&settings.reminder_prefix));
    }
    let subject = message
        .subject()
        .or(meta.envelope.subject.as_deref())
        .unwrap_or_default();
    let subject = rewrite(
        &decode_html_entities(subject),
        &settings.scrub_words,
        &context,
    );

    OutgoingMessage::assemble(&message, body, settings.from_address.as_str(), subject, now)
        .to(settings.to_address.as_str())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::flags::Flags;
    use crate::transport::Envelope;
    use chrono::TimeZone;

    fn settings() -> RelaySettings {
        RelaySettings {
            task_mailbox: "Tasks".into(),
            from_address: "me@example.com".into(),
            to_address: "tasks@example.net".into(),
            subject_prefix: "Email:".into(),
            reminder_prefix: "REMINDER".into(),
            scrub_words: vec!["[EXT]".into()],
            policy: RelayPolicy::default(),
        }
    }

    fn meta(message_id: Option<&str>) -> MessageMeta {
        MessageMeta {
            uid: Uid(7),
            flags: Flags::new(),
            envelope: Envelope {
                from_name: Some("Bob".into()),
                from_address: Some("bob@example.com".into()),
                message_id: message_id.map(ToString::to_string),
                ..Envelope::default()
            },
            internal_date: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 11, 9, 30, 0).unwrap()
    }

    const RAW: &[u8] = b"Subject: [EXT] Budget\r\n\
        Message-ID: <m1@example.com>\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        Numbers attached.\r\n";

    #[test]
    fn test_extend_prefix() {
        assert_eq!(extend_prefix("Email:", "Work"), "Email: Work:");
        assert_eq!(extend_prefix("", "Work"), "Work:");
    }

    #[test]
    fn test_build_initial_relay() {
        let outgoing = build_relay(
            RAW,
            &meta(None),
            RelayDecision::InitialRelay,
            "Email: Work:",
            &settings(),
            now(),
        );
        assert_eq!(outgoing.to, vec!["tasks@example.net".to_string()]);
        assert_eq!(outgoing.subject, "=?UTF-8?Q?Email=3A=20Work=3A=20Budget?=");
        assert_eq!(
            outgoing.body,
            b"message:<m1@example.com>\r\n\r\nNumbers attached.\r\n"
        );
        assert_eq!(outgoing.content_type, "text/plain");
    }

    #[test]
    fn test_build_reminder_relay() {
        let outgoing = build_relay(
            RAW,
            &meta(Some("<env@example.com>")),
            RelayDecision::ReminderRelay,
            "Email:",
            &settings(),
            now(),
        );
        assert_eq!(
            outgoing.subject,
            "=?UTF-8?Q?REMINDER=20Email=3A=20Budget?="
        );
        assert!(outgoing.body.starts_with(b"message:<env@example.com>"));
    }

    #[test]
    fn test_sender_placeholder() {
        let outgoing = build_relay(
            RAW,
            &meta(None),
            RelayDecision::InitialRelay,
            "Respond to {sender} regarding:",
            &settings(),
            now(),
        );
        assert_eq!(
            outgoing.subject,
            "=?UTF-8?Q?Respond=20to=20Bob=20regarding=3A=20Budget?="
        );
    }

    #[test]
    fn test_html_entities_decoded() {
        let raw = b"Subject: Q&amp;A notes\r\nMessage-ID: <qa@example.com>\r\n\r\nhi\r\n";
        let mut settings = settings();
        settings.reminder_prefix = "&gt;&gt; REMINDER".into();
        let outgoing = build_relay(
            raw,
            &meta(None),
            RelayDecision::ReminderRelay,
            "R&amp;D:",
            &settings,
            now(),
        );
        assert_eq!(
            outgoing.subject,
            "=?UTF-8?Q?=3E=3E=20REMINDER=20R=26D=3A=20Q=26A=20notes?="
        );
    }

    #[test]
    fn test_no_message_id_leaves_body() {
        let raw = b"Subject: hi\r\n\r\nbody\r\n";
        let outgoing = build_relay(
            raw,
            &meta(None),
            RelayDecision::InitialRelay,
            "",
            &settings(),
            now(),
        );
        assert_eq!(outgoing.body, b"body\r\n");
    }

    #[test]
    fn test_report_totals() {
        let report = RelayReport {
            mailboxes: vec![
                MailboxReport {
                    relayed: 2,
                    failed: 1,
                    ..MailboxReport::default()
                },
                MailboxReport {
                    reminded: 1,
                    uncommitted: 1,
                    ..MailboxReport::default()
                },
            ],
        };
        assert_eq!(report.sent(), 3);
        assert_eq!(report.failed(), 2);
    }
}
