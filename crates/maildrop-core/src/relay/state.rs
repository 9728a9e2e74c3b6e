//! Flag-driven relay state machine.
//!
//! A message moves through three states, recorded only in its flags:
//!
//! ```text
//! Untouched --commit_initial--> Relayed --commit_reminder--> Reminded
//!             (+SentToRelay, +Flagged)     (+SentReminder, -SentToRelay)
//! ```
//!
//! Every function here is pure. The orchestrator asks the server for
//! candidates with the matching [`SearchCriteria`] and then re-checks each
//! one with [`classify`].

use chrono::{NaiveDate, TimeDelta};

use crate::flags::{Flag, FlagDelta, Flags};
use crate::transport::SearchCriteria;

/// Relay progress of a message, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Never relayed.
    Untouched,
    /// Relayed once; a reminder may follow.
    Relayed,
    /// Reminder relayed; nothing further is sent.
    Reminded,
}

impl RelayState {
    /// Derives the state from a flag set.
    #[must_use]
    pub fn from_flags(flags: &Flags) -> Self {
        if flags.contains(&Flag::SentReminder) {
            Self::Reminded
        } else if flags.contains(&Flag::SentToRelay) {
            Self::Relayed
        } else {
            Self::Untouched
        }
    }
}

/// What to do with a candidate message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDecision {
    /// Leave the message alone.
    Skip,
    /// Relay for the first time.
    InitialRelay,
    /// Relay again with the reminder prefix.
    ReminderRelay,
}

/// Per-account selection policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayPolicy {
    /// Only relay messages that carry `\Flagged`.
    pub require_flagged: bool,
    /// Reminder thresholds in days; empty disables reminders.
    pub reminder_days: Vec<u32>,
}

/// Returns true if the message is due for its first relay.
#[must_use]
pub fn select_initial(flags: &Flags, policy: &RelayPolicy) -> bool {
    !flags.is_deleted()
        && (!policy.require_flagged || flags.is_flagged())
        && !flags.has_relay_flags()
}

/// Returns true if the message is old enough for a reminder relay.
#[must_use]
pub fn select_reminder(flags: &Flags, age: TimeDelta, policy: &RelayPolicy) -> bool {
    (flags.is_flagged() || flags.contains(&Flag::SentToRelay))
        && !flags.is_deleted()
        && !flags.contains(&Flag::SentReminder)
        && policy
            .reminder_days
            .iter()
            .any(|days| age >= TimeDelta::days(i64::from(*days)))
}

/// Decides what to do with a message. Initial relay wins over reminder.
#[must_use]
pub fn classify(flags: &Flags, age: TimeDelta, policy: &RelayPolicy) -> RelayDecision {
    if select_initial(flags, policy) {
        RelayDecision::InitialRelay
    } else if select_reminder(flags, age, policy) {
        RelayDecision::ReminderRelay
    } else {
        RelayDecision::Skip
    }
}

/// Flags stored after a successful first relay.
#[must_use]
pub fn commit_initial() -> FlagDelta {
    FlagDelta::new().add(Flag::SentToRelay).add(Flag::Flagged)
}

/// Flags stored after a successful reminder relay.
#[must_use]
pub fn commit_reminder() -> FlagDelta {
    FlagDelta::new()
        .add(Flag::SentReminder)
        .remove(Flag::SentToRelay)
}

/// Returns the delta to store after relaying with `decision`.
#[must_use]
pub fn commit(decision: RelayDecision) -> FlagDelta {
    match decision {
        RelayDecision::Skip => FlagDelta::new(),
        RelayDecision::InitialRelay => commit_initial(),
        RelayDecision::ReminderRelay => commit_reminder(),
    }
}

/// Server-side equivalent of [`select_initial`].
#[must_use]
pub fn initial_criteria(policy: &RelayPolicy) -> SearchCriteria {
    let mut criteria = vec![SearchCriteria::Undeleted];
    if policy.require_flagged {
        criteria.push(SearchCriteria::Flagged);
    }
    criteria.push(SearchCriteria::not(SearchCriteria::has_flag(
        &Flag::SentToRelay,
    )));
    criteria.push(SearchCriteria::not(SearchCriteria::has_flag(
        &Flag::SentReminder,
    )));
    SearchCriteria::And(criteria)
}

/// Server-side equivalent of [`select_reminder`] for one cutoff day.
#[must_use]
pub fn reminder_criteria(cutoff: NaiveDate) -> SearchCriteria {
    SearchCriteria::And(vec![
        SearchCriteria::or(
            SearchCriteria::Flagged,
            SearchCriteria::has_flag(&Flag::SentToRelay),
        ),
        SearchCriteria::Undeleted,
        SearchCriteria::not(SearchCriteria::has_flag(&Flag::SentReminder)),
        SearchCriteria::Before(cutoff),
    ])
}

/// Returns one cutoff day per reminder threshold, counted back from `today`.
#[must_use]
pub fn reminder_cutoffs(policy: &RelayPolicy, today: NaiveDate) -> Vec<NaiveDate> {
    policy
        .reminder_days
        .iter()
        .filter_map(|days| today.checked_sub_signed(TimeDelta::days(i64::from(*days))))
        .collect()
}
