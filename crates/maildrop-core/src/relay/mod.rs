//! Relay of task mailbox messages to the task inbox.
//!
//! [`state`] decides from flags and age whether a message is due,
//! [`orchestrator`] walks the mailboxes and sends, and [`outgoing`] builds
//! the submitted message.

pub mod orchestrator;
pub mod outgoing;
pub mod state;

pub use orchestrator::{MailboxReport, RelayReport, RelaySettings, build_relay, relay_mailboxes};
pub use outgoing::OutgoingMessage;
pub use state::{
    RelayDecision, RelayPolicy, RelayState, classify, commit_initial, commit_reminder,
    select_initial, select_reminder,
};
