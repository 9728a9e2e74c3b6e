//! Message flags.
//!
//! Relay progress is stored on the server as flags, so the flag set of a
//! message is the only durable relay state.

/// Keyword recording that a message was relayed.
pub const SENT_TO_RELAY_KEYWORD: &str = "SentToMailDrop";

/// Keyword recording that a reminder was relayed.
pub const SENT_REMINDER_KEYWORD: &str = "SentReminderToMailDrop";

/// Message flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message is marked for deletion.
    Deleted,
    /// Message is flagged for special attention.
    Flagged,
    /// Message has been relayed to the task inbox.
    SentToRelay,
    /// A reminder for the message has been relayed.
    SentReminder,
    /// Any other system flag or keyword, left untouched.
    Other(String),
}

impl Flag {
    /// Parses a flag string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\DELETED" => Self::Deleted,
            "\\FLAGGED" => Self::Flagged,
            _ if s.eq_ignore_ascii_case(SENT_TO_RELAY_KEYWORD) => Self::SentToRelay,
            _ if s.eq_ignore_ascii_case(SENT_REMINDER_KEYWORD) => Self::SentReminder,
            _ => Self::Other(s.to_string()),
        }
    }

    /// Returns the flag as an IMAP string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Deleted => "\\Deleted",
            Self::Flagged => "\\Flagged",
            Self::SentToRelay => SENT_TO_RELAY_KEYWORD,
            Self::SentReminder => SENT_REMINDER_KEYWORD,
            Self::Other(s) => s,
        }
    }

    /// Returns true for keywords (flags without a leading backslash).
    #[must_use]
    pub fn is_keyword(&self) -> bool {
        !self.as_str().starts_with('\\')
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Collection of message flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    flags: Vec<Flag>,
}

impl Flags {
    /// Creates an empty flags collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flag.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Removes a flag.
    pub fn remove(&mut self, flag: &Flag) {
        self.flags.retain(|f| f != flag);
    }

    /// Returns true if the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Returns true if the message is flagged.
    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.contains(&Flag::Flagged)
    }

    /// Returns true if the message is marked for deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.contains(&Flag::Deleted)
    }

    /// Returns true if the message carries any relay bookkeeping flag.
    #[must_use]
    pub fn has_relay_flags(&self) -> bool {
        self.contains(&Flag::SentToRelay) || self.contains(&Flag::SentReminder)
    }

    /// Applies a delta: additions first, then removals.
    pub fn apply(&mut self, delta: &FlagDelta) {
        for flag in &delta.add {
            self.insert(flag.clone());
        }
        for flag in &delta.remove {
            self.remove(flag);
        }
    }

    /// Returns an iterator over the flags.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Returns the number of flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Returns true if there are no flags.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(iter: I) -> Self {
        let mut flags = Self::new();
        for flag in iter {
            flags.insert(flag);
        }
        flags
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::vec::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}

/// A set of flag additions and removals to store on one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagDelta {
    /// Flags to add.
    pub add: Vec<Flag>,
    /// Flags to remove.
    pub remove: Vec<Flag>,
}

impl FlagDelta {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a flag to set.
    #[must_use]
    pub fn add(mut self, flag: Flag) -> Self {
        self.add.push(flag);
        self
    }

    /// Adds a flag to clear.
    #[must_use]
    pub fn remove(mut self, flag: Flag) -> Self {
        self.remove.push(flag);
        self
    }

    /// Returns true if the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_delta() {
        let mut flags: Flags = [Flag::Seen, Flag::SentToRelay].into_iter().collect();
        flags.apply(
            &FlagDelta::new()
                .add(Flag::SentReminder)
                .remove(Flag::SentToRelay),
        );
        assert!(flags.contains(&Flag::SentReminder));
        assert!(!flags.contains(&Flag::SentToRelay));
        assert!(flags.contains(&Flag::Seen));
        assert!(FlagDelta::new().is_empty());
    }

    #[test]
    fn parse_system_flags() {
        assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
        assert_eq!(Flag::parse("\\FLAGGED"), Flag::Flagged);
        assert_eq!(Flag::parse("\\deleted"), Flag::Deleted);
    }

    #[test]
    fn parse_relay_keywords() {
        assert_eq!(Flag::parse("SentToMailDrop"), Flag::SentToRelay);
        assert_eq!(Flag::parse("sentremindertomaildrop"), Flag::SentReminder);
        assert_eq!(Flag::parse("$Label1"), Flag::Other("$Label1".to_string()));
    }

    #[test]
    fn as_str_round_trips() {
        for flag in [
            Flag::Seen,
            Flag::Deleted,
            Flag::Flagged,
            Flag::SentToRelay,
            Flag::SentReminder,
        ] {
            assert_eq!(Flag::parse(flag.as_str()), flag);
        }
    }

    #[test]
    fn keywords() {
        assert!(Flag::SentToRelay.is_keyword());
        assert!(!Flag::Seen.is_keyword());
    }

    #[test]
    fn insert_unique() {
        let mut flags = Flags::new();
        flags.insert(Flag::Seen);
        flags.insert(Flag::Seen);
        assert_eq!(flags.len(), 1);
    }

    #[test]
    fn remove() {
        let mut flags: Flags = [Flag::Seen, Flag::Flagged].into_iter().collect();
        flags.remove(&Flag::Seen);
        assert!(!flags.contains(&Flag::Seen));
        assert!(flags.is_flagged());
    }

    #[test]
    fn relay_flags() {
        assert!(!Flags::new().has_relay_flags());
        let flags: Flags = [Flag::SentReminder].into_iter().collect();
        assert!(flags.has_relay_flags());
    }
}
