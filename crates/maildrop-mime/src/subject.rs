//! Subject line rewriting for relayed messages.

use crate::encoding::{encode_q_word, strip_encoded_words};

/// Prefixes placed in front of a rewritten subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectContext {
    prefix: String,
    reminder_prefix: Option<String>,
}

impl SubjectContext {
    /// Creates a context with the given prefix (e.g. `"Respond to Bob regarding:"`).
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            reminder_prefix: None,
        }
    }

    /// Adds the escalation prefix used for reminder relays.
    #[must_use]
    pub fn with_reminder(mut self, reminder_prefix: impl Into<String>) -> Self {
        self.reminder_prefix = Some(reminder_prefix.into());
        self
    }

    /// Returns the context prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true if this is a reminder context.
    #[must_use]
    pub const fn is_reminder(&self) -> bool {
        self.reminder_prefix.is_some()
    }

    /// Places the reminder prefix, then the context prefix, in front of `core`.
    ///
    /// Each prefix is trimmed and separated by a single space; a non-empty
    /// prefix is always followed by a space, even when `core` is empty.
    #[must_use]
    pub fn compose(&self, core: &str) -> String {
        let prefixes: Vec<&str> = [self.reminder_prefix.as_deref(), Some(self.prefix.as_str())]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if prefixes.is_empty() {
            core.to_string()
        } else {
            format!("{} {core}", prefixes.join(" "))
        }
    }
}

/// Rewrites a subject for relay and returns the encoded header value.
///
/// Strips a leading `Subject:` label and any encoded-word wrappers, removes
/// `scrub_words`, prepends the context prefixes and wraps the result as one
/// `=?UTF-8?Q?...?=` encoded-word. The `?` characters of the subject are
/// escaped to `=3F` by the encoding pass.
#[must_use]
pub fn rewrite(subject: &str, scrub_words: &[String], context: &SubjectContext) -> String {
    let core = clean(subject, scrub_words);
    encode_q_word(&context.compose(&core))
}

/// Returns the subject text with label, encoded-word wrappers and scrub
/// words removed.
#[must_use]
pub fn clean(subject: &str, scrub_words: &[String]) -> String {
    let subject = strip_label(subject);
    let mut text = strip_encoded_words(subject);

    for word in scrub_words.iter().filter(|w| !w.trim().is_empty()) {
        text = remove_word(&text, word.trim());
    }

    text.trim().to_string()
}

fn strip_label(subject: &str) -> &str {
    const LABEL: &str = "Subject:";

    let trimmed = subject.trim_start();
    match trimmed.get(..LABEL.len()) {
        Some(label) if label.eq_ignore_ascii_case(LABEL) => trimmed[LABEL.len()..].trim_start(),
        _ => trimmed,
    }
}

/// Removes every ASCII case-insensitive occurrence of `word` together with
/// the whitespace that follows it.
fn remove_word(text: &str, word: &str) -> String {
    let needle = word.to_ascii_lowercase();
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    // ASCII lowercasing keeps byte offsets aligned with the original
    while let Some(pos) = rest.to_ascii_lowercase().find(&needle) {
        result.push_str(&rest[..pos]);
        rest = rest[pos + needle.len()..].trim_start();
    }

    result.push_str(rest);
    result
}
