//! Transfer-encoding and header encoding utilities.
//!
//! Supports Base64 (with line wrapping), Quoted-Printable and the RFC 2047
//! `Q` encoded-word form used for rewritten subjects.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

/// Line length used when wrapping Base64 bodies.
const BASE64_LINE_LENGTH: usize = 76;

/// Maximum physical line length produced by the Quoted-Printable encoder,
/// soft-break marker included.
pub const QP_LINE_LIMIT: usize = 74;

/// Encodes data as Base64 on a single line.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 wrapped at 76 columns with CRLF line breaks.
///
/// The result carries no trailing line break.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / BASE64_LINE_LENGTH * 2);
    let mut start = 0;

    while start < encoded.len() {
        let end = (start + BASE64_LINE_LENGTH).min(encoded.len());
        if start > 0 {
            result.push_str("\r\n");
        }
        // Base64 output is pure ASCII, so byte slicing is safe.
        result.push_str(&encoded[start..end]);
        start = end;
    }

    result
}

/// Decodes Base64 data, ignoring any whitespace and line folding.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(cleaned).map_err(Into::into)
}

/// Encodes bytes using Quoted-Printable encoding (RFC 2045).
///
/// Line breaks in the input (`\r\n` or bare `\n`) become hard CRLF breaks.
/// Literal `=`, control bytes and non-ASCII bytes are escaped as `=XX`, and
/// soft line breaks (`=\r\n`) keep every output line within
/// [`QP_LINE_LIMIT`] characters.
#[must_use]
pub fn encode_quoted_printable(data: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";

    let mut result = String::with_capacity(data.len() * 3 / 2);
    let mut line_length = 0;
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];

        if byte == b'\r' && data.get(i + 1) == Some(&b'\n') {
            result.push_str("\r\n");
            line_length = 0;
            i += 2;
            continue;
        }
        if byte == b'\n' {
            result.push_str("\r\n");
            line_length = 0;
            i += 1;
            continue;
        }

        // Whitespace right before a line break must be escaped
        let at_line_end = matches!(data.get(i + 1), None | Some(b'\r' | b'\n'));
        let literal = match byte {
            b'!'..=b'<' | b'>'..=b'~' => true,
            b' ' | b'\t' => !at_line_end,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        // Leave room for the trailing '=' of a soft break
        if line_length + width + 1 > QP_LINE_LIMIT {
            result.push_str("=\r\n");
            line_length = 0;
        }

        if literal {
            result.push(char::from(byte));
        } else {
            result.push('=');
            result.push(char::from(HEX[usize::from(byte >> 4)]));
            result.push(char::from(HEX[usize::from(byte & 0x0F)]));
        }
        line_length += width;
        i += 1;
    }

    result
}

/// Decodes Quoted-Printable text (RFC 2045).
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(data: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(data.len());
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte != b'=' {
            result.push(byte);
            i += 1;
            continue;
        }

        // Soft line break
        match (data.get(i + 1), data.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => {
                i += 3;
                continue;
            }
            (Some(b'\n'), _) => {
                i += 2;
                continue;
            }
            _ => {}
        }

        let hex = data
            .get(i + 1..i + 3)
            .ok_or_else(|| Error::InvalidEncoding("Incomplete escape sequence".to_string()))?;
        let hex = std::str::from_utf8(hex)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        let value = u8::from_str_radix(hex, 16)
            .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
        result.push(value);
        i += 3;
    }

    Ok(result)
}

/// Wraps text as a single UTF-8 `Q` encoded-word.
///
/// Every non-alphanumeric character is percent-encoded and the `%XX` escapes
/// are rewritten to `=XX`, so structurally significant characters such as
/// `?`, `=` and `_` never appear literally inside the word.
#[must_use]
pub fn encode_q_word(text: &str) -> String {
    let escaped = utf8_percent_encode(text, NON_ALPHANUMERIC)
        .to_string()
        .replace('%', "=");
    format!("=?UTF-8?Q?{escaped}?=")
}

/// Strips RFC 2047 encoded-word wrappers (`=?charset?X?text?=`), keeping
/// their encoded text as-is.
///
/// Only the wrapper syntax is removed; the inner text is not decoded.
/// Sequences that merely look like the start of a wrapper are kept.
#[must_use]
pub fn strip_encoded_words(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("=?") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match encoded_word_inner(after) {
            Some((inner, consumed)) => {
                result.push_str(inner);
                rest = &after[consumed..];
            }
            None => {
                result.push_str("=?");
                rest = after;
            }
        }
    }

    result.push_str(rest);
    result
}

/// Matches `charset?X?text?=` and returns the text plus consumed length.
fn encoded_word_inner(s: &str) -> Option<(&str, usize)> {
    let charset_end = s.find('?')?;
    let charset = &s[..charset_end];
    if charset.is_empty() || charset.contains(char::is_whitespace) {
        return None;
    }

    let after_charset = &s[charset_end + 1..];
    let mut chars = after_charset.chars();
    let encoding = chars.next()?;
    if !matches!(encoding, 'Q' | 'q' | 'B' | 'b') || chars.next()? != '?' {
        return None;
    }

    let text_start = charset_end + 3;
    let text_len = s[text_start..].find("?=")?;
    Some((&s[text_start..text_start + text_len], text_start + text_len + 2))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_base64_encode_decode() {
        let data = b"Hello, World!";
        let encoded = encode_base64(data);
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");

        let decoded = decode_base64(encoded.as_bytes()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_base64_decode_ignores_folding() {
        let decoded = decode_base64(b"SGVs\r\nbG8=\r\n").unwrap();
        assert_eq!(decoded, b"Hello");
    }

    #[test]
    fn test_base64_wrapped_line_length() {
        let data = vec![b'a'; 200];
        let encoded = encode_base64_wrapped(&data);
        assert!(encoded.split("\r\n").all(|line| line.len() <= 76));
        assert!(!encoded.ends_with("\r\n"));
        assert_eq!(decode_base64(encoded.as_bytes()).unwrap(), data);
    }

    #[test]
    fn test_quoted_printable_encode() {
        assert_eq!(encode_quoted_printable(b"Hello, World!"), "Hello, World!");
        assert_eq!(encode_quoted_printable(b"a=b"), "a=3Db");

        let encoded = encode_quoted_printable("Héllo".as_bytes());
        assert_eq!(encoded, "H=C3=A9llo");
    }

    #[test]
    fn test_quoted_printable_hard_breaks() {
        assert_eq!(encode_quoted_printable(b"one\ntwo\r\n"), "one\r\ntwo\r\n");
    }

    #[test]
    fn test_quoted_printable_trailing_space_escaped() {
        assert_eq!(encode_quoted_printable(b"end \r\nnext"), "end=20\r\nnext");
    }

    #[test]
    fn test_quoted_printable_soft_breaks() {
        let text = "=".repeat(60);
        let encoded = encode_quoted_printable(text.as_bytes());
        for line in encoded.split("\r\n") {
            assert!(line.len() <= QP_LINE_LIMIT, "line too long: {line}");
        }
        // Escapes are never split across a soft break
        for line in encoded.split("=\r\n") {
            assert_eq!(line.len() % 3, 0);
        }
        assert_eq!(decode_quoted_printable(encoded.as_bytes()).unwrap(), text.as_bytes());
    }

    #[test]
    fn test_quoted_printable_decode() {
        assert_eq!(decode_quoted_printable(b"H=C3=A9llo").unwrap(), "Héllo".as_bytes());
        assert_eq!(decode_quoted_printable(b"Hello=\r\nWorld").unwrap(), b"HelloWorld");
        assert!(decode_quoted_printable(b"bad=4").is_err());
    }

    #[test]
    fn test_q_word() {
        assert_eq!(encode_q_word("Hi"), "=?UTF-8?Q?Hi?=");
        assert_eq!(encode_q_word("a b?"), "=?UTF-8?Q?a=20b=3F?=");
        assert_eq!(encode_q_word("é"), "=?UTF-8?Q?=C3=A9?=");
    }

    #[test]
    fn test_strip_encoded_words() {
        assert_eq!(strip_encoded_words("=?UTF-8?Q?Hi?="), "Hi");
        assert_eq!(strip_encoded_words("Re: =?utf-8?B?SMOp?= x"), "Re: SMOp x");
        assert_eq!(strip_encoded_words("a =? b"), "a =? b");
        assert_eq!(strip_encoded_words("plain"), "plain");
    }

    proptest! {
        #[test]
        fn quoted_printable_lines_stay_short(data in proptest::collection::vec(any::<u8>(), 0..400)) {
            let encoded = encode_quoted_printable(&data);
            for line in encoded.split("\r\n") {
                prop_assert!(line.len() <= QP_LINE_LIMIT);
            }
        }
    }
}
