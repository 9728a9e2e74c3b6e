//! MIME content type and disposition handling.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters (e.g., charset=utf-8, boundary=xxx).
    pub parameters: HashMap<String, String>,
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Creates the `text/plain; charset=UTF-8` type assumed for parts that
    /// declare no usable content type.
    #[must_use]
    pub fn text_plain() -> Self {
        Self::new("text", "plain").with_parameter("charset", "UTF-8")
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameters.get("charset").map(String::as_str)
    }

    /// Returns the boundary parameter if present and non-empty.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameters
            .get("boundary")
            .map(String::as_str)
            .filter(|b| !b.is_empty())
    }

    /// Returns the file name carried by a `filename` or `name` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters
            .get("filename")
            .or_else(|| self.parameters.get("name"))
            .map(String::as_str)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is `text/plain`.
    #[must_use]
    pub fn is_text_plain(&self) -> bool {
        self.main_type == "text" && self.sub_type == "plain"
    }

    /// Checks if this is `text/html`.
    #[must_use]
    pub fn is_text_html(&self) -> bool {
        self.main_type == "text" && self.sub_type == "html"
    }

    /// Parses a content type string.
    ///
    /// Format: `type/subtype; param1=value1; param2="value 2"`
    ///
    /// # Errors
    ///
    /// Returns an error if the format is invalid.
    pub fn parse(s: &str) -> Result<Self> {
        let (type_str, params) = s.split_once(';').unwrap_or((s, ""));

        let (main_type, sub_type) = type_str
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::InvalidContentType(format!("Missing subtype in {s:?}")))?;

        let main_type = main_type.trim().to_lowercase();
        let sub_type = sub_type.trim().to_lowercase();
        if main_type.is_empty() || sub_type.is_empty() {
            return Err(Error::InvalidContentType(format!("Empty type in {s:?}")));
        }

        Ok(Self {
            main_type,
            sub_type,
            parameters: parse_parameters(params),
        })
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let main = &self.main_type;
        let sub = &self.sub_type;
        write!(f, "{main}/{sub}")?;

        let mut params: Vec<_> = self.parameters.iter().collect();
        params.sort();
        for (key, value) in params {
            // Quote value if it contains special characters
            if value.contains(|c: char| c.is_whitespace() || "()<>@,;:\\\"/[]?=".contains(c)) {
                write!(f, "; {key}=\"{value}\"")?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }

        Ok(())
    }
}

/// Content-Disposition header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type, lowercased ("inline", "attachment", ...).
    pub kind: String,
    /// Parameters (e.g., filename).
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a content disposition string such as
    /// `attachment; filename="report.pdf"`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let (kind, params) = s.split_once(';').unwrap_or((s, ""));
        Self {
            kind: kind.trim().to_lowercase(),
            parameters: parse_parameters(params),
        }
    }

    /// Returns true for the `attachment` disposition.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        self.kind == "attachment"
    }

    /// Returns the `filename` parameter if present.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }
}

/// Parses `; key=value; key2="quoted; value"` parameter lists.
///
/// Keys are lowercased, values keep their case. Semicolons inside quoted
/// values do not split parameters.
fn parse_parameters(s: &str) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in s.chars().chain(std::iter::once(';')) {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => {
                if let Some((key, value)) = current.split_once('=') {
                    let key = key.trim().to_lowercase();
                    let value = value.trim().trim_matches('"').to_string();
                    if !key.is_empty() {
                        parameters.insert(key, value);
                    }
                }
                current.clear();
            }
            _ => current.push(c),
        }
    }

    parameters
}
