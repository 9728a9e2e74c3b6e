//! MIME tree parsing and serialization.
//!
//! A message body is parsed into a [`MimeTree`]: multipart containers keep
//! their boundary, preamble, epilogue and the raw header block of every
//! child, so an untouched tree serializes back to the exact input bytes.

use crate::content_type::{ContentDisposition, ContentType};
use crate::header::Headers;
use std::fmt;

/// Multipart nesting deeper than this is kept as an opaque leaf.
const MAX_DEPTH: usize = 32;

/// Separator between a part's header block and its body.
const BLANK_LINE: &[u8] = b"\r\n\r\n";

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// A single body part with its declared type and raw (still encoded) body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Leaf {
    /// Declared content type, or `text/plain; charset=UTF-8` when absent.
    pub content_type: ContentType,
    /// Declared transfer encoding.
    pub transfer_encoding: TransferEncoding,
    /// Body bytes exactly as they appeared in the source.
    pub body: Vec<u8>,
    /// File name from Content-Disposition or Content-Type.
    pub filename: Option<String>,
    /// Whether the part is an attachment.
    pub attachment: bool,
}

impl Leaf {
    fn from_headers(headers: &Headers, content_type: Option<ContentType>, body: Vec<u8>) -> Self {
        let content_type = content_type.unwrap_or_else(ContentType::text_plain);
        let transfer_encoding = headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse);
        let disposition = headers
            .get("content-disposition")
            .map(ContentDisposition::parse);

        let filename = disposition
            .as_ref()
            .and_then(ContentDisposition::filename)
            .or_else(|| content_type.filename())
            .map(str::to_string);
        let attachment =
            filename.is_some() || disposition.as_ref().is_some_and(ContentDisposition::is_attachment);

        Self {
            content_type,
            transfer_encoding,
            body,
            filename,
            attachment,
        }
    }

    /// Returns true for non-attachment `text/plain` or `text/html` parts.
    #[must_use]
    pub fn is_text(&self) -> bool {
        !self.attachment && (self.content_type.is_text_plain() || self.content_type.is_text_html())
    }
}

/// A child of a multipart container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Raw header block, including the blank line that ends it.
    pub header: Vec<u8>,
    /// Parsed content.
    pub node: MimeNode,
}

/// A multipart container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multipart {
    /// Boundary token (without the leading `--`).
    pub boundary: String,
    /// Bytes before the first delimiter.
    pub preamble: Vec<u8>,
    /// Child parts in source order.
    pub parts: Vec<Part>,
    /// Bytes after the closing delimiter, or `None` if it was never seen.
    pub epilogue: Option<Vec<u8>>,
}

/// A node of the MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MimeNode {
    /// Multipart container.
    Multipart(Multipart),
    /// Body part.
    Leaf(Leaf),
}

impl MimeNode {
    /// Appends the serialized node to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Self::Leaf(leaf) => out.extend_from_slice(&leaf.body),
            Self::Multipart(multipart) => {
                let marker = format!("--{}", multipart.boundary);
                out.extend_from_slice(&multipart.preamble);
                for part in &multipart.parts {
                    out.extend_from_slice(marker.as_bytes());
                    out.extend_from_slice(b"\r\n");
                    out.extend_from_slice(&part.header);
                    part.node.write_to(out);
                }
                if let Some(epilogue) = &multipart.epilogue {
                    out.extend_from_slice(marker.as_bytes());
                    out.extend_from_slice(b"--");
                    out.extend_from_slice(epilogue);
                }
            }
        }
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a Leaf>) {
        match self {
            Self::Leaf(leaf) => leaves.push(leaf),
            Self::Multipart(multipart) => {
                for part in &multipart.parts {
                    part.node.collect_leaves(leaves);
                }
            }
        }
    }
}

/// Parsed MIME structure of a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeTree {
    root: MimeNode,
}

impl MimeTree {
    /// Parses a body using the headers that describe it.
    ///
    /// Only `Content-Type`, `Content-Transfer-Encoding` and
    /// `Content-Disposition` are consulted. Parsing never fails: malformed
    /// segments are dropped and missing metadata falls back to defaults.
    #[must_use]
    pub fn parse(headers: &Headers, body: &[u8]) -> Self {
        Self {
            root: parse_node(headers, body, 0),
        }
    }

    /// Wraps an existing root node.
    #[must_use]
    pub const fn from_root(root: MimeNode) -> Self {
        Self { root }
    }

    /// Returns the root node.
    #[must_use]
    pub const fn root(&self) -> &MimeNode {
        &self.root
    }

    /// Consumes the tree and returns its root node.
    #[must_use]
    pub fn into_root(self) -> MimeNode {
        self.root
    }

    /// Serializes the tree back to body bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.root.write_to(&mut out);
        out
    }

    /// Returns all leaves in depth-first order.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut leaves = Vec::new();
        self.root.collect_leaves(&mut leaves);
        leaves
    }

    /// Returns the number of leaves that annotation applies to.
    #[must_use]
    pub fn text_leaf_count(&self) -> usize {
        self.leaves().into_iter().filter(|leaf| leaf.is_text()).count()
    }
}

fn parse_node(headers: &Headers, body: &[u8], depth: usize) -> MimeNode {
    let content_type = headers
        .get("content-type")
        .and_then(|value| ContentType::parse(value).ok());

    if depth < MAX_DEPTH
        && let Some(boundary) = content_type.as_ref().and_then(ContentType::boundary)
    {
        return MimeNode::Multipart(parse_multipart(boundary, body, depth));
    }

    MimeNode::Leaf(Leaf::from_headers(headers, content_type, body.to_vec()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    /// `--boundary\r\n`
    Open,
    /// `--boundary--`
    Close,
}

fn parse_multipart(boundary: &str, body: &[u8], depth: usize) -> Multipart {
    let marker = format!("--{boundary}").into_bytes();
    let mut multipart = Multipart {
        boundary: boundary.to_string(),
        preamble: Vec::new(),
        parts: Vec::new(),
        epilogue: None,
    };

    let Some((mut pos, mut kind)) = next_delimiter(body, &marker, 0) else {
        // Declared multipart without any delimiter: keep the bytes untouched
        multipart.preamble = body.to_vec();
        return multipart;
    };
    multipart.preamble = body[..pos].to_vec();

    loop {
        // Both delimiter forms are the marker plus two bytes
        let start = pos + marker.len() + 2;
        if kind == Delimiter::Close {
            multipart.epilogue = Some(body[start..].to_vec());
            break;
        }

        let next = next_delimiter(body, &marker, start);
        let end = next.map_or(body.len(), |(p, _)| p);
        if let Some(part) = parse_part(&body[start..end], depth) {
            multipart.parts.push(part);
        }

        match next {
            Some((p, k)) => {
                pos = p;
                kind = k;
            }
            None => break,
        }
    }

    multipart
}

/// Splits one segment into its header block and body.
///
/// Returns `None` for empty segments and for segments whose header block
/// has no terminating blank line.
fn parse_part(segment: &[u8], depth: usize) -> Option<Part> {
    if segment.is_empty() {
        return None;
    }

    let header_len = if segment.starts_with(b"\r\n") {
        2
    } else {
        find(segment, BLANK_LINE, 0)? + BLANK_LINE.len()
    };

    let header = &segment[..header_len];
    let headers = Headers::parse_bytes(header);
    let node = parse_node(&headers, &segment[header_len..], depth + 1);

    Some(Part {
        header: header.to_vec(),
        node,
    })
}

/// Finds the next delimiter line at or after `from`.
fn next_delimiter(body: &[u8], marker: &[u8], from: usize) -> Option<(usize, Delimiter)> {
    let mut search = from;

    while let Some(pos) = find(body, marker, search) {
        let at_line_start = pos == 0 || body[..pos].ends_with(b"\n");
        let rest = &body[pos + marker.len()..];

        if at_line_start {
            if rest.starts_with(b"\r\n") {
                return Some((pos, Delimiter::Open));
            }
            if rest.starts_with(b"--") {
                return Some((pos, Delimiter::Close));
            }
        }
        search = pos + 1;
    }

    None
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn multipart_headers(boundary: &str) -> Headers {
        let mut headers = Headers::new();
        headers.add(
            "Content-Type",
            format!("multipart/alternative; boundary=\"{boundary}\""),
        );
        headers
    }

    fn two_part_body() -> Vec<u8> {
        concat!(
            "preamble\r\n",
            "--BDRY\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: 7bit\r\n",
            "\r\n",
            "Hello\r\n",
            "--BDRY\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "\r\n",
            "<p>Hello</p>\r\n",
            "--BDRY--\r\n",
            "epilogue\r\n"
        )
        .as_bytes()
        .to_vec()
    }

    #[test]
    fn test_transfer_encoding_parse() {
        assert_eq!(TransferEncoding::parse("7bit"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::parse(" BASE64 "), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse("quoted-printable"),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-unknown"), TransferEncoding::SevenBit);
    }

    #[test]
    fn test_single_part_defaults() {
        let tree = MimeTree::parse(&Headers::new(), b"Hello");
        let MimeNode::Leaf(leaf) = tree.root() else {
            panic!("expected leaf");
        };
        assert!(leaf.content_type.is_text_plain());
        assert_eq!(leaf.content_type.charset(), Some("UTF-8"));
        assert_eq!(leaf.transfer_encoding, TransferEncoding::SevenBit);
        assert!(leaf.is_text());
    }

    #[test]
    fn test_unparseable_content_type_defaults_to_text() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "nonsense");
        let tree = MimeTree::parse(&headers, b"x");
        assert_eq!(tree.text_leaf_count(), 1);
    }

    #[test]
    fn test_two_part_structure() {
        let body = two_part_body();
        let tree = MimeTree::parse(&multipart_headers("BDRY"), &body);

        let MimeNode::Multipart(multipart) = tree.root() else {
            panic!("expected multipart");
        };
        assert_eq!(multipart.boundary, "BDRY");
        assert_eq!(multipart.preamble, b"preamble\r\n");
        assert_eq!(multipart.parts.len(), 2);
        assert_eq!(multipart.epilogue.as_deref(), Some(&b"\r\nepilogue\r\n"[..]));

        let leaves = tree.leaves();
        assert!(leaves[0].content_type.is_text_plain());
        assert_eq!(leaves[0].body, b"Hello\r\n");
        assert!(leaves[1].content_type.is_text_html());
        assert_eq!(tree.to_bytes(), body);
    }

    #[test]
    fn test_nested_multipart() {
        let body = concat!(
            "--OUTER\r\n",
            "Content-Type: multipart/alternative; boundary=INNER\r\n",
            "\r\n",
            "--INNER\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "plain\r\n",
            "--INNER\r\n",
            "Content-Type: text/html\r\n",
            "\r\n",
            "<b>html</b>\r\n",
            "--INNER--\r\n",
            "\r\n",
            "--OUTER\r\n",
            "Content-Type: application/pdf\r\n",
            "Content-Disposition: attachment; filename=\"doc.pdf\"\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "JVBERi0=\r\n",
            "--OUTER--\r\n"
        )
        .as_bytes();
        let mut headers = Headers::new();
        headers.add("Content-Type", "multipart/mixed; boundary=OUTER");

        let tree = MimeTree::parse(&headers, body);
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 3);
        assert_eq!(tree.text_leaf_count(), 2);
        assert_eq!(leaves[2].filename.as_deref(), Some("doc.pdf"));
        assert!(leaves[2].attachment);
        assert_eq!(tree.to_bytes(), body);
    }

    fn nested_body(level: usize, levels: usize) -> String {
        if level == levels {
            return "deep text\r\n".to_string();
        }
        let inner_type = if level + 1 == levels {
            "text/plain".to_string()
        } else {
            format!("multipart/mixed; boundary=B{}", level + 1)
        };
        format!(
            "--B{level}\r\nContent-Type: {inner_type}\r\n\r\n{}\r\n--B{level}--\r\n",
            nested_body(level + 1, levels)
        )
    }

    #[test]
    fn test_nesting_beyond_limit_is_opaque() {
        let body = nested_body(0, MAX_DEPTH + 8);
        let mut headers = Headers::new();
        headers.add("Content-Type", "multipart/mixed; boundary=B0");
        let tree = MimeTree::parse(&headers, body.as_bytes());

        let mut node = tree.root();
        let mut containers = 0;
        while let MimeNode::Multipart(multipart) = node {
            containers += 1;
            node = &multipart.parts[0].node;
        }
        assert_eq!(containers, MAX_DEPTH);

        let MimeNode::Leaf(leaf) = node else {
            unreachable!();
        };
        let boundary = format!("B{MAX_DEPTH}");
        assert_eq!(leaf.content_type.boundary(), Some(boundary.as_str()));
        assert!(!leaf.is_text());
        assert!(leaf.body.starts_with(format!("--{boundary}\r\n").as_bytes()));
        assert_eq!(tree.text_leaf_count(), 0);

        let injected = crate::annotate::inject(
            &tree,
            &crate::annotate::AnnotationPayload::permalink("<deep@example.com>"),
        );
        assert_eq!(injected, tree);
        assert_eq!(tree.to_bytes(), body.as_bytes());
    }

    #[test]
    fn test_text_attachment_is_not_text() {
        let body = concat!(
            "--B\r\n",
            "Content-Type: text/plain; name=\"notes.txt\"\r\n",
            "\r\n",
            "notes\r\n",
            "--B--\r\n"
        )
        .as_bytes();
        let tree = MimeTree::parse(&multipart_headers("B"), body);
        assert_eq!(tree.leaves().len(), 1);
        assert_eq!(tree.text_leaf_count(), 0);
    }

    #[test]
    fn test_segment_without_blank_line_is_dropped() {
        let body = concat!(
            "--B\r\n",
            "Content-Type: text/plain\r\n",
            "no blank line here\r\n",
            "--B\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "kept\r\n",
            "--B--\r\n"
        )
        .as_bytes();
        let tree = MimeTree::parse(&multipart_headers("B"), body);
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].body, b"kept\r\n");
    }

    #[test]
    fn test_missing_delimiters_pass_through() {
        let body = b"no parts at all\r\n";
        let tree = MimeTree::parse(&multipart_headers("B"), body);
        assert!(tree.leaves().is_empty());
        assert_eq!(tree.to_bytes(), body);
    }

    #[test]
    fn test_unterminated_multipart() {
        let body = b"--B\r\nContent-Type: text/plain\r\n\r\nbody\r\n";
        let tree = MimeTree::parse(&multipart_headers("B"), body);
        assert_eq!(tree.leaves().len(), 1);
        assert_eq!(tree.to_bytes(), body);
    }

    #[test]
    fn test_boundary_text_inside_line_is_not_delimiter() {
        let body = b"--B\r\n\r\nsee --B\r\n in text\r\n--B--";
        let tree = MimeTree::parse(&multipart_headers("B"), body);
        let leaves = tree.leaves();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].body, b"see --B\r\n in text\r\n");
    }

    proptest! {
        #[test]
        fn untouched_tree_reproduces_input(
            bodies in proptest::collection::vec("[a-zA-Z0-9 .,=\r\n]{1,80}", 1..5),
            preamble in "[a-z ]{0,20}",
        ) {
            let mut body = preamble.into_bytes();
            if !body.is_empty() {
                body.extend_from_slice(b"\r\n");
            }
            for part in &bodies {
                body.extend_from_slice(b"--XYZ\r\nContent-Type: text/plain\r\n\r\n");
                body.extend_from_slice(part.as_bytes());
                body.extend_from_slice(b"\r\n");
            }
            body.extend_from_slice(b"--XYZ--\r\n");

            let tree = MimeTree::parse(&multipart_headers("XYZ"), &body);
            prop_assert_eq!(tree.leaves().len(), bodies.len());
            prop_assert_eq!(tree.to_bytes(), body);
        }
    }
}
