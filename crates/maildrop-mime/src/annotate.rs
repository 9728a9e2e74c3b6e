//! Permalink annotation of text parts.
//!
//! [`inject`] prepends an [`AnnotationPayload`] to every non-attachment
//! `text/plain` and `text/html` leaf of a [`MimeTree`], re-encoding the
//! result with the leaf's original transfer encoding. All other bytes of the
//! tree are carried over unchanged.

use crate::encoding::{decode_base64, encode_base64_wrapped, encode_quoted_printable};
use crate::error::Result;
use crate::tree::{Leaf, MimeNode, MimeTree, Multipart, Part, TransferEncoding};

/// Text injected at the top of each text part, rendered per content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationPayload {
    /// Text for `text/plain` parts.
    pub plain: String,
    /// Markup for `text/html` parts.
    pub html: String,
}

impl AnnotationPayload {
    /// Creates a payload from its two renderings.
    #[must_use]
    pub fn new(plain: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            plain: plain.into(),
            html: html.into(),
        }
    }

    /// Builds the `message:<id>` back-link for a Message-ID header value.
    ///
    /// Surrounding angle brackets in `message_id` are optional.
    #[must_use]
    pub fn permalink(message_id: &str) -> Self {
        let id = message_id
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>');
        let link = format!("message:<{id}>");
        let escaped = escape_html(&link);

        Self {
            plain: format!("{link}\r\n\r\n"),
            html: format!("<p><a href=\"{escaped}\">{escaped}</a></p>\r\n"),
        }
    }
}

/// Returns a copy of `tree` with `payload` injected into every text leaf.
///
/// Trees without text leaves come back unchanged. A base64 leaf whose body
/// does not decode is also left unchanged.
#[must_use]
pub fn inject(tree: &MimeTree, payload: &AnnotationPayload) -> MimeTree {
    MimeTree::from_root(inject_node(tree.root(), payload))
}

fn inject_node(node: &MimeNode, payload: &AnnotationPayload) -> MimeNode {
    match node {
        MimeNode::Leaf(leaf) => MimeNode::Leaf(annotate_leaf(leaf, payload)),
        MimeNode::Multipart(multipart) => MimeNode::Multipart(Multipart {
            boundary: multipart.boundary.clone(),
            preamble: multipart.preamble.clone(),
            parts: multipart
                .parts
                .iter()
                .map(|part| Part {
                    header: part.header.clone(),
                    node: inject_node(&part.node, payload),
                })
                .collect(),
            epilogue: multipart.epilogue.clone(),
        }),
    }
}

fn annotate_leaf(leaf: &Leaf, payload: &AnnotationPayload) -> Leaf {
    if !leaf.is_text() {
        return leaf.clone();
    }

    let prefix = if leaf.content_type.is_text_html() {
        &payload.html
    } else {
        &payload.plain
    };
    if prefix.is_empty() {
        return leaf.clone();
    }

    prepend(leaf.transfer_encoding, &leaf.body, prefix.as_bytes()).map_or_else(
        |_| leaf.clone(),
        |body| Leaf {
            body,
            ..leaf.clone()
        },
    )
}

/// Prepends `prefix` to an encoded body, keeping the body's encoding valid.
///
/// # Errors
///
/// Returns an error if a base64 body cannot be decoded.
pub fn prepend(encoding: TransferEncoding, body: &[u8], prefix: &[u8]) -> Result<Vec<u8>> {
    match encoding {
        TransferEncoding::QuotedPrintable => {
            let mut encoded = encode_quoted_printable(prefix);
            // Keep the original first line at its own length
            if !prefix.ends_with(b"\n") {
                encoded.push_str("=\r\n");
            }
            let mut out = encoded.into_bytes();
            out.extend_from_slice(body);
            Ok(out)
        }
        TransferEncoding::Base64 => {
            let mut data = prefix.to_vec();
            data.extend_from_slice(&decode_base64(body)?);
            let mut out = encode_base64_wrapped(&data).into_bytes();
            if body.ends_with(b"\n") {
                out.extend_from_slice(b"\r\n");
            }
            Ok(out)
        }
        TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
            let mut out = prefix.to_vec();
            out.extend_from_slice(body);
            Ok(out)
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::encoding::{QP_LINE_LIMIT, decode_base64, decode_quoted_printable};
    use crate::header::Headers;

    fn single_part(content_type: &str, encoding: &str, body: &[u8]) -> MimeTree {
        let mut headers = Headers::new();
        headers.add("Content-Type", content_type);
        headers.add("Content-Transfer-Encoding", encoding);
        MimeTree::parse(&headers, body)
    }

    fn only_leaf(tree: &MimeTree) -> &Leaf {
        let MimeNode::Leaf(leaf) = tree.root() else {
            panic!("expected leaf");
        };
        leaf
    }

    #[test]
    fn test_permalink_payload() {
        let payload = AnnotationPayload::permalink("<abc@example.com>");
        assert_eq!(payload.plain, "message:<abc@example.com>\r\n\r\n");
        assert_eq!(
            payload.html,
            "<p><a href=\"message:&lt;abc@example.com&gt;\">message:&lt;abc@example.com&gt;</a></p>\r\n"
        );
        assert_eq!(AnnotationPayload::permalink("abc@example.com"), payload);
    }

    #[test]
    fn test_base64_round_trip() {
        let tree = single_part("text/plain", "base64", b"SGVsbG8=");
        let annotated = inject(&tree, &AnnotationPayload::new("X", "<b>X</b>"));
        let leaf = only_leaf(&annotated);
        assert_eq!(decode_base64(&leaf.body).unwrap(), b"XHello");
        assert_eq!(leaf.transfer_encoding, TransferEncoding::Base64);
    }

    #[test]
    fn test_base64_keeps_trailing_line_break() {
        let tree = single_part("text/plain", "base64", b"SGVsbG8=\r\n");
        let annotated = inject(&tree, &AnnotationPayload::new("X", ""));
        assert!(only_leaf(&annotated).body.ends_with(b"\r\n"));
    }

    #[test]
    fn test_invalid_base64_left_unchanged() {
        let tree = single_part("text/plain", "base64", b"!!!not base64!!!");
        let annotated = inject(&tree, &AnnotationPayload::new("X", ""));
        assert_eq!(annotated, tree);
    }

    #[test]
    fn test_quoted_printable_escaping() {
        let tree = single_part("text/html", "quoted-printable", b"<p>body</p>\r\n");
        let payload = AnnotationPayload::permalink(&format!("<{}@example.com>", "x".repeat(80)));
        let annotated = inject(&tree, &payload);
        let body = String::from_utf8(only_leaf(&annotated).body.clone()).unwrap();

        assert!(body.contains("href=3D"));
        assert!(!body.contains("href=\""));
        for line in body.split("\r\n") {
            assert!(line.len() <= QP_LINE_LIMIT, "line too long: {line}");
        }
        let decoded = decode_quoted_printable(body.as_bytes()).unwrap();
        assert!(decoded.starts_with(payload.html.as_bytes()));
        assert!(decoded.ends_with(b"<p>body</p>\r\n"));
    }

    #[test]
    fn test_quoted_printable_prefix_without_line_break() {
        let tree = single_part("text/plain", "quoted-printable", b"first line\r\n");
        let annotated = inject(&tree, &AnnotationPayload::new("a=b", ""));
        assert_eq!(only_leaf(&annotated).body, b"a=3Db=\r\nfirst line\r\n");
    }

    #[test]
    fn test_seven_bit_plain_concatenation() {
        let tree = MimeTree::parse(&Headers::new(), b"Hello");
        let annotated = inject(&tree, &AnnotationPayload::new("X ", ""));
        assert_eq!(annotated.to_bytes(), b"X Hello");
    }

    #[test]
    fn test_two_part_fidelity() {
        let body = concat!(
            "--BDRY\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: 7bit\r\n",
            "\r\n",
            "Hello\r\n",
            "--BDRY\r\n",
            "Content-Type: text/html; charset=utf-8\r\n",
            "Content-Transfer-Encoding: 8bit\r\n",
            "\r\n",
            "<p>Hello</p>\r\n",
            "--BDRY--\r\n"
        );
        let mut headers = Headers::new();
        headers.add("Content-Type", "multipart/alternative; boundary=BDRY");
        let tree = MimeTree::parse(&headers, body.as_bytes());

        let payload = AnnotationPayload::new("PLAIN\r\n", "<i>HTML</i>\r\n");
        let output = String::from_utf8(inject(&tree, &payload).to_bytes()).unwrap();

        assert_eq!(output.matches("--BDRY\r\n").count(), 2);
        assert_eq!(output.matches("--BDRY--").count(), 1);
        assert_eq!(output.len(), body.len() + payload.plain.len() + payload.html.len());

        let expected = body
            .replace("\r\n\r\nHello", "\r\n\r\nPLAIN\r\nHello")
            .replace("\r\n\r\n<p>", "\r\n\r\n<i>HTML</i>\r\n<p>");
        assert_eq!(output, expected);
    }

    #[test]
    fn test_attachments_untouched() {
        let body = concat!(
            "--B\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "text\r\n",
            "--B\r\n",
            "Content-Type: image/png\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            "iVBORw0=\r\n",
            "--B\r\n",
            "Content-Type: text/plain\r\n",
            "Content-Disposition: attachment; filename=\"a.txt\"\r\n",
            "\r\n",
            "attached\r\n",
            "--B--\r\n"
        );
        let mut headers = Headers::new();
        headers.add("Content-Type", "multipart/mixed; boundary=B");
        let tree = MimeTree::parse(&headers, body.as_bytes());

        let annotated = inject(&tree, &AnnotationPayload::new("P\r\n", "H"));
        let leaves = annotated.leaves();
        assert_eq!(leaves[0].body, b"P\r\ntext\r\n");
        assert_eq!(leaves[1].body, b"iVBORw0=\r\n");
        assert_eq!(leaves[2].body, b"attached\r\n");
    }

    #[test]
    fn test_no_text_leaf_drops_payload() {
        let tree = single_part("application/pdf", "base64", b"JVBERi0=");
        let annotated = inject(&tree, &AnnotationPayload::new("X", "Y"));
        assert_eq!(annotated, tree);
    }
}
