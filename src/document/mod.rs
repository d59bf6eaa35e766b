//! DocumentTransformer - embedded document decode, parse, render and export.
//!
//! Every user action decodes the payload afresh: `data` never changes once
//! the request is complete, and decoding is cheap. Failures are typed and
//! never touch registry state.

pub mod markup;
pub mod stylesheet;
pub mod xslt;

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub use markup::{parse_markup, Document, NodeId, NodeKind};
pub use stylesheet::{AssetStylesheet, StylesheetCache, StylesheetSource};
pub use xslt::Stylesheet;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    /// Payload is not valid base64, or the decoded bytes are not text.
    #[error("document decode failed: {0}")]
    Decode(String),

    #[error("markup parse failed at byte {position}: {message}")]
    Parse { position: u64, message: String },

    #[error("invalid stylesheet: {0}")]
    Stylesheet(String),

    #[error("transform failed: {0}")]
    Transform(String),
}

impl DocumentError {
    pub(crate) fn parse(position: u64, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            position,
            message: message.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decoded payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument(Vec<u8>);

impl RawDocument {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// The payload as UTF-8 text.
    pub fn text(&self) -> Result<&str, DocumentError> {
        std::str::from_utf8(&self.0).map_err(|e| DocumentError::Decode(e.to_string()))
    }
}

/// Decode a standard-alphabet base64 payload. Embedded line breaks and
/// spaces are tolerated.
pub fn decode(encoded: &str) -> Result<RawDocument, DocumentError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map(RawDocument)
        .map_err(|e| DocumentError::Decode(e.to_string()))
}

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// Result tree of a stylesheet transform.
#[derive(Debug, Clone)]
pub struct RenderedFragment {
    document: Document,
}

impl RenderedFragment {
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Serialized result tree.
    pub fn html(&self) -> String {
        self.document.inner_html(self.document.root())
    }

    /// Inner HTML of the first result element; `None` when the transform
    /// produced no element.
    pub fn first_element_inner_html(&self) -> Option<String> {
        self.document
            .document_element()
            .map(|el| self.document.inner_html(el))
    }
}

pub fn render(source: &Document, stylesheet: &Stylesheet) -> Result<RenderedFragment, DocumentError> {
    let document = stylesheet.transform(source)?;
    Ok(RenderedFragment { document })
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportedFile {
    /// Write the artifact into `dir`, returning its path.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

/// Package decoded document text as a downloadable plain-text artifact.
pub fn export_as_file(raw: &RawDocument, filename: &str) -> ExportedFile {
    ExportedFile {
        filename: filename.to_string(),
        content_type: "text/plain",
        bytes: raw.as_bytes().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const XML: &str = "<Consignment><ID>D1</ID></Consignment>";

    #[test]
    fn decode_accepts_wrapped_base64() {
        let encoded = encode(XML.as_bytes());
        let wrapped = format!("{}\n{}\r\n", &encoded[..10], &encoded[10..]);
        assert_eq!(decode(&wrapped).unwrap().text().unwrap(), XML);
    }

    #[test]
    fn decode_rejects_non_base64() {
        for bad in ["not base64!", "abc", "====", "PGE+*"] {
            assert!(matches!(decode(bad), Err(DocumentError::Decode(_))), "{bad}");
        }
    }

    #[test]
    fn non_utf8_payload_is_a_decode_error() {
        let raw = decode(&encode(&[0xff, 0xfe, 0x00])).unwrap();
        assert!(matches!(raw.text(), Err(DocumentError::Decode(_))));
    }

    #[test]
    fn render_exposes_first_element_inner_html() {
        let sheet = Stylesheet::compile(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
                 <xsl:template match="/"><html><body><p><xsl:value-of select="//ID"/></p></body></html></xsl:template>
               </xsl:stylesheet>"#,
        )
        .unwrap();
        let source = parse_markup(XML).unwrap();

        let fragment = render(&source, &sheet).unwrap();
        assert_eq!(
            fragment.first_element_inner_html().as_deref(),
            Some("<body><p>D1</p></body>")
        );
        assert_eq!(fragment.html(), "<html><body><p>D1</p></body></html>");
    }

    #[test]
    fn render_without_elements_has_no_first_element() {
        let sheet = Stylesheet::compile(
            r#"<xsl:stylesheet xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:template match="/">plain</xsl:template></xsl:stylesheet>"#,
        )
        .unwrap();
        let fragment = render(&parse_markup(XML).unwrap(), &sheet).unwrap();
        assert_eq!(fragment.first_element_inner_html(), None);
        assert_eq!(fragment.html(), "plain");
    }

    #[test]
    fn export_keeps_bytes_verbatim() {
        let raw = decode(&encode(XML.as_bytes())).unwrap();
        let file = export_as_file(&raw, "D1.xml");
        assert_eq!(file.filename, "D1.xml");
        assert_eq!(file.content_type, "text/plain");
        assert_eq!(file.bytes, XML.as_bytes());

        let dir = tempfile::tempdir().unwrap();
        let path = file.write_to(dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), XML);
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let decoded = decode(&encode(&bytes)).unwrap();
            prop_assert_eq!(decoded.as_bytes(), bytes.as_slice());
        }
    }
}
