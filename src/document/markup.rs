//! Arena markup tree, quick-xml reader and HTML serializer.
//!
//! Node ids are handed out in document order while parsing, so sorting ids
//! sorts nodes into document order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::DocumentError;

/// Element nesting accepted by [`parse_markup`]. Tree walks recurse per level.
pub const MAX_NESTING: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Part of a qualified name after the prefix.
pub fn local_name(qname: &str) -> &str {
    qname.rsplit_once(':').map_or(qname, |(_, local)| local)
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// The single top-level element, if any.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&c| self.is_element(c))
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Element { .. })
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attributes(&self, id: NodeId) -> &[(String, String)] {
        match self.kind(id) {
            NodeKind::Element { attributes, .. } => attributes,
            _ => &[],
        }
    }

    /// Attribute value by local name.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|(k, _)| local_name(k) == name)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of the node and all its descendants.
    pub fn string_value(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Text(text) => out.push_str(text),
            _ => {
                for &child in self.children(id) {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// All descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    // -- building ----------------------------------------------------------

    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    pub fn append_element(&mut self, parent: NodeId, name: impl Into<String>) -> NodeId {
        let kind = NodeKind::Element {
            name: name.into(),
            attributes: Vec::new(),
        };
        self.push(kind, Some(parent))
    }

    /// An element attached nowhere; used as a scratch buffer.
    pub fn detached_element(&mut self, name: impl Into<String>) -> NodeId {
        let kind = NodeKind::Element {
            name: name.into(),
            attributes: Vec::new(),
        };
        self.push(kind, None)
    }

    /// Append text, merging with a preceding text sibling.
    pub fn append_text(&mut self, parent: NodeId, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(&last) = self.nodes[parent.0].children.last() {
            if let NodeKind::Text(existing) = &mut self.nodes[last.0].kind {
                existing.push_str(text);
                return;
            }
        }
        self.push(NodeKind::Text(text.to_string()), Some(parent));
    }

    /// Set (or replace) an attribute. No-op on non-elements.
    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            let value = value.into();
            match attributes.iter_mut().find(|(k, _)| k == name) {
                Some(slot) => slot.1 = value,
                None => attributes.push((name.to_string(), value)),
            }
        }
    }

    // -- serialization -----------------------------------------------------

    /// HTML serialization of the node itself.
    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    /// HTML serialization of the node's children.
    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        for &child in self.children(id) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Root => {
                for &child in self.children(id) {
                    self.write_html(child, out);
                }
            }
            NodeKind::Text(text) => escape_into(text, false, out),
            NodeKind::Element { name, attributes } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    escape_into(value, true, out);
                    out.push('"');
                }
                out.push('>');
                if is_void(name) {
                    return;
                }
                for &child in self.children(id) {
                    self.write_html(child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str())
}

fn escape_into(text: &str, attribute: bool, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse well-formed markup into a tree. Errors carry the byte offset; a
/// malformed document is never returned as an empty tree.
pub fn parse_markup(text: &str) -> Result<Document, DocumentError> {
    let mut reader = Reader::from_str(text);
    let mut doc = Document::new();
    let mut open: Vec<NodeId> = vec![doc.root()];

    loop {
        let event = reader
            .read_event()
            .map_err(|e| DocumentError::parse(reader.error_position() as u64, e))?;
        let position = reader.buffer_position() as u64;

        match event {
            Event::Start(start) => {
                if open.len() > MAX_NESTING {
                    return Err(DocumentError::parse(
                        position,
                        format!("elements nested deeper than {MAX_NESTING}"),
                    ));
                }
                let id = open_element(&mut doc, &open, &start, position)?;
                open.push(id);
            }
            Event::Empty(start) => {
                open_element(&mut doc, &open, &start, position)?;
            }
            Event::End(_) => {
                if open.len() <= 1 {
                    return Err(DocumentError::parse(position, "closing tag without an open element"));
                }
                open.pop();
            }
            Event::Text(raw) => {
                let text = raw
                    .unescape()
                    .map_err(|e| DocumentError::parse(position, e))?;
                add_text(&mut doc, &open, &text, position)?;
            }
            Event::CData(raw) => {
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| DocumentError::parse(position, e))?
                    .to_string();
                add_text(&mut doc, &open, &text, position)?;
            }
            Event::Eof => break,
            // declarations, comments, processing instructions, doctype
            _ => {}
        }
    }

    if let Some(&unclosed) = open.get(1) {
        let name = doc.name(unclosed).unwrap_or_default().to_string();
        return Err(DocumentError::parse(
            text.len() as u64,
            format!("unclosed element <{name}>"),
        ));
    }
    if doc.document_element().is_none() {
        return Err(DocumentError::parse(0, "no root element"));
    }
    Ok(doc)
}

fn open_element(
    doc: &mut Document,
    open: &[NodeId],
    start: &BytesStart<'_>,
    position: u64,
) -> Result<NodeId, DocumentError> {
    let parent = *open.last().unwrap_or(&doc.root());
    if parent == doc.root() && doc.document_element().is_some() {
        return Err(DocumentError::parse(position, "more than one root element"));
    }

    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(|e| DocumentError::parse(position, e))?
        .to_string();
    let id = doc.append_element(parent, name);

    for attr in start.attributes() {
        let attr = attr.map_err(|e| DocumentError::parse(position, e))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|e| DocumentError::parse(position, e))?
            .to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| DocumentError::parse(position, e))?;
        doc.set_attribute(id, &key, value.into_owned());
    }
    Ok(id)
}

fn add_text(
    doc: &mut Document,
    open: &[NodeId],
    text: &str,
    position: u64,
) -> Result<(), DocumentError> {
    let parent = *open.last().unwrap_or(&doc.root());
    if parent == doc.root() {
        if text.trim().is_empty() {
            return Ok(());
        }
        return Err(DocumentError::parse(position, "text outside the root element"));
    }
    doc.append_text(parent, text);
    Ok(())
}
