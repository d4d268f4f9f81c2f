//! Document patches: the only way the engine mutates a tree.
//!
//! Every change a pass wants to make is first recorded as a [`Patch`]; the
//! [`PatchSet`] is applied in one go once all decisions (including external
//! alt-text resolution) are final.

use super::arena::{Attribute, Document, NodeId};
use crate::error::{Error, Result};

/// An element to be created by [`Patch::AppendElement`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewElement {
    pub name: String,
    /// Plain (unescaped) attribute values.
    pub attrs: Vec<(String, String)>,
    pub text: Option<String>,
}

impl NewElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            text: None,
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// A single change to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    /// Set (or replace) an attribute. Self-closed elements stay self-closed.
    SetAttribute {
        node: NodeId,
        name: String,
        value: String,
    },
    /// Replace all children of an element with a single text node.
    SetText { node: NodeId, text: String },
    /// Append a new child element, following the parent's indentation.
    AppendElement { parent: NodeId, element: NewElement },
}

impl Patch {
    /// The node the patch targets.
    pub fn target(&self) -> NodeId {
        match self {
            Patch::SetAttribute { node, .. } | Patch::SetText { node, .. } => *node,
            Patch::AppendElement { parent, .. } => *parent,
        }
    }
}

/// Ordered collection of patches for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchSet {
    patches: Vec<Patch>,
}

impl PatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, patch: Patch) {
        self.patches.push(patch);
    }

    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        self.push(Patch::SetAttribute {
            node,
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    pub fn set_text(&mut self, node: NodeId, text: &str) {
        self.push(Patch::SetText {
            node,
            text: text.to_string(),
        });
    }

    pub fn append_element(&mut self, parent: NodeId, element: NewElement) {
        self.push(Patch::AppendElement { parent, element });
    }

    pub fn extend(&mut self, other: PatchSet) {
        self.patches.extend(other.patches);
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Patch> {
        self.patches.iter()
    }

    /// Value the last queued `SetAttribute` gives `name` on `node`.
    pub fn pending_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.patches.iter().rev().find_map(|patch| match patch {
            Patch::SetAttribute {
                node: target,
                name: attr,
                value,
            } if *target == node && attr == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// Apply every patch in order.
    ///
    /// A patch that cannot be applied is skipped; its error is returned so
    /// the caller can report it. The remaining patches are still applied.
    pub fn apply(&self, doc: &mut Document) -> Vec<Error> {
        self.patches
            .iter()
            .filter_map(|patch| apply_patch(doc, patch).err())
            .collect()
    }
}

/// Apply a single patch.
pub fn apply_patch(doc: &mut Document, patch: &Patch) -> Result<()> {
    if !doc.is_element(patch.target()) {
        return Err(Error::InvalidPatch(format!(
            "node {} is not an element",
            patch.target().0
        )));
    }

    match patch {
        Patch::SetAttribute { node, name, value } => {
            doc.set_attr(*node, name, value);
        }
        Patch::SetText { node, text } => {
            doc.remove_children(*node);
            if !text.is_empty() {
                let text_node = doc.create_text(text);
                doc.append(*node, text_node);
                doc.set_self_closing(*node, false);
            }
        }
        Patch::AppendElement { parent, element } => append_element(doc, *parent, element),
    }
    Ok(())
}

fn append_element(doc: &mut Document, parent: NodeId, element: &NewElement) {
    let attrs = element
        .attrs
        .iter()
        .map(|(name, value)| Attribute::new(name.as_str(), value))
        .collect();
    let text = element.text.as_deref().filter(|t| !t.is_empty());
    let node = doc.create_element(element.name.as_str(), attrs, text.is_none());
    if let Some(text) = text {
        let text_node = doc.create_text(text);
        doc.append(node, text_node);
    }

    let indent = sibling_indent(doc, parent);
    let trailing = doc
        .get(parent)
        .map(|n| n.last_child)
        .filter(|&last| is_whitespace_text(doc, last));

    match trailing {
        Some(trailing) => {
            if let Some(indent) = indent {
                let indent_node = doc.create_text(&indent);
                doc.insert_before(trailing, indent_node);
            }
            doc.insert_before(trailing, node);
        }
        None => {
            if let Some(indent) = indent {
                doc.append_raw_text(parent, &indent);
            }
            doc.append(parent, node);
        }
    }
    // An empty parent such as `<head/>` must now be written with an end tag.
    doc.set_self_closing(parent, false);
}

/// Whitespace preceding the last element child, reused to indent new children.
fn sibling_indent(doc: &Document, parent: NodeId) -> Option<String> {
    let last_element = doc.child_elements(parent).last()?;
    let prev = doc.get(last_element)?.prev_sibling;
    is_whitespace_text(doc, prev)
        .then(|| doc.text(prev).map(|t| t.into_owned()))
        .flatten()
}

fn is_whitespace_text(doc: &Document, id: NodeId) -> bool {
    doc.is_text(id) && doc.text(id).is_some_and(|t| t.trim().is_empty())
}

// ---- Document titles ----

/// What a content document has in the way of a `<title>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSlot {
    /// A title with visible text; never replaced.
    Meaningful(NodeId),
    /// A title element that is empty, whitespace-only or self-closed.
    Blank(NodeId),
    /// A `<head>` without a title element.
    Missing { head: NodeId },
    /// No `<head>` to put a title in.
    NoHead,
}

/// Locate the document title. Whitespace-only text does not count as a title.
pub fn title_slot(doc: &Document) -> TitleSlot {
    let Some(head) = doc.find_element("head") else {
        return TitleSlot::NoHead;
    };
    match doc.find_element_in(head, "title") {
        Some(title) if doc.text_content(title).trim().is_empty() => TitleSlot::Blank(title),
        Some(title) => TitleSlot::Meaningful(title),
        None => TitleSlot::Missing { head },
    }
}

/// Patch filling in a blank or missing title with `text`.
///
/// Returns `None` when the document already has a meaningful title, has no
/// head, or `text` is itself blank.
pub fn title_patch(doc: &Document, text: &str) -> Option<Patch> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match title_slot(doc) {
        TitleSlot::Blank(title) => Some(Patch::SetText {
            node: title,
            text: text.to_string(),
        }),
        TitleSlot::Missing { head } => Some(Patch::AppendElement {
            parent: head,
            element: NewElement::new("title").with_text(text),
        }),
        TitleSlot::Meaningful(_) | TitleSlot::NoHead => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parser::parse_document;
    use crate::dom::serialize::serialize;
    use proptest::prelude::*;

    fn parse(xml: &str) -> Document {
        parse_document(xml).unwrap().document
    }

    #[test]
    fn test_set_attribute_keeps_self_closed() {
        let mut doc = parse(r#"<p><img src="a.png"/></p>"#);
        let img = doc.find_element("img").unwrap();

        let mut patches = PatchSet::new();
        patches.set_attribute(img, "alt", "A red bicycle");
        assert!(patches.apply(&mut doc).is_empty());

        assert_eq!(
            serialize(&doc),
            r#"<p><img src="a.png" alt="A red bicycle"/></p>"#
        );
    }

    #[test]
    fn test_set_attribute_on_open_close_pair_keeps_pair() {
        let mut doc = parse(r#"<section epub:type="chapter"></section>"#);
        let section = doc.find_element("section").unwrap();
        apply_patch(
            &mut doc,
            &Patch::SetAttribute {
                node: section,
                name: "role".into(),
                value: "doc-chapter".into(),
            },
        )
        .unwrap();
        assert_eq!(
            serialize(&doc),
            r#"<section epub:type="chapter" role="doc-chapter"></section>"#
        );
    }

    #[test]
    fn test_set_text_replaces_children() {
        let mut doc = parse("<title>  <!-- x -->\n</title>");
        let title = doc.find_element("title").unwrap();
        apply_patch(
            &mut doc,
            &Patch::SetText {
                node: title,
                text: "Tom & Jerry".into(),
            },
        )
        .unwrap();
        assert_eq!(serialize(&doc), "<title>Tom &amp; Jerry</title>");
    }

    #[test]
    fn test_append_element_follows_indentation() {
        let xml = "<metadata>\n    <dc:language>en</dc:language>\n  </metadata>";
        let mut doc = parse(xml);
        let metadata = doc.find_element("metadata").unwrap();

        let mut patches = PatchSet::new();
        patches.append_element(
            metadata,
            NewElement::new("meta")
                .with_attr("property", "schema:accessMode")
                .with_text("textual"),
        );
        patches.append_element(
            metadata,
            NewElement::new("meta")
                .with_attr("name", "schema:accessibilityHazard")
                .with_attr("content", "none"),
        );
        assert!(patches.apply(&mut doc).is_empty());

        assert_eq!(
            serialize(&doc),
            "<metadata>\n    <dc:language>en</dc:language>\n    \
             <meta property=\"schema:accessMode\">textual</meta>\n    \
             <meta name=\"schema:accessibilityHazard\" content=\"none\"/>\n  </metadata>"
        );
    }

    #[test]
    fn test_append_into_self_closed_parent() {
        let mut doc = parse("<html><head/><body/></html>");
        let head = doc.find_element("head").unwrap();
        let patch = title_patch(&doc, "Chapter One").unwrap();
        assert_eq!(patch.target(), head);
        apply_patch(&mut doc, &patch).unwrap();
        assert_eq!(
            serialize(&doc),
            "<html><head><title>Chapter One</title></head><body/></html>"
        );
    }

    #[test]
    fn test_invalid_target_is_rejected() {
        let mut doc = parse("<p>text</p>");
        let p = doc.find_element("p").unwrap();
        let text = doc.children(p).next().unwrap();

        let mut patches = PatchSet::new();
        patches.set_attribute(text, "role", "note");
        patches.set_attribute(p, "role", "note");
        let errors = patches.apply(&mut doc);

        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], Error::InvalidPatch(_)));
        assert_eq!(doc.get_attr(p, "role").as_deref(), Some("note"));
    }

    #[test]
    fn test_whitespace_title_is_blank() {
        let doc = parse("<html><head><title>\n   \t</title></head></html>");
        assert!(matches!(title_slot(&doc), TitleSlot::Blank(_)));

        let doc = parse("<html><head><title>Real</title></head></html>");
        assert!(matches!(title_slot(&doc), TitleSlot::Meaningful(_)));
        assert_eq!(title_patch(&doc, "Other"), None);

        let doc = parse("<html><body/></html>");
        assert_eq!(title_slot(&doc), TitleSlot::NoHead);
    }

    #[test]
    fn test_pending_attribute_sees_last_write() {
        let doc = parse(r#"<div><section id="a"/><section id="b"/></div>"#);
        let a = doc.element_by_id("a").unwrap();
        let b = doc.element_by_id("b").unwrap();
        let mut patches = PatchSet::new();
        patches.set_attribute(a, "epub:type", "glossary");
        patches.set_attribute(a, "epub:type", "glossary index");
        patches.set_text(b, "text");

        assert_eq!(patches.pending_attribute(a, "epub:type"), Some("glossary index"));
        assert_eq!(patches.pending_attribute(a, "role"), None);
        assert_eq!(patches.pending_attribute(b, "epub:type"), None);
    }

    #[test]
    fn test_self_closed_title_is_converted() {
        let mut doc = parse("<html><head><title/></head></html>");
        let patch = title_patch(&doc, "Preface").unwrap();
        apply_patch(&mut doc, &patch).unwrap();
        assert_eq!(
            serialize(&doc),
            "<html><head><title>Preface</title></head></html>"
        );
        let titles = doc
            .descendants(doc.root())
            .filter(|&id| doc.local_name(id) == Some("title"))
            .count();
        assert_eq!(titles, 1);
    }

    proptest! {
        #[test]
        fn prop_self_closed_stays_self_closed(
            name in "[a-z][a-z-]{0,8}",
            value in "[ -~]{0,24}",
        ) {
            let mut doc = parse(r#"<div><img src="x.png"/></div>"#);
            let img = doc.find_element("img").unwrap();
            let mut patches = PatchSet::new();
            patches.set_attribute(img, &name, &value);
            prop_assert!(patches.apply(&mut doc).is_empty());

            let out = serialize(&doc);
            prop_assert!(out.ends_with("/></div>"));
            prop_assert!(!out.contains("</img>"));

            let reparsed = parse(&out);
            let img = reparsed.find_element("img").unwrap();
            prop_assert!(reparsed.is_self_closing(img));
            let written = reparsed.get_attr(img, &name).map(|v| v.into_owned());
            prop_assert_eq!(written.as_deref(), Some(value.as_str()));
        }
    }
}
