//! Arena-based document tree.
//!
//! This is the parsed-document abstraction the engine works on: every content
//! document and the OPF package document are loaded into a [`Document`].
//! Text and attribute values are stored in their raw (escaped) form so that
//! anything the engine does not touch is written back exactly as it was read.

use std::borrow::Cow;

use crate::util::{escape_xml, local_name, unescape_xml};

/// Unique identifier for a node in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Sentinel value for no node.
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check if this is a valid node ID.
    pub fn is_some(&self) -> bool {
        self.0 != u32::MAX
    }

    /// Check if this is the sentinel value.
    pub fn is_none(&self) -> bool {
        self.0 == u32::MAX
    }
}

/// Node type in the arena.
#[derive(Debug, Clone)]
pub enum NodeData {
    /// Document root.
    Document,
    /// Element with its qualified name (prefix kept, e.g. `dc:language`).
    Element {
        name: String,
        attrs: Vec<Attribute>,
        /// Written as `<name/>` when it has no children.
        self_closing: bool,
    },
    /// Character data, raw (escaped) form.
    Text(String),
    CData(String),
    Comment(String),
    /// `<?xml ...?>` declaration content.
    Declaration(String),
    ProcessingInstruction(String),
    Doctype(String),
}

/// Element attribute. The value is kept escaped, as found in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub raw: String,
}

impl Attribute {
    /// Build an attribute from a plain (unescaped) value.
    pub fn new(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            raw: escape_xml(value),
        }
    }

    /// Unescaped attribute value.
    pub fn value(&self) -> Cow<'_, str> {
        unescape_xml(&self.raw)
    }
}

/// A node in the arena.
#[derive(Debug, Clone)]
pub struct Node {
    pub data: NodeData,
    pub parent: NodeId,
    pub first_child: NodeId,
    pub last_child: NodeId,
    pub prev_sibling: NodeId,
    pub next_sibling: NodeId,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            data,
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
        }
    }
}

/// Arena-allocated document tree.
///
/// All nodes live in one vector; links between them are indices. Nodes are
/// never freed, detaching only unlinks them, so a [`NodeId`] stays valid for
/// the lifetime of the document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Create a new empty document with only a document root.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId::NONE,
        };
        doc.root = doc.alloc(Node::new(NodeData::Document));
        doc
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// The document root node (not an element).
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get(id.0 as usize)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_none() {
            return None;
        }
        self.nodes.get_mut(id.0 as usize)
    }

    /// Create a detached element node.
    pub fn create_element(
        &mut self,
        name: impl Into<String>,
        attrs: Vec<Attribute>,
        self_closing: bool,
    ) -> NodeId {
        self.alloc(Node::new(NodeData::Element {
            name: name.into(),
            attrs,
            self_closing,
        }))
    }

    /// Create a detached text node from plain text (escaped on the way in).
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(Node::new(NodeData::Text(escape_xml(text))))
    }

    /// Create a detached node of any kind.
    pub fn create_node(&mut self, data: NodeData) -> NodeId {
        self.alloc(Node::new(data))
    }

    /// Append a child to a parent node.
    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        let last_child = self
            .get(parent)
            .map(|n| n.last_child)
            .unwrap_or(NodeId::NONE);

        if let Some(child_node) = self.get_mut(child) {
            child_node.parent = parent;
            child_node.prev_sibling = last_child;
            child_node.next_sibling = NodeId::NONE;
        }

        if let Some(last_node) = self.get_mut(last_child) {
            last_node.next_sibling = child;
        }

        if let Some(parent_node) = self.get_mut(parent) {
            if parent_node.first_child.is_none() {
                parent_node.first_child = child;
            }
            parent_node.last_child = child;
        }
    }

    /// Insert a node before a sibling.
    pub fn insert_before(&mut self, sibling: NodeId, new_node: NodeId) {
        let (parent, prev) = match self.get(sibling) {
            Some(n) => (n.parent, n.prev_sibling),
            None => return,
        };

        if let Some(new) = self.get_mut(new_node) {
            new.parent = parent;
            new.prev_sibling = prev;
            new.next_sibling = sibling;
        }

        if let Some(sib) = self.get_mut(sibling) {
            sib.prev_sibling = new_node;
        }

        if prev.is_some() {
            if let Some(p) = self.get_mut(prev) {
                p.next_sibling = new_node;
            }
        } else if let Some(par) = self.get_mut(parent) {
            par.first_child = new_node;
        }
    }

    /// Append raw (already escaped) text, merging with a trailing text node.
    pub fn append_raw_text(&mut self, parent: NodeId, raw: &str) {
        let last_child = self
            .get(parent)
            .map(|n| n.last_child)
            .unwrap_or(NodeId::NONE);

        if let Some(last) = self.get_mut(last_child)
            && let NodeData::Text(ref mut existing) = last.data
        {
            existing.push_str(raw);
            return;
        }

        let text_node = self.create_node(NodeData::Text(raw.to_string()));
        self.append(parent, text_node);
    }

    /// Unlink every child of `parent`.
    pub fn remove_children(&mut self, parent: NodeId) {
        let children: Vec<NodeId> = self.children(parent).collect();
        for child in children {
            if let Some(node) = self.get_mut(child) {
                node.parent = NodeId::NONE;
                node.prev_sibling = NodeId::NONE;
                node.next_sibling = NodeId::NONE;
            }
        }
        if let Some(node) = self.get_mut(parent) {
            node.first_child = NodeId::NONE;
            node.last_child = NodeId::NONE;
        }
    }

    /// Number of allocated nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the document has no content below the root.
    pub fn is_empty(&self) -> bool {
        self.get(self.root).is_none_or(|n| n.first_child.is_none())
    }

    /// Iterate over children of a node.
    pub fn children(&self, parent: NodeId) -> ChildrenIter<'_> {
        let first = self
            .get(parent)
            .map(|n| n.first_child)
            .unwrap_or(NodeId::NONE);
        ChildrenIter {
            doc: self,
            current: first,
        }
    }

    /// Iterate over all nodes below `node` in document order.
    pub fn descendants(&self, node: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(node).collect();
        stack.reverse();
        Descendants { doc: self, stack }
    }

    /// Find the first node matching a predicate (document order).
    pub fn find<F>(&self, predicate: F) -> Option<NodeId>
    where
        F: Fn(&Node) -> bool,
    {
        self.descendants(self.root)
            .find(|&id| self.get(id).is_some_and(&predicate))
    }

    /// First element in the document with the given local name.
    pub fn find_element(&self, local: &str) -> Option<NodeId> {
        self.find_element_in(self.root, local)
    }

    /// First element below `scope` with the given local name.
    pub fn find_element_in(&self, scope: NodeId, local: &str) -> Option<NodeId> {
        self.descendants(scope)
            .find(|&id| self.local_name(id) == Some(local))
    }

    /// Element whose `id` attribute equals `id`.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .find(|&node| self.get_attr(node, "id").is_some_and(|v| v == id))
    }

    /// The outermost element (e.g. `<html>` or `<package>`).
    pub fn root_element(&self) -> Option<NodeId> {
        self.children(self.root).find(|&id| self.is_element(id))
    }

    /// Element children of a node.
    pub fn child_elements(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(parent).filter(|&id| self.is_element(id))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).map(|n| n.parent).filter(NodeId::is_some)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over children of a node.
pub struct ChildrenIter<'a> {
    doc: &'a Document,
    current: NodeId,
}

impl Iterator for ChildrenIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() {
            return None;
        }
        let id = self.current;
        self.current = self
            .doc
            .get(id)
            .map(|n| n.next_sibling)
            .unwrap_or(NodeId::NONE);
        Some(id)
    }
}

/// Pre-order iterator over the nodes below a starting node.
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let first = self.stack.len();
        self.stack.extend(self.doc.children(id));
        self.stack[first..].reverse();
        Some(id)
    }
}

/// Convenience methods for element nodes.
impl Document {
    /// Qualified element name, e.g. `dc:language`.
    pub fn element_name(&self, id: NodeId) -> Option<&str> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Element { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Element name without its namespace prefix.
    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.element_name(id).map(local_name)
    }

    pub fn attrs(&self, id: NodeId) -> &[Attribute] {
        self.get(id)
            .and_then(|n| match &n.data {
                NodeData::Element { attrs, .. } => Some(attrs.as_slice()),
                _ => None,
            })
            .unwrap_or(&[])
    }

    /// Unescaped value of an attribute, matched by its full name
    /// (`"xml:lang"`, `"epub:type"`).
    pub fn get_attr(&self, id: NodeId, attr_name: &str) -> Option<Cow<'_, str>> {
        self.attrs(id)
            .iter()
            .find(|a| a.name == attr_name)
            .map(Attribute::value)
    }

    pub fn has_attr(&self, id: NodeId, attr_name: &str) -> bool {
        self.attrs(id).iter().any(|a| a.name == attr_name)
    }

    /// Set an attribute from a plain value, replacing any existing value.
    /// Returns `false` if `id` is not an element.
    pub fn set_attr(&mut self, id: NodeId, attr_name: &str, value: &str) -> bool {
        let Some(NodeData::Element { attrs, .. }) = self.get_mut(id).map(|n| &mut n.data) else {
            return false;
        };
        match attrs.iter_mut().find(|a| a.name == attr_name) {
            Some(existing) => existing.raw = escape_xml(value),
            None => attrs.push(Attribute::new(attr_name, value)),
        }
        true
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Element { .. }))
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.get(id).is_some_and(|n| matches!(n.data, NodeData::Text(_)))
    }

    pub fn is_self_closing(&self, id: NodeId) -> bool {
        self.get(id)
            .is_some_and(|n| matches!(n.data, NodeData::Element { self_closing: true, .. }))
    }

    pub fn set_self_closing(&mut self, id: NodeId, value: bool) {
        if let Some(NodeData::Element { self_closing, .. }) = self.get_mut(id).map(|n| &mut n.data) {
            *self_closing = value;
        }
    }

    /// Unescaped text of a single text or CDATA node.
    pub fn text(&self, id: NodeId) -> Option<Cow<'_, str>> {
        self.get(id).and_then(|n| match &n.data {
            NodeData::Text(raw) => Some(unescape_xml(raw)),
            NodeData::CData(raw) => Some(Cow::Borrowed(raw.as_str())),
            _ => None,
        })
    }

    /// Concatenated, unescaped text of every text node below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let Some(text) = self.text(node) {
                out.push_str(&text);
            }
        }
        out
    }

    /// Location of an element for diagnostics, e.g. `/html/body/section[2]/img`.
    pub fn element_path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(name) = self.element_name(current) {
            let parent = self.get(current).map(|n| n.parent).unwrap_or(NodeId::NONE);
            let same_name: Vec<NodeId> = self
                .child_elements(parent)
                .filter(|&sib| self.element_name(sib) == Some(name))
                .collect();
            if same_name.len() > 1 {
                let index = same_name.iter().position(|&s| s == current).unwrap_or(0) + 1;
                segments.push(format!("{name}[{index}]"));
            } else {
                segments.push(name.to_string());
            }
            current = parent;
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_elements() {
        let mut doc = Document::new();
        let div = doc.create_element("div", vec![Attribute::new("id", "main")], false);
        doc.append(doc.root(), div);

        assert_eq!(doc.element_name(div), Some("div"));
        assert_eq!(doc.get_attr(div, "id").as_deref(), Some("main"));
        assert_eq!(doc.root_element(), Some(div));
    }

    #[test]
    fn test_append_and_insert_before() {
        let mut doc = Document::new();
        let parent = doc.create_element("div", vec![], false);
        let first = doc.create_element("p", vec![], false);
        let last = doc.create_element("p", vec![], false);
        let middle = doc.create_element("hr", vec![], true);

        doc.append(doc.root(), parent);
        doc.append(parent, first);
        doc.append(parent, last);
        doc.insert_before(last, middle);

        let children: Vec<_> = doc.children(parent).collect();
        assert_eq!(children, vec![first, middle, last]);
    }

    #[test]
    fn test_descendants_in_document_order() {
        let mut doc = Document::new();
        let html = doc.create_element("html", vec![], false);
        let head = doc.create_element("head", vec![], false);
        let title = doc.create_element("title", vec![], false);
        let body = doc.create_element("body", vec![], false);
        doc.append(doc.root(), html);
        doc.append(html, head);
        doc.append(head, title);
        doc.append(html, body);

        let order: Vec<_> = doc.descendants(doc.root()).collect();
        assert_eq!(order, vec![html, head, title, body]);
        assert_eq!(doc.find_element("body"), Some(body));
    }

    #[test]
    fn test_attribute_values_are_escaped_and_unescaped() {
        let mut doc = Document::new();
        let img = doc.create_element("img", vec![], true);
        doc.append(doc.root(), img);

        assert!(doc.set_attr(img, "alt", "Fish & \"chips\""));
        assert_eq!(doc.attrs(img)[0].raw, "Fish &amp; &quot;chips&quot;");
        assert_eq!(doc.get_attr(img, "alt").as_deref(), Some("Fish & \"chips\""));

        doc.set_attr(img, "alt", "Logo");
        assert_eq!(doc.attrs(img).len(), 1);
        assert!(doc.is_self_closing(img));
    }

    #[test]
    fn test_text_merging_and_removal() {
        let mut doc = Document::new();
        let p = doc.create_element("p", vec![], false);
        doc.append(doc.root(), p);

        doc.append_raw_text(p, "Hello, ");
        doc.append_raw_text(p, "World &amp; all");
        assert_eq!(doc.children(p).count(), 1);
        assert_eq!(doc.text_content(p), "Hello, World & all");

        doc.remove_children(p);
        assert_eq!(doc.children(p).count(), 0);
        assert_eq!(doc.text_content(p), "");
    }

    #[test]
    fn test_element_path() {
        let mut doc = Document::new();
        let body = doc.create_element("body", vec![], false);
        let s1 = doc.create_element("section", vec![], false);
        let s2 = doc.create_element("section", vec![], false);
        let img = doc.create_element("img", vec![], true);
        doc.append(doc.root(), body);
        doc.append(body, s1);
        doc.append(body, s2);
        doc.append(s2, img);

        assert_eq!(doc.element_path(img), "/body/section[2]/img");
    }
}
