//! Write a [`Document`] back to markup.

use super::arena::{Document, NodeData, NodeId};

/// Serialize the whole document.
///
/// Raw text and attribute values are emitted as stored. An element marked
/// self-closing is written as `<name/>` as long as it has no children; an
/// element that was read as `<name></name>` keeps its end tag even when empty.
pub fn serialize(doc: &Document) -> String {
    let mut out = String::new();
    for child in doc.children(doc.root()) {
        write_node(doc, child, &mut out);
    }
    out
}

/// Serialize a single node and its subtree.
pub fn serialize_node(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    write_node(doc, id, &mut out);
    out
}

fn write_node(doc: &Document, id: NodeId, out: &mut String) {
    let Some(node) = doc.get(id) else {
        return;
    };

    match &node.data {
        NodeData::Document => {
            for child in doc.children(id) {
                write_node(doc, child, out);
            }
        }
        NodeData::Element {
            name,
            attrs,
            self_closing,
        } => {
            out.push('<');
            out.push_str(name);
            for attr in attrs {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                // Values read from single-quoted attributes may hold a bare quote.
                out.push_str(&attr.raw.replace('"', "&quot;"));
                out.push('"');
            }

            if *self_closing && node.first_child.is_none() {
                out.push_str("/>");
                return;
            }

            out.push('>');
            for child in doc.children(id) {
                write_node(doc, child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        NodeData::Text(raw) => out.push_str(raw),
        NodeData::CData(raw) => {
            out.push_str("<![CDATA[");
            out.push_str(raw);
            out.push_str("]]>");
        }
        NodeData::Comment(raw) => {
            out.push_str("<!--");
            out.push_str(raw);
            out.push_str("-->");
        }
        NodeData::Declaration(raw) | NodeData::ProcessingInstruction(raw) => {
            out.push_str("<?");
            out.push_str(raw);
            out.push_str("?>");
        }
        NodeData::Doctype(raw) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(raw.trim_start());
            out.push('>');
        }
    }
}
