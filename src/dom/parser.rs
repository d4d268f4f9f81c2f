//! Tolerant XML reader building a [`Document`].
//!
//! Content documents in the wild are not always well formed. Element-level
//! damage (stray end tags, mismatched end tags, elements left open at end of
//! file) is repaired in the tree and reported as a [`MarkupFault`]; only a
//! syntax error that `quick-xml` cannot step over fails the parse.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use super::arena::{Attribute, Document, NodeData, NodeId};
use crate::error::{Error, Result};

/// A recoverable markup problem found while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupFault {
    /// Element path at the point of the fault.
    pub path: String,
    /// Byte offset in the source.
    pub position: u64,
    pub message: String,
}

/// Result of parsing: the tree plus whatever had to be repaired.
#[derive(Debug, Clone)]
pub struct Parsed {
    pub document: Document,
    pub faults: Vec<MarkupFault>,
}

/// Parse XML/XHTML markup into a [`Document`].
pub fn parse_document(content: &str) -> Result<Parsed> {
    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.trim_text(false);
    config.check_end_names = false;
    config.allow_unmatched_ends = true;

    let mut doc = Document::new();
    let mut faults = Vec::new();
    // Open elements, innermost last.
    let mut stack: Vec<NodeId> = vec![doc.root()];

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|source| Error::Xml { position, source })?;
        let parent = stack.last().copied().unwrap_or(doc.root());

        match event {
            Event::Start(e) => {
                let node = create_element(&mut doc, &e, false, &mut faults, position);
                doc.append(parent, node);
                stack.push(node);
            }
            Event::Empty(e) => {
                let node = create_element(&mut doc, &e, true, &mut faults, position);
                doc.append(parent, node);
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let open_at = stack
                    .iter()
                    .rposition(|&id| doc.element_name(id) == Some(name.as_str()));

                match open_at {
                    Some(index) if index + 1 == stack.len() => {
                        stack.pop();
                    }
                    Some(index) => {
                        for &unclosed in &stack[index + 1..] {
                            faults.push(MarkupFault {
                                path: doc.element_path(unclosed),
                                position,
                                message: format!("element closed implicitly by </{name}>"),
                            });
                        }
                        stack.truncate(index);
                    }
                    None => faults.push(MarkupFault {
                        path: doc.element_path(parent),
                        position,
                        message: format!("stray end tag </{name}> ignored"),
                    }),
                }
            }
            Event::Text(e) => {
                doc.append_raw_text(parent, &String::from_utf8_lossy(&e));
            }
            Event::GeneralRef(e) => {
                doc.append_raw_text(parent, &format!("&{};", String::from_utf8_lossy(&e)));
            }
            Event::CData(e) => {
                let node = doc.create_node(NodeData::CData(String::from_utf8_lossy(&e).into_owned()));
                doc.append(parent, node);
            }
            Event::Comment(e) => {
                let node =
                    doc.create_node(NodeData::Comment(String::from_utf8_lossy(&e).into_owned()));
                doc.append(parent, node);
            }
            Event::Decl(e) => {
                let node = doc.create_node(NodeData::Declaration(
                    String::from_utf8_lossy(&e).into_owned(),
                ));
                doc.append(parent, node);
            }
            Event::PI(e) => {
                let node = doc.create_node(NodeData::ProcessingInstruction(
                    String::from_utf8_lossy(&e).into_owned(),
                ));
                doc.append(parent, node);
            }
            Event::DocType(e) => {
                let node =
                    doc.create_node(NodeData::Doctype(String::from_utf8_lossy(&e).into_owned()));
                doc.append(parent, node);
            }
            Event::Eof => break,
        }
    }

    for &unclosed in stack.iter().skip(1) {
        faults.push(MarkupFault {
            path: doc.element_path(unclosed),
            position: content.len() as u64,
            message: "element not closed before end of document".to_string(),
        });
    }

    Ok(Parsed {
        document: doc,
        faults,
    })
}

fn create_element(
    doc: &mut Document,
    start: &BytesStart<'_>,
    self_closing: bool,
    faults: &mut Vec<MarkupFault>,
    position: u64,
) -> NodeId {
    // Some producers leave whitespace around attribute names; trim it.
    let name = String::from_utf8_lossy(start.name().as_ref())
        .trim()
        .to_string();

    let mut attrs: Vec<Attribute> = Vec::new();
    let mut iter = start.attributes();
    iter.with_checks(false);
    for attr in iter {
        match attr {
            Ok(attr) => {
                let key = String::from_utf8_lossy(attr.key.as_ref()).trim().to_string();
                let raw = String::from_utf8_lossy(&attr.value).into_owned();
                // First occurrence wins on duplicates.
                if !key.is_empty() && !attrs.iter().any(|a| a.name == key) {
                    attrs.push(Attribute { name: key, raw });
                }
            }
            Err(e) => faults.push(MarkupFault {
                path: name.clone(),
                position,
                message: format!("malformed attribute skipped: {e}"),
            }),
        }
    }

    doc.create_element(name, attrs, self_closing)
}
