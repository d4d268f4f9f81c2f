//! Navigation-derived data: document titles and landmarks.
//!
//! EPUB 3 publications carry an XHTML navigation document; EPUB 2 ones an
//! NCX. Both provide a label for the content documents they link to, which
//! is used to fill in missing `<title>`s.

use std::collections::HashMap;

use super::Publication;
use crate::dom::{Document, NodeId, PatchSet};
use crate::util::{resolve_href, split_href};

/// A `landmarks` nav entry pointing at an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Landmark {
    /// Container path of the target document.
    pub target: String,
    /// `id` of the target element.
    pub fragment: String,
    /// Structural-semantics token of the link, e.g. `bodymatter`.
    pub epub_type: String,
}

/// Title map and landmarks of a publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Navigation {
    /// Label for each content document, keyed by container path.
    pub titles: HashMap<String, String>,
    pub landmarks: Vec<Landmark>,
}

impl Navigation {
    /// Read the EPUB 3 navigation document, or the NCX when there is none.
    pub fn from_publication(publication: &Publication) -> Self {
        if let Some(nav_path) = &publication.nav_path
            && let Some(nav) = publication.document(nav_path)
        {
            return Self::from_nav_document(nav_path, &nav.dom);
        }
        if let Some((ncx_path, ncx)) = &publication.ncx {
            return Self::from_ncx(ncx_path, ncx);
        }
        Self::default()
    }

    /// Titles from the `toc` nav and landmarks from the `landmarks` nav.
    ///
    /// The first link to a document gives its title; later links to the same
    /// document (usually to sections inside it) are ignored. The nav
    /// document's first `<h1>` titles the nav document itself.
    pub fn from_nav_document(path: &str, doc: &Document) -> Self {
        let mut navigation = Self::default();

        if let Some(h1) = doc.find_element("h1") {
            let label = collapse_whitespace(&doc.text_content(h1));
            if !label.is_empty() {
                navigation.titles.insert(path.to_string(), label);
            }
        }

        let navs: Vec<NodeId> = doc
            .descendants(doc.root())
            .filter(|&id| doc.local_name(id) == Some("nav"))
            .collect();
        let toc = navs
            .iter()
            .copied()
            .find(|&id| has_type(doc, id, "toc"))
            .or_else(|| navs.first().copied());

        if let Some(toc) = toc {
            for link in links(doc, toc) {
                let Some(href) = doc.get_attr(link, "href") else {
                    continue;
                };
                let Some(target) = resolve_href(path, &href) else {
                    continue;
                };
                let label = collapse_whitespace(&doc.text_content(link));
                if !label.is_empty() {
                    navigation.titles.entry(target).or_insert(label);
                }
            }
        }

        for landmarks in navs.iter().filter(|&&id| has_type(doc, id, "landmarks")) {
            for link in links(doc, *landmarks) {
                let (Some(href), Some(epub_type)) =
                    (doc.get_attr(link, "href"), doc.get_attr(link, "epub:type"))
                else {
                    continue;
                };
                let epub_type = epub_type.trim();
                let Some(fragment) = split_href(&href).1 else {
                    continue;
                };
                if epub_type.is_empty() {
                    continue;
                }
                if let Some(target) = resolve_href(path, &href) {
                    navigation.landmarks.push(Landmark {
                        target,
                        fragment: fragment.to_string(),
                        epub_type: epub_type.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            titles = navigation.titles.len(),
            landmarks = navigation.landmarks.len(),
            "read navigation document"
        );
        navigation
    }

    /// Titles from an NCX: the `navLabel` of the first `navPoint` pointing at
    /// each document, in document order.
    pub fn from_ncx(path: &str, ncx: &Document) -> Self {
        let mut navigation = Self::default();

        for point in ncx
            .descendants(ncx.root())
            .filter(|&id| ncx.local_name(id) == Some("navPoint"))
        {
            let label = ncx
                .child_elements(point)
                .find(|&c| ncx.local_name(c) == Some("navLabel"))
                .map(|l| collapse_whitespace(&ncx.text_content(l)))
                .unwrap_or_default();
            let src = ncx
                .child_elements(point)
                .find(|&c| ncx.local_name(c) == Some("content"))
                .and_then(|c| ncx.get_attr(c, "src"));

            if let Some(target) = src.and_then(|src| resolve_href(path, &src))
                && !label.is_empty()
            {
                navigation.titles.entry(target).or_insert(label);
            }
        }
        navigation
    }

    pub fn title(&self, document: &str) -> Option<&str> {
        self.titles.get(document).map(String::as_str)
    }

    /// Landmarks pointing into `document`.
    pub fn landmarks_in<'a>(&'a self, document: &'a str) -> impl Iterator<Item = &'a Landmark> {
        self.landmarks.iter().filter(move |l| l.target == document)
    }
}

/// Queue `epub:type` additions for the landmarks targeting `doc`.
///
/// A token already present on the target is not repeated; several landmarks
/// on one element are merged into a single attribute value. Returns the
/// number of tokens added.
pub fn landmark_patches<'a>(
    doc: &Document,
    landmarks: impl IntoIterator<Item = &'a Landmark>,
    patches: &mut PatchSet,
) -> usize {
    let mut pending: Vec<(NodeId, Vec<String>)> = Vec::new();

    for landmark in landmarks {
        let Some(node) = doc.element_by_id(&landmark.fragment) else {
            tracing::debug!(target = %landmark.target, id = %landmark.fragment, "landmark target not found");
            continue;
        };
        let index = match pending.iter().position(|(id, _)| *id == node) {
            Some(index) => index,
            None => {
                let existing: Vec<String> = doc
                    .get_attr(node, "epub:type")
                    .map(|t| t.split_whitespace().map(str::to_string).collect())
                    .unwrap_or_default();
                pending.push((node, existing));
                pending.len() - 1
            }
        };
        let tokens = &mut pending[index].1;
        if !tokens.iter().any(|t| t == &landmark.epub_type) {
            tokens.push(landmark.epub_type.clone());
        }
    }

    let mut added = 0;
    for (node, tokens) in pending {
        let before = doc
            .get_attr(node, "epub:type")
            .map(|t| t.split_whitespace().count())
            .unwrap_or(0);
        if tokens.len() > before {
            added += tokens.len() - before;
            patches.set_attribute(node, "epub:type", &tokens.join(" "));
        }
    }
    added
}

fn has_type(doc: &Document, id: NodeId, token: &str) -> bool {
    doc.get_attr(id, "epub:type")
        .is_some_and(|t| t.split_whitespace().any(|t| t == token))
}

fn links(doc: &Document, scope: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    doc.descendants(scope)
        .filter(move |&id| doc.local_name(id) == Some("a"))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
