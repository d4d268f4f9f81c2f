//! Read access to the OPF package document.
//!
//! [`PackageMetadata`] is a view over the parsed package [`Document`]: it
//! locates `<package>` and `<metadata>`, lists metadata entries and manifest
//! items, and exposes the primary language. Writing goes through patches.

pub mod language;
pub mod schema;

use std::borrow::Cow;

use crate::dom::{Document, NodeId};
use crate::epub::ManifestItem;
use crate::error::{Error, Result};
use crate::util::{local_name, resolve_href};

/// One metadata entry of the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaEntry {
    /// `property` or `name` of a `<meta>`, or the element name (`dc:language`).
    pub property: String,
    pub value: String,
    /// Id referenced by `refines`, without the leading `#`.
    pub refines: Option<String>,
}

/// View over a package document.
#[derive(Debug, Clone, Copy)]
pub struct PackageMetadata<'a> {
    doc: &'a Document,
    package: NodeId,
    metadata: Option<NodeId>,
}

impl<'a> PackageMetadata<'a> {
    pub fn new(doc: &'a Document) -> Result<Self> {
        let package = doc
            .root_element()
            .filter(|&id| doc.local_name(id) == Some("package"))
            .ok_or_else(|| Error::MissingElement("package".into()))?;
        let metadata = doc
            .child_elements(package)
            .find(|&id| doc.local_name(id) == Some("metadata"));
        Ok(Self {
            doc,
            package,
            metadata,
        })
    }

    pub fn document(&self) -> &'a Document {
        self.doc
    }

    /// The `<package>` element.
    pub fn package(&self) -> NodeId {
        self.package
    }

    /// The `<metadata>` element.
    pub fn metadata(&self) -> Option<NodeId> {
        self.metadata
    }

    /// Value of the package `version` attribute.
    pub fn version(&self) -> Option<Cow<'a, str>> {
        self.doc.get_attr(self.package, "version")
    }

    /// `xml:lang` on the package element, if the attribute is present at all.
    pub fn xml_lang(&self) -> Option<Cow<'a, str>> {
        self.doc.get_attr(self.package, "xml:lang")
    }

    /// Metadata elements, in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + 'a {
        let doc = self.doc;
        self.metadata
            .into_iter()
            .flat_map(move |metadata| doc.child_elements(metadata))
    }

    /// The first non-empty `dc:language`, trimmed, with any region subtag kept.
    pub fn primary_language(&self) -> Option<String> {
        self.elements()
            .filter(|&id| {
                self.doc.element_name(id) == Some("dc:language")
                    || self.doc.local_name(id) == Some("language")
            })
            .map(|id| self.doc.text_content(id).trim().to_string())
            .find(|lang| !lang.is_empty())
    }

    /// Metadata entries: `dc:*` elements and both `<meta>` forms.
    pub fn entries(&self) -> Vec<MetaEntry> {
        self.elements()
            .filter_map(|id| {
                let name = self.doc.element_name(id)?;
                if local_name(name) != "meta" {
                    return Some(MetaEntry {
                        property: name.to_string(),
                        value: self.doc.text_content(id).trim().to_string(),
                        refines: None,
                    });
                }
                let refines = self
                    .doc
                    .get_attr(id, "refines")
                    .map(|r| r.trim_start_matches('#').to_string());
                if let Some(property) = self.doc.get_attr(id, "property") {
                    Some(MetaEntry {
                        property: property.trim().to_string(),
                        value: self.doc.text_content(id).trim().to_string(),
                        refines,
                    })
                } else {
                    let name = self.doc.get_attr(id, "name")?;
                    Some(MetaEntry {
                        property: name.trim().to_string(),
                        value: self
                            .doc
                            .get_attr(id, "content")
                            .map(|c| c.trim().to_string())
                            .unwrap_or_default(),
                        refines,
                    })
                }
            })
            .collect()
    }

    /// Whether a publication-level entry with this property (or name) exists.
    pub fn declares(&self, property: &str) -> bool {
        self.entries()
            .iter()
            .any(|e| e.refines.is_none() && e.property == property)
    }

    /// Manifest items with hrefs resolved against the package path.
    pub fn manifest(&self, package_path: &str) -> Vec<ManifestItem> {
        let Some(manifest) = self
            .doc
            .child_elements(self.package)
            .find(|&id| self.doc.local_name(id) == Some("manifest"))
        else {
            return Vec::new();
        };

        self.doc
            .child_elements(manifest)
            .filter(|&id| self.doc.local_name(id) == Some("item"))
            .filter_map(|id| {
                let href = self.doc.get_attr(id, "href")?.into_owned();
                let path = resolve_href(package_path, &href)?;
                Some(ManifestItem {
                    id: self
                        .doc
                        .get_attr(id, "id")
                        .map(Cow::into_owned)
                        .unwrap_or_default(),
                    path,
                    href,
                    media_type: self
                        .doc
                        .get_attr(id, "media-type")
                        .map(|m| m.trim().to_ascii_lowercase())
                        .unwrap_or_default(),
                    properties: self
                        .doc
                        .get_attr(id, "properties")
                        .map(|p| p.split_ascii_whitespace().map(str::to_string).collect())
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    /// The spine `toc` attribute (EPUB 2 NCX reference).
    pub fn spine_toc(&self) -> Option<String> {
        let spine = self
            .doc
            .child_elements(self.package)
            .find(|&id| self.doc.local_name(id) == Some("spine"))?;
        self.doc.get_attr(spine, "toc").map(Cow::into_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;

    const OPF: &str = r##"<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Test</dc:title>
    <dc:language>  </dc:language>
    <dc:language> en-GB </dc:language>
    <dc:language>fr</dc:language>
    <meta property="schema:accessMode">textual</meta>
    <meta property="role" refines="#creator">aut</meta>
    <meta name="schema:accessibilityHazard" content="none"/>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="c1" href="../Text/c1.xhtml" media-type="Application/XHTML+XML" properties="scripted mathml"/>
    <item id="ext" href="https://example.com/x.css" media-type="text/css"/>
  </manifest>
  <spine toc="ncx"/>
</package>"##;

    fn doc() -> Document {
        parse_document(OPF).unwrap().document
    }

    #[test]
    fn test_primary_language_keeps_region() {
        let doc = doc();
        let meta = PackageMetadata::new(&doc).unwrap();
        assert_eq!(meta.primary_language().as_deref(), Some("en-GB"));
        assert_eq!(meta.version().as_deref(), Some("3.0"));
        assert_eq!(meta.xml_lang(), None);
    }

    #[test]
    fn test_entries_and_declares() {
        let doc = doc();
        let meta = PackageMetadata::new(&doc).unwrap();
        let entries = meta.entries();
        assert!(entries.contains(&MetaEntry {
            property: "schema:accessibilityHazard".into(),
            value: "none".into(),
            refines: None,
        }));
        assert!(meta.declares("schema:accessMode"));
        assert!(meta.declares("schema:accessibilityHazard"));
        assert!(!meta.declares("role"));
        assert!(!meta.declares("schema:accessibilitySummary"));
    }

    #[test]
    fn test_manifest_paths() {
        let doc = doc();
        let meta = PackageMetadata::new(&doc).unwrap();
        let items = meta.manifest("OEBPS/Content/content.opf");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].path, "OEBPS/Text/c1.xhtml");
        assert!(items[0].is_xhtml());
        assert!(items[0].has_property("mathml"));
        assert_eq!(meta.spine_toc().as_deref(), Some("ncx"));
    }

    #[test]
    fn test_missing_package() {
        let doc = parse_document("<html/>").unwrap().document;
        assert!(matches!(
            PackageMetadata::new(&doc),
            Err(Error::MissingElement(_))
        ));
    }
}
