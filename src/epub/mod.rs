//! In-memory EPUB publication: the package document, its content documents
//! and the image resources the engine needs.
//!
//! [`read_epub`] and [`write_epub`] move a [`Publication`] in and out of an
//! `.epub` container; the engine itself never touches the archive.

pub mod nav;
mod reader;
mod writer;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding, UTF_8};

use crate::dom::{Document, MarkupFault, parse_document};
use crate::error::{Error, Result};
use crate::opf::PackageMetadata;
use crate::report::{Issue, IssueKind};
use crate::util::decode_markup;

pub use nav::{Landmark, Navigation};
pub use reader::{read_epub, read_epub_from_reader};
pub use writer::{write_epub, write_epub_to_writer};

/// EPUB revision, selecting which structural-semantics table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EpubVersion {
    /// EPUB 2.0.x
    Epub2,
    /// EPUB 3.0 to 3.2
    Epub30,
    /// EPUB 3.3
    Epub33,
}

impl EpubVersion {
    /// Version from a package `version` attribute. Unknown 3.x values are
    /// treated as 3.0; anything that is not 2.x or 3.x defaults to 3.0 as well.
    pub fn from_package(version: &str) -> Self {
        let version = version.trim();
        if version.starts_with('2') {
            EpubVersion::Epub2
        } else if version == "3.3" {
            EpubVersion::Epub33
        } else {
            EpubVersion::Epub30
        }
    }

    pub fn is_epub3(self) -> bool {
        self != EpubVersion::Epub2
    }
}

impl FromStr for EpubVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "2" | "2.0" | "2.0.1" => Ok(EpubVersion::Epub2),
            "3" | "3.0" | "3.0.1" | "3.1" | "3.2" => Ok(EpubVersion::Epub30),
            "3.3" => Ok(EpubVersion::Epub33),
            other => Err(format!(
                "unknown EPUB version {other:?} (expected 2, 3.0, 3.1, 3.2 or 3.3)"
            )),
        }
    }
}

impl fmt::Display for EpubVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EpubVersion::Epub2 => "2.0",
            EpubVersion::Epub30 => "3.0",
            EpubVersion::Epub33 => "3.3",
        })
    }
}

/// An `<item>` of the package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// The `href` as written in the manifest.
    pub href: String,
    /// Path of the resource inside the container.
    pub path: String,
    pub media_type: String,
    pub properties: Vec<String>,
}

impl ManifestItem {
    pub fn has_property(&self, property: &str) -> bool {
        self.properties.iter().any(|p| p == property)
    }

    pub fn is_xhtml(&self) -> bool {
        self.media_type == "application/xhtml+xml"
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn is_svg(&self) -> bool {
        self.media_type == "image/svg+xml"
    }

    pub fn is_ncx(&self) -> bool {
        self.media_type == "application/x-dtbncx+xml"
    }
}

/// An XHTML content document loaded for a pass.
#[derive(Debug, Clone)]
pub struct ContentDocument {
    /// Path inside the container; doubles as the document identifier.
    pub id: String,
    pub dom: Document,
    /// Damage repaired while parsing.
    pub faults: Vec<MarkupFault>,
    /// Set once a patch has been committed; only modified documents are
    /// re-serialized on write.
    pub modified: bool,
    /// Encoding the document is written back in.
    pub encoding: &'static Encoding,
}

impl ContentDocument {
    /// Parse markup into a content document.
    pub fn parse(id: impl Into<String>, markup: &str) -> Result<Self> {
        let parsed = parse_document(markup)?;
        Ok(Self {
            id: id.into(),
            dom: parsed.document,
            faults: parsed.faults,
            modified: false,
            encoding: UTF_8,
        })
    }
}

/// Raw image bytes plus the media type declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    pub path: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl ImageResource {
    pub fn is_svg(&self) -> bool {
        self.media_type == "image/svg+xml" || self.path.to_ascii_lowercase().ends_with(".svg")
    }
}

/// Images of a publication keyed by container path.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: HashMap<String, ImageResource>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) {
        let path = path.into();
        self.images.insert(
            path.clone(),
            ImageResource {
                path,
                media_type: media_type.into(),
                data,
            },
        );
    }

    pub fn get(&self, path: &str) -> Option<&ImageResource> {
        self.images.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.images.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageResource> {
        self.images.values()
    }
}

/// A file of the source container, kept as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
    /// Whether the entry was stored uncompressed.
    pub stored: bool,
}

/// A publication prepared for an accessibility pass.
#[derive(Debug, Clone)]
pub struct Publication {
    /// Version declared by the package document.
    pub version: EpubVersion,
    /// Container path of the OPF package document.
    pub package_path: String,
    pub package: Document,
    pub manifest: Vec<ManifestItem>,
    /// XHTML content documents in manifest order (including the nav).
    pub documents: Vec<ContentDocument>,
    pub images: ImageStore,
    /// Container path of the EPUB 3 navigation document.
    pub nav_path: Option<String>,
    /// The EPUB 2 NCX, parsed.
    pub ncx: Option<(String, Document)>,
    /// Problems found while loading (e.g. unparsable documents).
    pub load_issues: Vec<Issue>,
    /// Set once a patch has been committed to the package document.
    pub package_modified: bool,
    /// Encoding the package document is written back in.
    pub package_encoding: &'static Encoding,
    /// Every file of the source container, in archive order.
    pub entries: Vec<ArchiveEntry>,
}

impl Publication {
    /// Build a publication from its package document markup.
    ///
    /// The manifest, version and navigation document path are read from the
    /// package; content documents and images are added afterwards.
    pub fn from_package(package_path: impl Into<String>, opf: &str) -> Result<Self> {
        let package_path = package_path.into();
        let parsed = parse_document(opf)?;
        let package = parsed.document;

        let (version, manifest) = {
            let metadata = PackageMetadata::new(&package)?;
            let version = metadata
                .version()
                .map(|v| EpubVersion::from_package(&v))
                .ok_or_else(|| Error::InvalidEpub("package has no version attribute".into()))?;
            (version, metadata.manifest(&package_path))
        };

        let nav_path = manifest
            .iter()
            .find(|item| item.has_property("nav"))
            .map(|item| item.path.clone());

        Ok(Self {
            version,
            package_path,
            package,
            manifest,
            documents: Vec::new(),
            images: ImageStore::new(),
            nav_path,
            ncx: None,
            load_issues: Vec::new(),
            package_modified: false,
            package_encoding: UTF_8,
            entries: Vec::new(),
        })
    }

    /// Parse and add a content document.
    ///
    /// Markup that cannot be parsed at all is recorded as a load issue and
    /// the document is left out of the pass.
    pub fn add_document(&mut self, path: impl Into<String>, markup: &str) -> bool {
        let path = path.into();
        match ContentDocument::parse(path.clone(), markup) {
            Ok(doc) => {
                self.documents.push(doc);
                true
            }
            Err(e) => {
                tracing::warn!(document = %path, "skipping unparsable document: {e}");
                self.load_issues.push(
                    Issue::new(IssueKind::MalformedMarkup, format!("document left untouched: {e}"))
                        .with_document(path),
                );
                false
            }
        }
    }

    /// Decode and add a content document read from the container. The
    /// encoding named by its XML declaration is kept for writing it back.
    pub fn add_document_bytes(&mut self, path: impl Into<String>, data: &[u8]) -> bool {
        let (markup, encoding) = decode_markup(data);
        let added = self.add_document(path, &markup);
        if added && let Some(doc) = self.documents.last_mut() {
            doc.encoding = encoding;
        }
        added
    }

    pub fn add_image(&mut self, path: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) {
        self.images.insert(path, media_type, data);
    }

    /// Parse and attach the EPUB 2 NCX.
    pub fn set_ncx(&mut self, path: impl Into<String>, markup: &str) -> Result<()> {
        let parsed = parse_document(markup)?;
        self.ncx = Some((path.into(), parsed.document));
        Ok(())
    }

    pub fn document(&self, id: &str) -> Option<&ContentDocument> {
        self.documents.iter().find(|d| d.id == id)
    }

    pub fn document_mut(&mut self, id: &str) -> Option<&mut ContentDocument> {
        self.documents.iter_mut().find(|d| d.id == id)
    }

    /// Source container entry by name.
    pub fn entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Whether any content document or the package was changed.
    pub fn is_modified(&self) -> bool {
        self.package_modified || self.documents.iter().any(|d| d.modified)
    }

    pub fn manifest_item(&self, path: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.path == path)
    }

    /// Manifest item referenced by the spine `toc` attribute, falling back to
    /// the first NCX in the manifest.
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        let toc_id = PackageMetadata::new(&self.package)
            .ok()
            .and_then(|m| m.spine_toc());
        toc_id
            .and_then(|id| self.manifest.iter().find(|item| item.id == id))
            .or_else(|| self.manifest.iter().find(|item| item.is_ncx()))
    }
}
