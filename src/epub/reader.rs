use quick_xml::Reader;
use quick_xml::events::Event;
use std::io::{Read, Seek};
use std::path::Path;
use zip::{CompressionMethod, ZipArchive};

use super::{ArchiveEntry, Publication};
use crate::error::{Error, Result};
use crate::report::{Issue, IssueKind};
use crate::util::{decode_markup, decode_text};

/// Read an EPUB file from disk into a [`Publication`].
///
/// Supports EPUB 2 and EPUB 3. Every archive entry is kept so the
/// publication can be written back with untouched files copied verbatim.
///
/// # Example
///
/// ```no_run
/// use epub_a11y::read_epub;
///
/// let publication = read_epub("path/to/book.epub")?;
/// println!("{} content documents", publication.documents.len());
/// # Ok::<(), epub_a11y::Error>(())
/// ```
pub fn read_epub<P: AsRef<Path>>(path: P) -> Result<Publication> {
    let file = std::fs::File::open(path)?;
    read_epub_from_reader(file)
}

/// Read an EPUB from any [`Read`] + [`Seek`] source.
///
/// Content documents that cannot be parsed are left out of the pass and
/// reported in [`Publication::load_issues`]; their bytes are still written
/// back unchanged.
///
/// # Example
///
/// ```no_run
/// use std::io::Cursor;
/// use epub_a11y::epub::read_epub_from_reader;
///
/// let epub_data: Vec<u8> = std::fs::read("book.epub")?;
/// let publication = read_epub_from_reader(Cursor::new(epub_data))?;
/// # Ok::<(), epub_a11y::Error>(())
/// ```
pub fn read_epub_from_reader<R: Read + Seek>(reader: R) -> Result<Publication> {
    let mut archive = ZipArchive::new(reader)?;

    // 1. Keep every file of the container
    let entries = read_entries(&mut archive)?;
    let find = |name: &str| entries.iter().find(|e| e.name == name);

    // 2. Find and parse the package document
    let container = find("META-INF/container.xml")
        .ok_or_else(|| Error::InvalidEpub("missing META-INF/container.xml".into()))?;
    let opf_path = find_opf_path(&decode_text(&container.data, None))?;
    let opf = find(&opf_path)
        .ok_or_else(|| Error::InvalidEpub(format!("package document {opf_path} not found")))?;
    let (opf_markup, package_encoding) = decode_markup(&opf.data);
    let mut publication = Publication::from_package(opf_path.as_str(), &opf_markup)?;
    publication.package_encoding = package_encoding;

    // 3. Content documents and images from the manifest
    let items = publication.manifest.clone();
    for item in &items {
        if !(item.is_xhtml() || item.is_image()) {
            continue;
        }
        let Some(entry) = find(&item.path) else {
            tracing::warn!(path = %item.path, "manifest item missing from archive");
            continue;
        };
        if item.is_xhtml() {
            publication.add_document_bytes(item.path.as_str(), &entry.data);
        } else {
            publication.add_image(item.path.as_str(), item.media_type.as_str(), entry.data.clone());
        }
    }

    // 4. NCX, for EPUB 2 titles
    if let Some(ncx) = publication.ncx_item().map(|item| item.path.clone())
        && let Some(entry) = find(&ncx)
        && let Err(e) = publication.set_ncx(ncx.as_str(), &decode_markup(&entry.data).0)
    {
        publication.load_issues.push(
            Issue::new(IssueKind::MalformedMarkup, format!("NCX not readable: {e}"))
                .with_document(ncx),
        );
    }

    tracing::debug!(
        documents = publication.documents.len(),
        images = publication.images.len(),
        version = %publication.version,
        "read publication"
    );
    publication.entries = entries;
    Ok(publication)
}

fn read_entries<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            stored: file.compression() == CompressionMethod::Stored,
            data,
        });
    }
    Ok(entries)
}

fn find_opf_path(container: &str) -> Result<String> {
    let mut reader = Reader::from_str(container);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) if e.local_name().as_ref() == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.as_ref() == b"full-path" {
                        return Ok(String::from_utf8(attr.value.to_vec())?);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml {
                    position: reader.buffer_position(),
                    source: e,
                });
            }
            _ => {}
        }
    }

    Err(Error::InvalidEpub(
        "No rootfile found in container.xml".into(),
    ))
}
