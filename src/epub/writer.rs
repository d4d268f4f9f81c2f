use std::io::{Seek, Write};
use std::path::Path;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::Publication;
use crate::dom::serialize;
use crate::error::Result;
use crate::util::encode_markup;

const MIMETYPE: &[u8] = b"application/epub+zip";

/// Write a [`Publication`] to an EPUB file on disk.
///
/// The package document and content documents changed by a pass are
/// serialized; every other file of the source container is copied as read.
///
/// # Example
///
/// ```no_run
/// use epub_a11y::{Engine, EngineConfig, MappingResolver, read_epub, write_epub};
///
/// let mut publication = read_epub("in.epub")?;
/// let report = Engine::new(EngineConfig::default()).run(&mut publication, &mut MappingResolver::new());
/// write_epub(&publication, "out.epub")?;
/// # Ok::<(), epub_a11y::Error>(())
/// ```
pub fn write_epub<P: AsRef<Path>>(publication: &Publication, path: P) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_epub_to_writer(publication, file)
}

/// Write a [`Publication`] to any [`Write`] + [`Seek`] destination.
///
/// `mimetype` is always written first and uncompressed.
pub fn write_epub_to_writer<W: Write + Seek>(publication: &Publication, writer: W) -> Result<()> {
    let mut zip = ZipWriter::new(writer);

    let options_stored =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    let options_deflate =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    // 1. mimetype (must be first, uncompressed)
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(MIMETYPE)?;

    // 2. Everything else in source order, patched files re-serialized
    for entry in publication.entries.iter().filter(|e| e.name != "mimetype") {
        let options = if entry.stored {
            options_stored
        } else {
            options_deflate
        };
        zip.start_file(entry.name.as_str(), options)?;

        if entry.name == publication.package_path && publication.package_modified {
            let markup = serialize(&publication.package);
            zip.write_all(&encode_markup(&markup, publication.package_encoding))?;
        } else if let Some(doc) = publication.document(&entry.name).filter(|d| d.modified) {
            let markup = serialize(&doc.dom);
            zip.write_all(&encode_markup(&markup, doc.encoding))?;
        } else {
            zip.write_all(&entry.data)?;
        }
    }

    zip.finish()?;
    Ok(())
}
