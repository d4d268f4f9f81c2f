use std::io::{Read, Write};

use epub_a11y::{Engine, IssueKind, MappingResolver, read_epub, write_epub};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

const OPF: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="uid">urn:uuid:0f0e</dc:identifier>
    <dc:title>Sample</dc:title>
    <dc:language>en-US</dc:language>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ch1" href="Text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="ch2" href="Text/ch2.xhtml" media-type="application/xhtml+xml"/>
    <item id="css" href="Styles/main.css" media-type="text/css"/>
    <item id="fig" href="Images/fig.svg" media-type="image/svg+xml"/>
  </manifest>
  <spine>
    <itemref idref="ch1"/>
    <itemref idref="ch2"/>
  </spine>
</package>"#;

const NAV: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en-US" xml:lang="en-US">
<head><title>Contents</title></head>
<body>
  <nav epub:type="toc" role="doc-toc">
    <ol>
      <li><a href="Text/ch1.xhtml">The Beginning</a></li>
      <li><a href="Text/ch2.xhtml">The End</a></li>
    </ol>
  </nav>
</body>
</html>"#;

const CH1: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <title>   </title>
  <link rel="stylesheet" href="../Styles/main.css"/>
</head>
<body>
  <section epub:type="chapter">
    <p>Fish &amp; chips.</p>
    <img src="../Images/fig.svg"/>
  </section>
</body>
</html>"#;

const CH2_BROKEN: &str = "<html><body><p>unfinished <!-- comment";

const CSS: &str = "p { margin: 0 }\n";

const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 4 4"><desc>A small square</desc><rect width="4" height="4"/></svg>"#;

fn build_epub() -> NamedTempFile {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let mut zip = ZipWriter::new(file.reopen().expect("Failed to reopen temp file"));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("mimetype", stored).unwrap();
    zip.write_all(b"application/epub+zip").unwrap();
    for (name, content) in [
        ("META-INF/container.xml", CONTAINER),
        ("OEBPS/content.opf", OPF),
        ("OEBPS/nav.xhtml", NAV),
        ("OEBPS/Text/ch1.xhtml", CH1),
        ("OEBPS/Text/ch2.xhtml", CH2_BROKEN),
        ("OEBPS/Styles/main.css", CSS),
        ("OEBPS/Images/fig.svg", SVG),
    ] {
        zip.start_file(name, deflated).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    file
}

fn read_entry(archive: &mut ZipArchive<std::fs::File>, name: &str) -> String {
    let mut content = String::new();
    archive
        .by_name(name)
        .unwrap_or_else(|_| panic!("{name} missing"))
        .read_to_string(&mut content)
        .unwrap();
    content
}

#[test]
fn test_read_epub() {
    let source = build_epub();
    let publication = read_epub(source.path()).expect("Failed to read EPUB");

    assert_eq!(publication.package_path, "OEBPS/content.opf");
    assert_eq!(publication.nav_path.as_deref(), Some("OEBPS/nav.xhtml"));
    assert_eq!(publication.documents.len(), 2);
    assert!(publication.images.contains("OEBPS/Images/fig.svg"));
    assert_eq!(publication.entries.len(), 8);

    assert_eq!(publication.load_issues.len(), 1);
    assert_eq!(publication.load_issues[0].kind, IssueKind::MalformedMarkup);
    assert_eq!(
        publication.load_issues[0].document.as_deref(),
        Some("OEBPS/Text/ch2.xhtml")
    );
}

#[test]
fn test_round_trip() {
    let source = build_epub();
    let mut publication = read_epub(source.path()).unwrap();
    let report = Engine::default().run(&mut publication, &mut MappingResolver::new());

    assert_eq!(report.roles_added, 1);
    assert_eq!(report.titles_set, 1);
    assert_eq!(report.alt_written(), 1);

    let output = NamedTempFile::new().unwrap();
    write_epub(&publication, output.path()).expect("Failed to write EPUB");

    let mut archive = ZipArchive::new(std::fs::File::open(output.path()).unwrap()).unwrap();
    {
        let first = archive.by_index(0).unwrap();
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
    }
    assert_eq!(archive.len(), 8);

    // Untouched files are copied as read
    assert_eq!(read_entry(&mut archive, "OEBPS/Styles/main.css"), CSS);
    assert_eq!(read_entry(&mut archive, "OEBPS/Text/ch2.xhtml"), CH2_BROKEN);
    assert_eq!(read_entry(&mut archive, "OEBPS/nav.xhtml"), NAV);

    let ch1 = read_entry(&mut archive, "OEBPS/Text/ch1.xhtml");
    assert!(ch1.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE html>\n"));
    assert!(ch1.contains("<title>The Beginning</title>"));
    assert!(ch1.contains(r#"<section epub:type="chapter" role="doc-chapter">"#));
    assert!(ch1.contains(r#"<img src="../Images/fig.svg" alt="A small square"/>"#));
    assert!(ch1.contains("Fish &amp; chips."));
    assert!(ch1.contains(r#"lang="en-US" xml:lang="en-US""#));

    let opf = read_entry(&mut archive, "OEBPS/content.opf");
    assert!(opf.contains(r#"unique-identifier="uid" xml:lang="en-US">"#));
    assert!(opf.contains(r#"<meta property="schema:accessMode">visual</meta>"#));
    assert!(opf.contains(r#"<meta property="schema:accessibilityHazard">none</meta>"#));
}

#[test]
fn test_rewritten_epub_needs_no_second_pass() {
    let source = build_epub();
    let mut publication = read_epub(source.path()).unwrap();
    Engine::default().run(&mut publication, &mut MappingResolver::new());

    let output = NamedTempFile::new().unwrap();
    write_epub(&publication, output.path()).unwrap();

    let mut again = read_epub(output.path()).unwrap();
    let report = Engine::default().run(&mut again, &mut MappingResolver::new());
    assert!(report.is_noop(), "{report}");
    assert!(!again.is_modified());
}

#[test]
fn test_declared_encoding_survives_rewrite() {
    let mut chapter = br#"<?xml version="1.0" encoding="ISO-8859-1"?>
<html xmlns="http://www.w3.org/1999/xhtml"><head><title>Menu</title></head><body><p>Cr"#
        .to_vec();
    chapter.extend_from_slice(b"\xE8me br\xFBl\xE9e</p></body></html>");
    let opf = OPF.replace("en-US", "fr");

    let source = NamedTempFile::new().unwrap();
    {
        let mut zip = ZipWriter::new(source.reopen().unwrap());
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file("mimetype", stored).unwrap();
        zip.write_all(b"application/epub+zip").unwrap();
        for (name, content) in [
            ("META-INF/container.xml", CONTAINER.as_bytes()),
            ("OEBPS/content.opf", opf.as_bytes()),
            ("OEBPS/Text/ch1.xhtml", chapter.as_slice()),
        ] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    let mut publication = read_epub(source.path()).unwrap();
    let dom = &publication.documents[0].dom;
    assert!(dom.text_content(dom.root()).contains("Crème brûlée"));
    Engine::default().run(&mut publication, &mut MappingResolver::new());
    assert!(publication.documents[0].modified);

    let output = NamedTempFile::new().unwrap();
    write_epub(&publication, output.path()).unwrap();
    let mut archive = ZipArchive::new(std::fs::File::open(output.path()).unwrap()).unwrap();
    let mut written = Vec::new();
    archive
        .by_name("OEBPS/Text/ch1.xhtml")
        .unwrap()
        .read_to_end(&mut written)
        .unwrap();

    assert!(written.starts_with(br#"<?xml version="1.0" encoding="ISO-8859-1"?>"#));
    assert!(written.windows(6).any(|w| w == b"Cr\xE8me"));
    assert!(std::str::from_utf8(&written).is_err());
    let text = String::from_utf8_lossy(&written);
    assert!(text.contains(r#"lang="fr" xml:lang="fr""#));
}
