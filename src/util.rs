//! Text, XML and path helpers shared by the parser, the engine and the host glue.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

use encoding_rs::{Encoding, UTF_8};
use quick_xml::Reader;
use quick_xml::escape::{escape, resolve_predefined_entity, unescape};
use quick_xml::events::Event;

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252 (common in old ebooks)
///
/// Uses `Cow<str>` to avoid allocation when the input is valid UTF-8.
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Encoding named by the XML declaration (`<?xml ... encoding="..."?>`).
pub fn declared_encoding(bytes: &[u8]) -> Option<&'static Encoding> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = Reader::from_reader(bytes);
    let mut buf = Vec::new();
    match reader.read_event_into(&mut buf) {
        Ok(Event::Decl(decl)) => {
            let label = decl.encoding()?.ok()?;
            Encoding::for_label(&label)
        }
        _ => None,
    }
}

/// Decode a markup file and pick the encoding to write it back in.
///
/// A single-byte or legacy multi-byte encoding named by the XML declaration
/// is honoured both ways. Everything else is read with [`decode_text`] and
/// written as UTF-8.
pub fn decode_markup(bytes: &[u8]) -> (Cow<'_, str>, &'static Encoding) {
    match declared_encoding(bytes).filter(|&e| e != UTF_8 && e.output_encoding() == e) {
        Some(encoding) => (encoding.decode(bytes).0, encoding),
        None => (decode_text(bytes, None), UTF_8),
    }
}

/// Encode serialized markup in `encoding`. Characters the encoding cannot
/// represent become numeric character references.
pub fn encode_markup<'a>(markup: &'a str, encoding: &'static Encoding) -> Cow<'a, [u8]> {
    encoding.encode(markup).0
}

/// Escape a string for use in XML text or a double-quoted attribute value.
pub fn escape_xml(s: &str) -> String {
    escape(s).into_owned()
}

/// Resolve the escaped (raw) form of XML text into plain text.
///
/// Entity references that cannot be resolved (e.g. `&nbsp;` without a DTD)
/// are kept verbatim instead of failing the whole value.
pub fn unescape_xml(raw: &str) -> Cow<'_, str> {
    if let Ok(text) = unescape(raw) {
        return text;
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let resolved = tail
            .find(';')
            .filter(|&end| end > 1 && end <= 33)
            .and_then(|end| resolve_entity(&tail[1..end]).map(|text| (text, end)));

        match resolved {
            Some((text, end)) => {
                out.push_str(&text);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Resolve an entity or character reference name (`amp`, `#8217`, `#x41`).
pub fn resolve_entity(entity: &str) -> Option<String> {
    if let Some(text) = resolve_predefined_entity(entity) {
        return Some(text.to_string());
    }
    if !entity.starts_with('#') {
        return None;
    }
    unescape(&format!("&{entity};")).ok().map(Cow::into_owned)
}

/// Extract local name from a namespaced XML name (e.g., "dc:title" -> "title").
pub fn local_name(name: &str) -> &str {
    name.rsplit_once(':').map(|(_, local)| local).unwrap_or(name)
}

/// Split an href into its path and optional fragment, dropping any query.
pub fn split_href(href: &str) -> (&str, Option<&str>) {
    let (before_fragment, fragment) = match href.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (href, None),
    };
    let path = before_fragment
        .split_once('?')
        .map(|(path, _)| path)
        .unwrap_or(before_fragment);
    (path, fragment.filter(|f| !f.is_empty()))
}

/// Whether an href points outside the publication container.
pub fn is_external_href(href: &str) -> bool {
    let lower = href.trim_start().to_ascii_lowercase();
    lower.contains("://") || lower.starts_with("data:") || lower.starts_with("mailto:")
}

/// Resolve an href found in `base` (a book path such as `OEBPS/Text/ch1.xhtml`)
/// to the book path of its target.
///
/// Query and fragment are dropped, percent-escapes are decoded and `..`
/// segments are normalized. Returns `None` for external references.
/// A fragment-only href resolves to `base` itself.
pub fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if is_external_href(href) {
        return None;
    }

    let (path, _) = split_href(href);
    if path.is_empty() {
        return Some(base.to_string());
    }

    let decoded = percent_encoding::percent_decode_str(path).decode_utf8_lossy();
    if let Some(absolute) = decoded.strip_prefix('/') {
        return Some(normalize_path(Path::new(absolute)));
    }

    let base_dir = Path::new(base).parent().unwrap_or(Path::new(""));
    Some(normalize_path(&base_dir.join(decoded.as_ref())))
}

/// Normalize `.`/`..` components and render with forward slashes.
fn normalize_path(path: &Path) -> String {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(name) => {
                result.push(name);
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    result
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Primary language subtag of a language tag with a region or script
/// (`"en-GB"` -> `"en"`). Returns `None` when the tag has no subtags.
pub fn base_language(tag: &str) -> Option<&str> {
    let (base, rest) = tag.split_once(['-', '_'])?;
    (!base.is_empty() && !rest.is_empty()).then_some(base)
}
