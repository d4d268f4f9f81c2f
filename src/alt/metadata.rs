//! Descriptions embedded in image files.
//!
//! Two fields are of interest: the IPTC `AltTextAccessibility` language
//! alternative carried in an XMP packet, and the EXIF `ImageDescription`
//! tag (270), used as a legacy fallback.

use std::collections::BTreeMap;
use std::io::Cursor;

use memchr::memmem;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::epub::ImageResource;
use crate::error::ProviderError;
use crate::util::{base_language, decode_text, local_name, resolve_entity};

/// Descriptions found in an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    /// XMP `AltTextAccessibility` for the requested language.
    pub accessibility_description: Option<String>,
    /// EXIF `ImageDescription`.
    pub description: Option<String>,
}

/// Source of embedded image descriptions.
pub trait MetadataExtractor {
    /// Read descriptions from an image, preferring text in `language`.
    fn extract(
        &self,
        image: &ImageResource,
        language: Option<&str>,
    ) -> Result<ImageMetadata, ProviderError>;
}

/// Extractor reading XMP and EXIF straight from JPEG, PNG, WebP and TIFF bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedMetadata;

impl MetadataExtractor for EmbeddedMetadata {
    fn extract(
        &self,
        image: &ImageResource,
        language: Option<&str>,
    ) -> Result<ImageMetadata, ProviderError> {
        let accessibility_description = find_xmp_packet(&image.data)
            .map(|packet| parse_alt_text_accessibility(&decode_text(packet, None)))
            .and_then(|alternatives| select_language(&alternatives, language));

        let description = image_description(&image.data);

        Ok(ImageMetadata {
            accessibility_description,
            description,
        })
    }
}

// ---- XMP ----

/// Locate the `<x:xmpmeta>` element of an XMP packet inside image bytes.
pub fn find_xmp_packet(data: &[u8]) -> Option<&[u8]> {
    const OPEN: &[u8] = b"<x:xmpmeta";
    const CLOSE: &[u8] = b"</x:xmpmeta>";

    let start = memmem::find(data, OPEN)?;
    let len = memmem::find(&data[start..], CLOSE)?;
    Some(&data[start..start + len + CLOSE.len()])
}

/// Language alternatives of `AltTextAccessibility`, keyed by lowercased
/// `xml:lang`.
///
/// Items without a language are stored under `x-default`. Each regional
/// entry also answers for its base language unless that has its own entry.
/// When two items carry the same tag the first one is kept.
pub fn parse_alt_text_accessibility(xmp: &str) -> BTreeMap<String, String> {
    let mut reader = Reader::from_str(xmp);
    reader.config_mut().trim_text(false);

    let mut alternatives: BTreeMap<String, String> = BTreeMap::new();
    let mut base_fallbacks: Vec<(String, String)> = Vec::new();
    let mut in_alt_text = false;
    let mut current: Option<(String, String)> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match local_name(&name) {
                    "AltTextAccessibility" => in_alt_text = true,
                    "li" if in_alt_text => {
                        let lang = e
                            .attributes()
                            .flatten()
                            .find(|a| a.key.as_ref() == b"xml:lang")
                            .map(|a| String::from_utf8_lossy(&a.value).trim().to_ascii_lowercase())
                            .unwrap_or_else(|| "x-default".to_string());
                        current = Some((lang, String::new()));
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some((_, text)) = current.as_mut()
                    && let Some(resolved) = resolve_entity(&String::from_utf8_lossy(&e))
                {
                    text.push_str(&resolved);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match local_name(&name) {
                    "li" => {
                        if let Some((lang, text)) = current.take() {
                            let text = text.trim().to_string();
                            if let Some(base) = base_language(&lang) {
                                base_fallbacks.push((base.to_string(), text.clone()));
                            }
                            alternatives.entry(lang).or_insert(text);
                        }
                    }
                    "AltTextAccessibility" => in_alt_text = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!("stopping at malformed XMP: {e}");
                break;
            }
            _ => {}
        }
    }

    for (base, text) in base_fallbacks {
        alternatives.entry(base).or_insert(text);
    }
    alternatives
}

/// Pick the alternative for `language`: exact tag, then its base language,
/// then `x-default`. Blank texts never match.
pub fn select_language(
    alternatives: &BTreeMap<String, String>,
    language: Option<&str>,
) -> Option<String> {
    let lookup = |tag: &str| {
        alternatives
            .get(&tag.to_ascii_lowercase())
            .filter(|text| !text.is_empty())
            .cloned()
    };

    language
        .and_then(|lang| lookup(lang).or_else(|| base_language(lang).and_then(lookup)))
        .or_else(|| lookup("x-default"))
}

// ---- EXIF ----

/// `ImageDescription` from the primary IFD of the EXIF block in a JPEG,
/// PNG, WebP or TIFF file.
pub fn image_description(data: &[u8]) -> Option<String> {
    let exif = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif) => exif,
        Err(exif::Error::NotFound(_)) => return None,
        Err(e) => {
            tracing::debug!("ignoring unreadable EXIF: {e}");
            return None;
        }
    };

    let field = exif.get_field(exif::Tag::ImageDescription, exif::In::PRIMARY)?;
    let exif::Value::Ascii(ref values) = field.value else {
        return None;
    };
    let text = decode_text(values.first()?, None);
    let text = text.trim_end_matches('\0').trim();
    (!text.is_empty()).then(|| text.to_string())
}


#[cfg(test)]
mod tests {
    use super::test_images::*;
    use super::*;

    fn image(data: Vec<u8>) -> ImageResource {
        ImageResource {
            path: "OEBPS/Images/bike.jpg".into(),
            media_type: "image/jpeg".into(),
            data,
        }
    }

    #[test]
    fn test_xmp_language_selection() {
        let xmp = xmp_packet(&[
            ("x-default", "A bicycle"),
            ("en-GB", "A red bicycle"),
            ("fr", "Un vélo rouge"),
        ]);
        let alternatives = parse_alt_text_accessibility(&xmp);

        assert_eq!(
            select_language(&alternatives, Some("en-GB")).as_deref(),
            Some("A red bicycle")
        );
        // Base-language match both ways.
        assert_eq!(
            select_language(&alternatives, Some("en")).as_deref(),
            Some("A red bicycle")
        );
        assert_eq!(
            select_language(&alternatives, Some("fr-CA")).as_deref(),
            Some("Un vélo rouge")
        );
        assert_eq!(
            select_language(&alternatives, Some("de")).as_deref(),
            Some("A bicycle")
        );
        assert_eq!(
            select_language(&alternatives, None).as_deref(),
            Some("A bicycle")
        );
    }

    #[test]
    fn test_xmp_language_tags_ignore_case() {
        let xmp = xmp_packet(&[("EN-gb", "First"), ("en-GB", "Second"), ("x-default", "Other")]);
        let alternatives = parse_alt_text_accessibility(&xmp);

        assert_eq!(alternatives.get("en-gb").map(String::as_str), Some("First"));
        assert_eq!(
            select_language(&alternatives, Some("en-GB")).as_deref(),
            Some("First")
        );
        assert_eq!(select_language(&alternatives, Some("EN")).as_deref(), Some("First"));
    }

    #[test]
    fn test_xmp_without_default_or_match() {
        let alternatives = parse_alt_text_accessibility(&xmp_packet(&[("fr", "Un vélo")]));
        assert_eq!(select_language(&alternatives, Some("de")), None);
    }

    #[test]
    fn test_tiff_description() {
        assert_eq!(
            image_description(&tiff_with_description("Sunset over the bay")).as_deref(),
            Some("Sunset over the bay")
        );
        assert_eq!(image_description(&tiff_with_description("   ")), None);
        assert_eq!(image_description(&tiff_with_description("Owl")).as_deref(), Some("Owl"));
        assert_eq!(image_description(b"II*\0\xff\xff\xff\xff"), None);
        assert_eq!(image_description(b"garbage"), None);
    }

    #[test]
    fn test_short_inline_description() {
        // Three characters plus NUL fit in the entry itself.
        let mut tiff = b"MM\0*".to_vec();
        tiff.extend_from_slice(&8u32.to_be_bytes());
        tiff.extend_from_slice(&1u16.to_be_bytes());
        tiff.extend_from_slice(&270u16.to_be_bytes());
        tiff.extend_from_slice(&2u16.to_be_bytes());
        tiff.extend_from_slice(&4u32.to_be_bytes());
        tiff.extend_from_slice(b"Cat\0");
        tiff.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(image_description(&tiff).as_deref(), Some("Cat"));
    }

    #[test]
    fn test_jpeg_extraction() {
        let xmp = xmp_packet(&[("en", "A red bicycle")]);
        let data = jpeg(Some(&xmp), Some("IMG_0042"));
        let metadata = EmbeddedMetadata.extract(&image(data), Some("en-US")).unwrap();
        assert_eq!(
            metadata.accessibility_description.as_deref(),
            Some("A red bicycle")
        );
        assert_eq!(metadata.description.as_deref(), Some("IMG_0042"));
    }

    #[test]
    fn test_png_and_webp_exif() {
        let metadata = EmbeddedMetadata
            .extract(&image(png_with_description("Chart")), None)
            .unwrap();
        assert_eq!(metadata.description.as_deref(), Some("Chart"));
        assert_eq!(metadata.accessibility_description, None);

        let metadata = EmbeddedMetadata
            .extract(&image(webp_with_description("Photo")), None)
            .unwrap();
        assert_eq!(metadata.description.as_deref(), Some("Photo"));
    }

    #[test]
    fn test_no_metadata() {
        let metadata = EmbeddedMetadata
            .extract(&image(jpeg(None, None)), Some("en"))
            .unwrap();
        assert_eq!(metadata, ImageMetadata::default());
    }
}
