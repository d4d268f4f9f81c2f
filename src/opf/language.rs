//! Primary-language attributes.
//!
//! The package element gets `xml:lang` copied from the first `dc:language`
//! when it declares none. Region subtags are preserved: `en-GB` stays `en-GB`.

use super::PackageMetadata;
use crate::dom::{Document, PatchSet};

/// Outcome of resolving the package `xml:lang`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageLanguage {
    /// The package already declares `xml:lang` (any value); left alone.
    Existing(String),
    /// `xml:lang` is absent and will be set to this value.
    Inject(String),
    /// Neither `xml:lang` nor a primary `dc:language` is available.
    Unknown,
}

impl PackageLanguage {
    /// Value to be written, if any.
    pub fn injected(&self) -> Option<&str> {
        match self {
            PackageLanguage::Inject(lang) => Some(lang),
            _ => None,
        }
    }
}

/// Decide what to do with the package `xml:lang`.
pub fn resolve_package_language(meta: &PackageMetadata<'_>) -> PackageLanguage {
    if let Some(existing) = meta.xml_lang() {
        return PackageLanguage::Existing(existing.into_owned());
    }
    match meta.primary_language() {
        Some(lang) => PackageLanguage::Inject(lang),
        None => PackageLanguage::Unknown,
    }
}

/// Queue the package `xml:lang` patch, if one is needed.
pub fn package_language_patches(meta: &PackageMetadata<'_>, patches: &mut PatchSet) -> PackageLanguage {
    let decision = resolve_package_language(meta);
    if let PackageLanguage::Inject(lang) = &decision {
        tracing::debug!(lang = %lang, "setting package xml:lang");
        patches.set_attribute(meta.package(), "xml:lang", lang);
    }
    decision
}

/// Queue `lang` and `xml:lang` on the `<html>` root of a content document,
/// each only if absent. A missing attribute copies its present partner so
/// the pair never disagrees; `lang` is used only when both are missing.
/// Returns whether anything was queued.
pub fn content_language_patches(doc: &Document, lang: &str, patches: &mut PatchSet) -> bool {
    let Some(html) = doc
        .root_element()
        .filter(|&id| doc.local_name(id) == Some("html"))
    else {
        return false;
    };

    let declared = ["lang", "xml:lang"]
        .into_iter()
        .filter_map(|attr| doc.get_attr(html, attr))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty());
    let value = declared.as_deref().unwrap_or(lang);

    let mut queued = false;
    for attr in ["lang", "xml:lang"] {
        if !doc.has_attr(html, attr) {
            tracing::debug!(attr, value, "setting content-document language");
            patches.set_attribute(html, attr, value);
            queued = true;
        }
    }
    queued
}
