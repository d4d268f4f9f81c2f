//! Accessibility-schema metadata synthesis.
//!
//! Feature usage across the publication decides which `schema:*` entries can
//! be claimed truthfully. Usage of audio, video, scripting or MathML never
//! blocks the injection; it only removes the claims it would falsify.

use super::PackageMetadata;
use crate::dom::{Document, NewElement, PatchSet};
use crate::epub::{EpubVersion, ManifestItem, Publication};

pub const ACCESSIBILITY_SUMMARY: &str = "schema:accessibilitySummary";
pub const ACCESS_MODE: &str = "schema:accessMode";
pub const ACCESS_MODE_SUFFICIENT: &str = "schema:accessModeSufficient";
pub const ACCESSIBILITY_FEATURE: &str = "schema:accessibilityFeature";
pub const ACCESSIBILITY_HAZARD: &str = "schema:accessibilityHazard";

/// Conformance statement claimed when nothing in the publication contradicts it.
pub const SUMMARY_TEXT: &str = "This publication conforms to WCAG 2.1 AA.";

/// Feature usage detected across a publication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AccessibilityFeatureFlags {
    pub has_audio: bool,
    pub has_video: bool,
    pub has_script: bool,
    pub has_math: bool,
    pub has_images: bool,
}

impl AccessibilityFeatureFlags {
    /// Scan every content document and the manifest of a publication.
    pub fn detect(publication: &Publication) -> Self {
        let mut flags = Self::default();
        flags.scan_manifest(&publication.manifest);
        for doc in &publication.documents {
            flags.scan_document(&doc.dom);
        }
        flags
    }

    /// Record features used by a content document.
    pub fn scan_document(&mut self, doc: &Document) {
        for id in doc.descendants(doc.root()) {
            match doc.local_name(id) {
                Some("audio") => self.has_audio = true,
                Some("video") => self.has_video = true,
                Some("script") => self.has_script = true,
                Some("math") => self.has_math = true,
                Some("img" | "image" | "svg" | "picture") => self.has_images = true,
                Some(_) => {}
                None => continue,
            }
            if doc
                .attrs(id)
                .iter()
                .any(|a| a.name.len() > 2 && a.name.to_ascii_lowercase().starts_with("on"))
            {
                self.has_script = true;
            }
        }
    }

    /// Record features declared by the manifest.
    pub fn scan_manifest(&mut self, items: &[ManifestItem]) {
        for item in items {
            if item.media_type.starts_with("audio/") {
                self.has_audio = true;
            }
            if item.media_type.starts_with("video/") {
                self.has_video = true;
            }
            if item.is_image() {
                self.has_images = true;
            }
            if item.has_property("scripted") {
                self.has_script = true;
            }
            if item.has_property("mathml") {
                self.has_math = true;
            }
        }
    }

    pub fn has_media(&self) -> bool {
        self.has_audio || self.has_video
    }

    /// Whether the conformance summary would be a false claim.
    pub fn falsifies_summary(&self) -> bool {
        self.has_media() || self.has_script || self.has_math
    }
}

/// A metadata entry to be declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaEntry {
    pub property: &'static str,
    pub value: &'static str,
}

const fn entry(property: &'static str, value: &'static str) -> SchemaEntry {
    SchemaEntry { property, value }
}

/// The entries that hold for a publication with these features.
pub fn synthesize(flags: &AccessibilityFeatureFlags) -> Vec<SchemaEntry> {
    let mut entries = Vec::new();

    if !flags.falsifies_summary() {
        entries.push(entry(ACCESSIBILITY_SUMMARY, SUMMARY_TEXT));
    }

    entries.push(entry(ACCESS_MODE, "textual"));
    if flags.has_images {
        entries.push(entry(ACCESS_MODE, "visual"));
    }
    if flags.has_media() {
        entries.push(entry(ACCESS_MODE, "auditory"));
    } else {
        entries.push(entry(ACCESS_MODE_SUFFICIENT, "textual"));
    }

    entries.push(entry(ACCESSIBILITY_FEATURE, "structuralNavigation"));
    if flags.has_math {
        entries.push(entry(ACCESSIBILITY_FEATURE, "MathML"));
    }

    let hazard = if flags.has_media() || flags.has_script {
        "unknown"
    } else {
        "none"
    };
    entries.push(entry(ACCESSIBILITY_HAZARD, hazard));

    entries
}

/// The metadata element for an entry in the form the EPUB version expects.
pub fn meta_element(entry: &SchemaEntry, version: EpubVersion) -> NewElement {
    if version.is_epub3() {
        NewElement::new("meta")
            .with_attr("property", entry.property)
            .with_text(entry.value)
    } else {
        NewElement::new("meta")
            .with_attr("name", entry.property)
            .with_attr("content", entry.value)
    }
}

/// Queue the synthesized entries the package does not already declare.
///
/// Deduplication is by property: if the package declares a property at all,
/// none of the synthesized values for it are added. Returns what was queued.
pub fn metadata_patches(
    meta: &PackageMetadata<'_>,
    version: EpubVersion,
    flags: &AccessibilityFeatureFlags,
    patches: &mut PatchSet,
) -> Vec<SchemaEntry> {
    let Some(metadata) = meta.metadata() else {
        return Vec::new();
    };

    let entries = meta.entries();
    let declared = |property: &str| {
        entries
            .iter()
            .any(|e| e.refines.is_none() && e.property == property)
    };

    let added: Vec<SchemaEntry> = synthesize(flags)
        .into_iter()
        .filter(|entry| !declared(entry.property))
        .collect();

    for entry in &added {
        tracing::debug!(property = entry.property, value = entry.value, "adding metadata");
        patches.append_element(metadata, meta_element(entry, version));
    }
    added
}
