//! Image alt-text resolution.
//!
//! Every `<img>` of every content document is one image reference, even when
//! several reference the same file. Each walks this state machine once per
//! pass:
//!
//! ```text
//! Unchecked -> HasExistingAlt
//!           -> NeedsResolution -> Resolved(source)
//!                              -> LeftEmpty
//! ```
//!
//! `NeedsResolution` tries the image's own metadata first (XMP accessibility
//! description, EXIF description, SVG `<desc>`), then queues the reference
//! for an [`AltTextResolver`].

pub mod metadata;
pub mod resolver;
pub mod svg;

use std::fmt;

use crate::dom::{NodeId, Patch};
use crate::epub::{ContentDocument, ImageStore};
use crate::report::{AltTextOutcome, Issue, IssueKind};
use crate::util::{decode_text, resolve_href};

pub use metadata::{EmbeddedMetadata, ImageMetadata, MetadataExtractor};
pub use resolver::{
    AiResolver, AltTextResolver, ImageDescriber, MappingResolver, Resolution, ResolutionRequest,
    ResolvedBatch,
};
pub use svg::extract_description;

/// One `<img>` occurrence: the n-th image (1-based) of a content document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImageRef {
    /// Container path of the referenced image; the raw `src` when it cannot
    /// be resolved inside the container.
    pub image: String,
    pub document: String,
    pub ordinal: usize,
}

impl ImageRef {
    pub fn new(image: impl Into<String>, document: impl Into<String>, ordinal: usize) -> Self {
        Self {
            image: image.into(),
            document: document.into(),
            ordinal,
        }
    }

    /// Stable identifier: `<document>#<ordinal>`.
    pub fn key(&self) -> String {
        format!("{}#{}", self.document, self.ordinal)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} ({})", self.document, self.ordinal, self.image)
    }
}

/// Where an alt text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum AltSource {
    Xmp,
    Exif,
    SvgDesc,
    Operator,
    AiProvider,
    None,
}

impl fmt::Display for AltSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AltSource::Xmp => "xmp",
            AltSource::Exif => "exif",
            AltSource::SvgDesc => "svg-desc",
            AltSource::Operator => "operator",
            AltSource::AiProvider => "ai-provider",
            AltSource::None => "none",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AltState {
    Unchecked,
    /// Non-whitespace alt already present; never touched.
    HasExistingAlt,
    /// Waiting for external resolution, or rolled back to it.
    NeedsResolution,
    Resolved(AltSource),
    /// Queued, but no text came back; written as `alt=""`.
    LeftEmpty,
}

impl AltState {
    /// Whether an alt attribute is written for this state.
    pub fn writes_alt(self) -> bool {
        matches!(self, AltState::Resolved(_) | AltState::LeftEmpty)
    }
}

/// An `<img>` found in a content document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOccurrence {
    pub image: ImageRef,
    pub node: NodeId,
    /// Element path of the `<img>`, for issue context.
    pub path: String,
    /// Current alt attribute value, unescaped.
    pub alt: Option<String>,
    pub title: Option<String>,
}

/// Collect the `<img>` elements of a document in document order.
pub fn collect_images(doc: &ContentDocument) -> Vec<ImageOccurrence> {
    let dom = &doc.dom;
    dom.descendants(dom.root())
        .filter(|&id| dom.local_name(id) == Some("img"))
        .enumerate()
        .map(|(index, node)| {
            let src = dom.get_attr(node, "src").unwrap_or_default();
            let image = resolve_href(&doc.id, src.trim()).unwrap_or_else(|| src.to_string());
            ImageOccurrence {
                image: ImageRef::new(image, doc.id.as_str(), index + 1),
                node,
                path: dom.element_path(node),
                alt: dom.get_attr(node, "alt").map(|a| a.into_owned()),
                title: dom
                    .get_attr(node, "title")
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            }
        })
        .collect()
}

/// First transition out of `Unchecked`.
pub fn classify(occurrence: &ImageOccurrence) -> AltState {
    match &occurrence.alt {
        Some(alt) if !alt.trim().is_empty() => AltState::HasExistingAlt,
        _ => AltState::NeedsResolution,
    }
}

/// Ordered lookup of an image's own description.
pub struct MetadataLookup<'a> {
    images: &'a ImageStore,
    extractor: &'a dyn MetadataExtractor,
    language: Option<&'a str>,
}

impl<'a> MetadataLookup<'a> {
    pub fn new(images: &'a ImageStore, extractor: &'a dyn MetadataExtractor) -> Self {
        Self {
            images,
            extractor,
            language: None,
        }
    }

    /// Prefer XMP alternatives in this language.
    pub fn with_language(mut self, language: Option<&'a str>) -> Self {
        self.language = language;
        self
    }

    /// XMP accessibility description, then EXIF description, then SVG
    /// `<desc>`. A failing extractor is reported and treated as "no
    /// metadata", so the SVG step still runs; `path` locates the `<img>` in
    /// any issue raised.
    pub fn lookup(
        &self,
        image: &ImageRef,
        path: &str,
        issues: &mut Vec<Issue>,
    ) -> Option<(AltSource, String)> {
        let resource = self.images.get(&image.image)?;

        match self.extractor.extract(resource, self.language) {
            Ok(found) => {
                let nonblank = |text: Option<String>| {
                    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
                };
                if let Some(text) = nonblank(found.accessibility_description) {
                    return Some((AltSource::Xmp, text));
                }
                if let Some(text) = nonblank(found.description) {
                    return Some((AltSource::Exif, text));
                }
            }
            Err(e) => {
                issues.push(
                    Issue::new(IssueKind::ProviderFailure, e.to_string())
                        .with_image(image)
                        .with_path(path),
                );
            }
        }

        if resource.is_svg() {
            let markup = decode_text(&resource.data, None);
            if let Some(text) = extract_description(&markup) {
                return Some((AltSource::SvgDesc, text));
            }
        }
        None
    }
}

/// The alt-text decision for one image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltTextCandidate {
    pub image: ImageRef,
    pub node: NodeId,
    pub path: String,
    pub state: AltState,
    pub source: AltSource,
    /// Text to write; the existing alt for `HasExistingAlt`.
    pub text: String,
    suggested_text: Option<String>,
}

impl AltTextCandidate {
    fn request(&self) -> ResolutionRequest {
        ResolutionRequest {
            image: self.image.clone(),
            source_document: self.image.document.clone(),
            suggested_text: self.suggested_text.clone(),
        }
    }

    fn outcome(&self) -> AltTextOutcome {
        let text = match self.state {
            AltState::HasExistingAlt | AltState::Resolved(_) => Some(self.text.clone()),
            _ => None,
        };
        AltTextOutcome {
            image: self.image.clone(),
            state: self.state,
            text,
        }
    }
}

/// Alt-text candidates of a whole publication, one per image reference.
#[derive(Debug, Clone, Default)]
pub struct AltTextPlan {
    pub candidates: Vec<AltTextCandidate>,
    pub issues: Vec<Issue>,
}

impl AltTextPlan {
    /// Classify every image and run the metadata lookup for those needing
    /// alt text. Nothing is modified.
    pub fn build(documents: &[ContentDocument], lookup: &MetadataLookup<'_>) -> Self {
        let mut plan = Self::default();

        for doc in documents {
            for occurrence in collect_images(doc) {
                let state = classify(&occurrence);
                let mut candidate = AltTextCandidate {
                    image: occurrence.image,
                    node: occurrence.node,
                    path: occurrence.path,
                    state: AltState::Unchecked,
                    source: AltSource::None,
                    text: String::new(),
                    suggested_text: occurrence.title,
                };

                candidate.state = match state {
                    AltState::HasExistingAlt => {
                        candidate.text = occurrence.alt.unwrap_or_default();
                        AltState::HasExistingAlt
                    }
                    _ => match lookup.lookup(&candidate.image, &candidate.path, &mut plan.issues) {
                        Some((source, text)) => {
                            tracing::debug!(image = %candidate.image, %source, "alt text from metadata");
                            candidate.source = source;
                            candidate.text = text;
                            AltState::Resolved(source)
                        }
                        None => {
                            plan.issues.push(
                                Issue::new(
                                    IssueKind::MissingMetadataSource,
                                    format!("no embedded description for {}", candidate.image.image),
                                )
                                .with_image(&candidate.image)
                                .with_path(candidate.path.as_str()),
                            );
                            AltState::NeedsResolution
                        }
                    },
                };
                plan.candidates.push(candidate);
            }
        }
        plan
    }

    /// Requests for every candidate still needing resolution.
    pub fn requests(&self) -> Vec<ResolutionRequest> {
        self.candidates
            .iter()
            .filter(|c| c.state == AltState::NeedsResolution)
            .map(AltTextCandidate::request)
            .collect()
    }

    /// Hand the queued candidates to `resolver` as one batch.
    ///
    /// On cancellation every queued candidate stays `NeedsResolution` and a
    /// single `ResolutionCancelled` issue is recorded. Otherwise each queued
    /// candidate becomes `Resolved` or `LeftEmpty`. The resolver is not
    /// called when nothing is queued.
    pub fn resolve<R: AltTextResolver + ?Sized>(&mut self, resolver: &mut R) {
        let batch = self.requests();
        if batch.is_empty() {
            return;
        }
        tracing::debug!(count = batch.len(), "requesting alt text");

        let resolved = match resolver.resolve(&batch) {
            Resolution::Cancelled => {
                self.issues.push(Issue::new(
                    IssueKind::ResolutionCancelled,
                    format!("alt-text resolution of {} images cancelled", batch.len()),
                ));
                return;
            }
            Resolution::Resolved(resolved) => resolved,
        };

        let source = resolver.source();
        for (image, error) in resolved.failures {
            let mut issue = Issue::new(IssueKind::ProviderFailure, error.to_string()).with_image(&image);
            if let Some(candidate) = self.candidates.iter().find(|c| c.image == image) {
                issue = issue.with_path(candidate.path.as_str());
            }
            self.issues.push(issue);
        }

        for candidate in &mut self.candidates {
            if candidate.state != AltState::NeedsResolution {
                continue;
            }
            match resolved
                .texts
                .get(&candidate.image)
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
            {
                Some(text) => {
                    candidate.state = AltState::Resolved(source);
                    candidate.source = source;
                    candidate.text = text.to_string();
                }
                None => {
                    candidate.state = AltState::LeftEmpty;
                    candidate.source = AltSource::None;
                    candidate.text.clear();
                }
            }
        }
    }

    /// Alt attribute patches for `document`.
    pub fn patches_for<'p>(&'p self, document: &'p str) -> impl Iterator<Item = Patch> + 'p {
        self.candidates
            .iter()
            .filter(move |c| c.image.document == document && c.state.writes_alt())
            .map(|c| Patch::SetAttribute {
                node: c.node,
                name: "alt".to_string(),
                value: c.text.clone(),
            })
    }

    pub fn outcomes(&self) -> Vec<AltTextOutcome> {
        self.candidates.iter().map(AltTextCandidate::outcome).collect()
    }
}
