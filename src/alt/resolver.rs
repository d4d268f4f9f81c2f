//! External alt-text resolution.
//!
//! Images without usable embedded metadata are handed to an
//! [`AltTextResolver`] in one batch. The resolver is either an operator
//! (texts typed in by a person, supplied as a mapping) or an AI description
//! service; the engine does not care which.

use std::collections::HashMap;

use super::{AltSource, ImageRef};
use crate::epub::{ImageResource, ImageStore};
use crate::error::ProviderError;

/// An image that still needs alt text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ResolutionRequest {
    pub image: ImageRef,
    /// Content document containing the `<img>`.
    pub source_document: String,
    /// Hint for the resolver, taken from the image `title` attribute.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub suggested_text: Option<String>,
}

/// Texts produced for a batch.
///
/// A request without an entry (or with a blank one) is left empty.
#[derive(Debug, Default)]
pub struct ResolvedBatch {
    pub texts: HashMap<ImageRef, String>,
    /// Requests the resolver could not serve, with the reason.
    pub failures: Vec<(ImageRef, ProviderError)>,
}

impl ResolvedBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image: ImageRef, text: impl Into<String>) {
        self.texts.insert(image, text.into());
    }
}

/// Answer of a resolver for a whole batch.
#[derive(Debug)]
pub enum Resolution {
    Resolved(ResolvedBatch),
    /// Nothing from this batch may be applied.
    Cancelled,
}

/// Capability to supply alt text for a batch of images.
///
/// `resolve` blocks until the batch is complete or cancelled. It is never
/// called with an empty batch.
pub trait AltTextResolver {
    /// Source recorded for texts this resolver supplies.
    fn source(&self) -> AltSource;

    fn resolve(&mut self, batch: &[ResolutionRequest]) -> Resolution;
}

impl<R: AltTextResolver + ?Sized> AltTextResolver for &mut R {
    fn source(&self) -> AltSource {
        (**self).source()
    }

    fn resolve(&mut self, batch: &[ResolutionRequest]) -> Resolution {
        (**self).resolve(batch)
    }
}

/// Operator-entered texts keyed by image reference (`<document>#<ordinal>`)
/// or by image path. A reference key wins over a path key.
#[derive(Debug, Clone, Default)]
pub struct MappingResolver {
    texts: HashMap<String, String>,
}

impl MappingResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(texts: HashMap<String, String>) -> Self {
        Self { texts }
    }

    pub fn insert(&mut self, key: impl Into<String>, text: impl Into<String>) {
        self.texts.insert(key.into(), text.into());
    }

    pub fn with(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(key, text);
        self
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    fn lookup(&self, image: &ImageRef) -> Option<&String> {
        self.texts
            .get(&image.key())
            .or_else(|| self.texts.get(&image.image))
    }
}

impl AltTextResolver for MappingResolver {
    fn source(&self) -> AltSource {
        AltSource::Operator
    }

    fn resolve(&mut self, batch: &[ResolutionRequest]) -> Resolution {
        let mut resolved = ResolvedBatch::new();
        for request in batch {
            if let Some(text) = self.lookup(&request.image) {
                resolved.insert(request.image.clone(), text.clone());
            }
        }
        Resolution::Resolved(resolved)
    }
}

// ---- AI provider ----

/// Longest alt text accepted from a description service, in characters.
pub const MAX_GENERATED_CHARS: usize = 400;

/// A service that describes an image in words.
///
/// Implementations own their transport and must enforce their own timeout,
/// reporting it as [`ProviderError::Timeout`].
pub trait ImageDescriber {
    fn describe(
        &mut self,
        image: &ImageResource,
        request: &ResolutionRequest,
    ) -> Result<String, ProviderError>;
}

/// Resolver asking an [`ImageDescriber`] for each image of the batch.
///
/// Texts are trimmed and capped at [`MAX_GENERATED_CHARS`]. A failing
/// request is recorded and left empty; the rest of the batch continues.
pub struct AiResolver<'a, D> {
    describer: D,
    images: &'a ImageStore,
    max_chars: usize,
}

impl<'a, D: ImageDescriber> AiResolver<'a, D> {
    pub fn new(describer: D, images: &'a ImageStore) -> Self {
        Self {
            describer,
            images,
            max_chars: MAX_GENERATED_CHARS,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(4);
        self
    }
}

impl<D: ImageDescriber> AltTextResolver for AiResolver<'_, D> {
    fn source(&self) -> AltSource {
        AltSource::AiProvider
    }

    fn resolve(&mut self, batch: &[ResolutionRequest]) -> Resolution {
        let mut resolved = ResolvedBatch::new();
        for request in batch {
            let Some(image) = self.images.get(&request.image.image) else {
                resolved.failures.push((
                    request.image.clone(),
                    ProviderError::Unavailable(format!(
                        "{} is not an image of this publication",
                        request.image.image
                    )),
                ));
                continue;
            };

            match self.describer.describe(image, request) {
                Ok(text) => {
                    let text = cap_text(text.trim(), self.max_chars);
                    tracing::debug!(image = %request.image.key(), "generated alt text");
                    resolved.insert(request.image.clone(), text);
                }
                Err(e) => {
                    tracing::warn!(image = %request.image.key(), "description failed: {e}");
                    resolved.failures.push((request.image.clone(), e));
                }
            }
        }
        Resolution::Resolved(resolved)
    }
}

/// Shorten `text` to at most `max_chars` characters, ending in `...` when cut.
pub fn cap_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut capped: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    capped.push_str("...");
    capped
}
