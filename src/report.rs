//! What a pass did, and what it could not do.

use std::fmt;

use crate::alt::{AltSource, AltState, ImageRef};
use crate::epub::EpubVersion;
use crate::opf::schema::AccessibilityFeatureFlags;

/// Category of a per-publication problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IssueKind {
    /// Element structure that had to be repaired or skipped.
    MalformedMarkup,
    /// No embedded description for an image; it was queued for resolution.
    MissingMetadataSource,
    /// External resolution was cancelled and its batch rolled back.
    ResolutionCancelled,
    /// A metadata or AI provider failed for one image.
    ProviderFailure,
    /// The package declares no primary language.
    MissingLanguage,
    /// A computed change could not be committed.
    InvalidPatch,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::MalformedMarkup => "malformed markup",
            IssueKind::MissingMetadataSource => "missing metadata source",
            IssueKind::ResolutionCancelled => "resolution cancelled",
            IssueKind::ProviderFailure => "provider failure",
            IssueKind::MissingLanguage => "missing language",
            IssueKind::InvalidPatch => "invalid patch",
        })
    }
}

/// A problem tied to a place in the publication.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Issue {
    pub kind: IssueKind,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub document: Option<String>,
    /// Element path inside the document.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub path: Option<String>,
    /// Image reference key (`<document>#<ordinal>`).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub image: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            document: None,
            path: None,
            image: None,
            message: message.into(),
        }
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_image(mut self, image: &ImageRef) -> Self {
        self.document = Some(image.document.clone());
        self.image = Some(image.key());
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(image) = &self.image {
            write!(f, " [{image}]")?;
        } else if let Some(document) = &self.document {
            write!(f, " [{document}]")?;
        }
        if let Some(path) = &self.path {
            write!(f, " {path}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Final decision for one image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AltTextOutcome {
    pub image: ImageRef,
    pub state: AltState,
    /// Text written (or kept) as the alt attribute.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub text: Option<String>,
}

impl AltTextOutcome {
    pub fn source(&self) -> Option<AltSource> {
        match self.state {
            AltState::Resolved(source) => Some(source),
            _ => None,
        }
    }
}

/// Summary of one pass over a publication.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Report {
    /// Version whose rules were applied.
    pub version: EpubVersion,
    pub documents: usize,
    pub roles_added: usize,
    /// `xml:lang` written on the package element, if any.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub package_language: Option<String>,
    /// Content documents whose `<html>` root got a language.
    pub content_languages_set: usize,
    pub titles_set: usize,
    pub landmarks_added: usize,
    pub features: AccessibilityFeatureFlags,
    /// Metadata entries added, as `property=value`.
    pub metadata_added: Vec<String>,
    pub alt_text: Vec<AltTextOutcome>,
    pub issues: Vec<Issue>,
}

impl Report {
    pub fn new(version: EpubVersion) -> Self {
        Self {
            version,
            documents: 0,
            roles_added: 0,
            package_language: None,
            content_languages_set: 0,
            titles_set: 0,
            landmarks_added: 0,
            features: AccessibilityFeatureFlags::default(),
            metadata_added: Vec::new(),
            alt_text: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn push_issue(&mut self, issue: Issue) {
        match issue.kind {
            IssueKind::MissingMetadataSource => tracing::debug!("{issue}"),
            _ => tracing::warn!("{issue}"),
        }
        self.issues.push(issue);
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }

    /// Whether the pass was cut short by a cancelled resolution.
    pub fn cancelled(&self) -> bool {
        self.issues_of(IssueKind::ResolutionCancelled).next().is_some()
    }

    /// Outcome for an image reference.
    pub fn alt_outcome(&self, image: &ImageRef) -> Option<&AltTextOutcome> {
        self.alt_text.iter().find(|o| &o.image == image)
    }

    /// Number of alt attributes written in this pass.
    pub fn alt_written(&self) -> usize {
        self.alt_text
            .iter()
            .filter(|o| matches!(o.state, AltState::Resolved(_) | AltState::LeftEmpty))
            .count()
    }

    /// Whether the pass changed anything.
    pub fn is_noop(&self) -> bool {
        self.roles_added == 0
            && self.package_language.is_none()
            && self.content_languages_set == 0
            && self.titles_set == 0
            && self.landmarks_added == 0
            && self.metadata_added.is_empty()
            && self.alt_written() == 0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "EPUB {} rules, {} documents", self.version, self.documents)?;
        writeln!(f, "  roles added:        {}", self.roles_added)?;
        match &self.package_language {
            Some(lang) => writeln!(f, "  package xml:lang:   {lang}")?,
            None => writeln!(f, "  package xml:lang:   unchanged")?,
        }
        writeln!(f, "  html languages set: {}", self.content_languages_set)?;
        writeln!(f, "  titles set:         {}", self.titles_set)?;
        writeln!(f, "  landmarks added:    {}", self.landmarks_added)?;
        writeln!(f, "  metadata added:     {}", self.metadata_added.len())?;
        for entry in &self.metadata_added {
            writeln!(f, "    {entry}")?;
        }
        writeln!(
            f,
            "  images:             {} ({} alt written)",
            self.alt_text.len(),
            self.alt_written()
        )?;
        for issue in &self.issues {
            writeln!(f, "  {issue}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let image = ImageRef::new("OEBPS/Images/a.png", "OEBPS/Text/ch1.xhtml", 2);
        let issue = Issue::new(IssueKind::ProviderFailure, "timed out").with_image(&image);
        assert_eq!(
            issue.to_string(),
            "provider failure [OEBPS/Text/ch1.xhtml#2]: timed out"
        );

        let issue = Issue::new(IssueKind::MalformedMarkup, "stray end tag")
            .with_document("ch2.xhtml")
            .with_path("/html/body/p");
        assert_eq!(
            issue.to_string(),
            "malformed markup [ch2.xhtml] /html/body/p: stray end tag"
        );
    }

    #[test]
    fn test_noop_report() {
        let mut report = Report::new(EpubVersion::Epub30);
        assert!(report.is_noop());
        report.roles_added = 1;
        assert!(!report.is_noop());
    }
}
