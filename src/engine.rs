//! One accessibility pass over a publication.
//!
//! Every change is computed against the documents as loaded, alt text is
//! resolved, and only then are the patches committed. A cancelled
//! resolution therefore never leaves half-written alt attributes behind.

use crate::alt::{
    AltTextPlan, AltTextResolver, EmbeddedMetadata, MetadataExtractor, MetadataLookup,
    ResolutionRequest,
};
use crate::dom::{PatchSet, RoleTable, element_role, element_role_for_type, title_patch};
use crate::epub::nav::{Navigation, landmark_patches};
use crate::epub::{EpubVersion, Publication};
use crate::opf::PackageMetadata;
use crate::opf::language::{
    PackageLanguage, content_language_patches, package_language_patches, resolve_package_language,
};
use crate::opf::schema::{AccessibilityFeatureFlags, metadata_patches};
use crate::report::{Issue, IssueKind, Report};

/// Which parts of a pass run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rules to apply instead of the package's declared version. EPUB 3.3
    /// packages still declare `version="3.0"`.
    pub target_version: Option<EpubVersion>,
    /// Set `lang`/`xml:lang` on content documents lacking them.
    pub content_language: bool,
    /// Fill blank or missing `<title>`s from the navigation.
    pub titles: bool,
    /// Add nav landmark types to their target elements (EPUB 3 only).
    pub landmarks: bool,
    /// Add accessibility-schema metadata to the package.
    pub accessibility_metadata: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_version: None,
            content_language: true,
            titles: true,
            landmarks: true,
            accessibility_metadata: true,
        }
    }
}

impl EngineConfig {
    pub fn with_target_version(mut self, version: EpubVersion) -> Self {
        self.target_version = Some(version);
        self
    }

    pub fn with_content_language(mut self, enabled: bool) -> Self {
        self.content_language = enabled;
        self
    }

    pub fn with_titles(mut self, enabled: bool) -> Self {
        self.titles = enabled;
        self
    }

    pub fn with_landmarks(mut self, enabled: bool) -> Self {
        self.landmarks = enabled;
        self
    }

    pub fn with_accessibility_metadata(mut self, enabled: bool) -> Self {
        self.accessibility_metadata = enabled;
        self
    }
}

/// The accessibility engine.
///
/// # Example
///
/// ```no_run
/// use epub_a11y::{Engine, EngineConfig, MappingResolver, read_epub, write_epub};
///
/// let mut publication = read_epub("book.epub")?;
/// let mut operator = MappingResolver::new().with("OEBPS/Images/map.png", "Map of the old town");
/// let report = Engine::new(EngineConfig::default()).run(&mut publication, &mut operator);
/// print!("{report}");
/// write_epub(&publication, "book.a11y.epub")?;
/// # Ok::<(), epub_a11y::Error>(())
/// ```
pub struct Engine {
    config: EngineConfig,
    extractor: Box<dyn MetadataExtractor>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            extractor: Box::new(EmbeddedMetadata),
        }
    }

    /// Replace the embedded-metadata reader.
    pub fn with_extractor(mut self, extractor: impl MetadataExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Version whose rules apply to `publication`.
    pub fn version_for(&self, publication: &Publication) -> EpubVersion {
        self.config.target_version.unwrap_or(publication.version)
    }

    /// Images a pass would hand to the resolver, without changing anything.
    pub fn pending_alt_text(&self, publication: &Publication) -> Vec<ResolutionRequest> {
        self.alt_text_plan(publication).requests()
    }

    fn alt_text_plan(&self, publication: &Publication) -> AltTextPlan {
        let language = PackageMetadata::new(&publication.package)
            .ok()
            .and_then(|meta| meta.primary_language());
        let lookup = MetadataLookup::new(&publication.images, self.extractor.as_ref())
            .with_language(language.as_deref());
        AltTextPlan::build(&publication.documents, &lookup)
    }

    /// Run a full pass, asking `resolver` for the alt text that embedded
    /// metadata cannot supply.
    pub fn run<R: AltTextResolver + ?Sized>(
        &self,
        publication: &mut Publication,
        resolver: &mut R,
    ) -> Report {
        let version = self.version_for(publication);
        let mut report = Report::new(version);
        report.documents = publication.documents.len();
        report.issues.extend(publication.load_issues.iter().cloned());

        for doc in &publication.documents {
            for fault in &doc.faults {
                report.push_issue(
                    Issue::new(IssueKind::MalformedMarkup, fault.message.as_str())
                        .with_document(doc.id.as_str())
                        .with_path(fault.path.as_str()),
                );
            }
        }

        // 1. Package language and metadata
        let mut package_patches = PatchSet::new();
        let mut language = None;
        match PackageMetadata::new(&publication.package) {
            Ok(meta) => {
                // The OPF 2 `package` element has no `xml:lang`.
                let decision = if version.is_epub3() {
                    package_language_patches(&meta, &mut package_patches)
                } else {
                    resolve_package_language(&meta)
                };
                match decision {
                    PackageLanguage::Inject(lang) if version.is_epub3() => {
                        report.package_language = Some(lang)
                    }
                    PackageLanguage::Inject(_) | PackageLanguage::Existing(_) => {}
                    PackageLanguage::Unknown => report.push_issue(
                        Issue::new(IssueKind::MissingLanguage, "package declares no dc:language")
                            .with_document(publication.package_path.as_str()),
                    ),
                }
                language = meta.primary_language();

                report.features = AccessibilityFeatureFlags::detect(publication);
                if self.config.accessibility_metadata {
                    report.metadata_added =
                        metadata_patches(&meta, version, &report.features, &mut package_patches)
                            .iter()
                            .map(|e| format!("{}={}", e.property, e.value))
                            .collect();
                }
            }
            Err(e) => report.push_issue(
                Issue::new(IssueKind::MalformedMarkup, e.to_string())
                    .with_document(publication.package_path.as_str()),
            ),
        }

        // 2. Content documents
        let table = RoleTable::for_version(version);
        let navigation = if self.config.titles || self.config.landmarks {
            Navigation::from_publication(publication)
        } else {
            Navigation::default()
        };

        let mut document_patches: Vec<PatchSet> = Vec::with_capacity(publication.documents.len());
        for doc in &publication.documents {
            let dom = &doc.dom;
            let mut patches = PatchSet::new();

            // Landmarks first: the types they add take part in role mapping.
            if self.config.landmarks && version.is_epub3() {
                report.landmarks_added +=
                    landmark_patches(dom, navigation.landmarks_in(&doc.id), &mut patches);
            }

            if let Some(table) = table {
                for id in dom.descendants(dom.root()) {
                    let role = match patches.pending_attribute(id, "epub:type") {
                        Some(epub_type) => element_role_for_type(dom, id, table, epub_type),
                        None => element_role(dom, id, table),
                    };
                    if let Some(role) = role {
                        tracing::debug!(document = %doc.id, role = %role, "adding role");
                        patches.set_attribute(id, "role", &role);
                        report.roles_added += 1;
                    }
                }
            }

            if self.config.content_language
                && let Some(lang) = &language
                && content_language_patches(dom, lang, &mut patches)
            {
                report.content_languages_set += 1;
            }

            if self.config.titles
                && let Some(title) = navigation.title(&doc.id)
                && let Some(patch) = title_patch(dom, title)
            {
                tracing::debug!(document = %doc.id, title, "setting title");
                patches.push(patch);
                report.titles_set += 1;
            }

            document_patches.push(patches);
        }

        // 3. Alt text; the only step that waits on the caller
        let mut plan = self.alt_text_plan(publication);
        plan.resolve(resolver);
        for (doc, patches) in publication.documents.iter().zip(document_patches.iter_mut()) {
            for patch in plan.patches_for(&doc.id) {
                patches.push(patch);
            }
        }
        report.alt_text = plan.outcomes();
        for issue in std::mem::take(&mut plan.issues) {
            report.push_issue(issue);
        }

        // 4. Commit
        for (doc, patches) in publication.documents.iter_mut().zip(document_patches) {
            if patches.is_empty() {
                continue;
            }
            for error in patches.apply(&mut doc.dom) {
                report.push_issue(
                    Issue::new(IssueKind::InvalidPatch, error.to_string()).with_document(doc.id.as_str()),
                );
            }
            doc.modified = true;
        }
        if !package_patches.is_empty() {
            for error in package_patches.apply(&mut publication.package) {
                report.push_issue(
                    Issue::new(IssueKind::InvalidPatch, error.to_string())
                        .with_document(publication.package_path.as_str()),
                );
            }
            publication.package_modified = true;
        }

        tracing::info!(
            version = %version,
            documents = report.documents,
            roles = report.roles_added,
            titles = report.titles_set,
            landmarks = report.landmarks_added,
            metadata = report.metadata_added.len(),
            alt_written = report.alt_written(),
            issues = report.issues.len(),
            "accessibility pass complete"
        );
        report
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alt::{AltSource, AltState, MappingResolver};
    use crate::dom::serialize;

    const OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:language>fr-CA</dc:language>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="c1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;

    const NAV: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title>Nav</title></head><body>
<nav epub:type="toc"><ol><li><a href="ch1.xhtml">Chapitre un</a></li></ol></nav>
<nav epub:type="landmarks"><ol><li><a epub:type="bodymatter" href="ch1.xhtml#c1">Début</a></li></ol></nav>
</body></html>"#;

    const CHAPTER: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title/></head><body epub:type="bodymatter">
<section id="c1" epub:type="chapter"><p>Texte <img src="fig.png"/></p></section>
</body></html>"#;

    fn publication() -> Publication {
        let mut publication = Publication::from_package("OEBPS/content.opf", OPF).unwrap();
        assert!(publication.add_document("OEBPS/nav.xhtml", NAV));
        assert!(publication.add_document("OEBPS/ch1.xhtml", CHAPTER));
        publication
    }

    #[test]
    fn test_full_pass() {
        let mut publication = publication();
        let mut operator = MappingResolver::new().with("OEBPS/fig.png", "Une figure");
        let report = Engine::default().run(&mut publication, &mut operator);

        assert_eq!(report.roles_added, 2);
        assert_eq!(report.package_language.as_deref(), Some("fr-CA"));
        assert_eq!(report.content_languages_set, 2);
        assert_eq!(report.titles_set, 1);
        assert_eq!(report.landmarks_added, 1);
        assert_eq!(
            report.alt_text[0].state,
            AltState::Resolved(AltSource::Operator)
        );

        let chapter = serialize(&publication.document("OEBPS/ch1.xhtml").unwrap().dom);
        assert!(chapter.contains("<title>Chapitre un</title>"));
        assert!(chapter.contains(r#"<body epub:type="bodymatter">"#));
        assert!(chapter.contains(
            r#"<section id="c1" epub:type="chapter bodymatter" role="doc-chapter">"#
        ));
        assert!(chapter.contains(r#"<img src="fig.png" alt="Une figure"/>"#));
        assert!(chapter.contains(r#"lang="fr-CA" xml:lang="fr-CA""#));

        let package = serialize(&publication.package);
        assert!(package.contains(r#"version="3.0" unique-identifier="id" xml:lang="fr-CA""#));
        assert!(package.contains("schema:accessibilityHazard"));
        assert!(publication.package_modified);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let mut publication = publication();
        let mut operator = MappingResolver::new().with("OEBPS/fig.png", "Une figure");
        Engine::default().run(&mut publication, &mut operator);

        let report = Engine::default().run(&mut publication, &mut operator);
        assert!(report.is_noop(), "{report}");
    }

    #[test]
    fn test_landmark_types_get_roles_in_same_pass() {
        const NAV: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title>Nav</title></head><body>
<nav epub:type="landmarks"><ol><li><a epub:type="glossary" href="ch1.xhtml#g">Glossaire</a></li></ol></nav>
</body></html>"#;
        const CHAPTER: &str = r#"<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops"><head><title>Un</title></head><body>
<section id="g"><p>Terme</p></section>
</body></html>"#;

        let mut publication = Publication::from_package("OEBPS/content.opf", OPF).unwrap();
        assert!(publication.add_document("OEBPS/nav.xhtml", NAV));
        assert!(publication.add_document("OEBPS/ch1.xhtml", CHAPTER));

        let report = Engine::default().run(&mut publication, &mut MappingResolver::new());
        assert_eq!(report.landmarks_added, 1);
        let chapter = serialize(&publication.document("OEBPS/ch1.xhtml").unwrap().dom);
        assert!(chapter.contains(r#"<section id="g" epub:type="glossary" role="doc-glossary">"#));

        let report = Engine::default().run(&mut publication, &mut MappingResolver::new());
        assert_eq!(report.roles_added, 0);
        assert!(report.is_noop(), "{report}");
    }

    #[test]
    fn test_epub2_package_keeps_its_attributes() {
        const OPF2: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:language>en-GB</dc:language>
  </metadata>
  <manifest>
    <item id="c1" href="ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;

        let mut publication = Publication::from_package("OEBPS/content.opf", OPF2).unwrap();
        assert!(publication.add_document("OEBPS/ch1.xhtml", CHAPTER));
        let report = Engine::default().run(&mut publication, &mut MappingResolver::new());

        assert_eq!(report.package_language, None);
        assert!(report.issues.iter().all(|i| i.kind != IssueKind::MissingLanguage));
        let package = serialize(&publication.package);
        assert!(package.contains(r#"<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="id">"#));
        assert!(!package.contains("xml:lang"));

        // Content documents still get their language.
        let chapter = serialize(&publication.document("OEBPS/ch1.xhtml").unwrap().dom);
        assert!(chapter.contains(r#"lang="en-GB" xml:lang="en-GB""#));
    }

    #[test]
    fn test_disabled_steps() {
        let mut publication = publication();
        let config = EngineConfig::default()
            .with_titles(false)
            .with_landmarks(false)
            .with_content_language(false)
            .with_accessibility_metadata(false);
        let report = Engine::new(config).run(&mut publication, &mut MappingResolver::new());

        assert_eq!(report.titles_set, 0);
        assert_eq!(report.landmarks_added, 0);
        assert_eq!(report.content_languages_set, 0);
        assert!(report.metadata_added.is_empty());
        assert_eq!(report.alt_text[0].state, AltState::LeftEmpty);
    }

    #[test]
    fn test_epub2_target_skips_roles() {
        let mut publication = publication();
        let engine = Engine::new(EngineConfig::default().with_target_version(EpubVersion::Epub2));
        let report = engine.run(&mut publication, &mut MappingResolver::new());
        assert_eq!(report.roles_added, 0);
        assert_eq!(report.landmarks_added, 0);
        let package = serialize(&publication.package);
        assert!(package.contains(r#"<meta name="schema:accessMode" content="textual"/>"#));
        assert!(!package.contains("xml:lang"));
    }

    #[test]
    fn test_pending_alt_text_does_not_mutate() {
        let publication = publication();
        let pending = Engine::default().pending_alt_text(&publication);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].image.key(), "OEBPS/ch1.xhtml#1");
        assert!(!publication.is_modified());
    }
}
