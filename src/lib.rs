//! # epub-a11y
//!
//! Accessibility metadata inference and injection for EPUB publications.
//!
//! ## Features
//!
//! - ARIA `role`s inferred from `epub:type` structural semantics (DPUB-ARIA)
//! - Package and content-document language attributes
//! - Alt text from embedded image metadata (XMP, EXIF, SVG `<desc>`), with
//!   operator or AI-provided text as fallback
//! - `schema:` accessibility metadata matching the features actually used
//! - Document titles and landmarks filled in from the navigation
//!
//! ## Quick Start
//!
//! ```no_run
//! use epub_a11y::{Engine, EngineConfig, MappingResolver, read_epub, write_epub};
//!
//! let mut publication = read_epub("input.epub").unwrap();
//! let mut operator = MappingResolver::new();
//! let report = Engine::new(EngineConfig::default()).run(&mut publication, &mut operator);
//! println!("{report}");
//! write_epub(&publication, "output.epub").unwrap();
//! ```
//!
//! ## Working without an archive
//!
//! A [`Publication`] can be assembled from markup directly:
//!
//! ```
//! use epub_a11y::{Engine, MappingResolver, Publication};
//!
//! let opf = r#"<package version="3.0"><metadata><dc:language>en</dc:language></metadata><manifest/></package>"#;
//! let mut publication = Publication::from_package("content.opf", opf).unwrap();
//! publication.add_document(
//!     "ch1.xhtml",
//!     r#"<html><head><title>One</title></head><body><section epub:type="chapter"/></body></html>"#,
//! );
//!
//! let report = Engine::default().run(&mut publication, &mut MappingResolver::new());
//! assert_eq!(report.roles_added, 1);
//! ```

pub mod alt;
pub mod dom;
pub mod engine;
pub mod epub;
pub mod error;
pub mod opf;
pub mod report;
pub(crate) mod util;

pub use alt::{
    AiResolver, AltSource, AltState, AltTextResolver, ImageDescriber, ImageRef, MappingResolver,
    Resolution, ResolutionRequest,
};
pub use engine::{Engine, EngineConfig};
pub use epub::{EpubVersion, Publication, read_epub, write_epub};
pub use error::{Error, ProviderError, Result};
pub use report::{Issue, IssueKind, Report};
