//! Error types for epub-a11y operations.

use thiserror::Error;

/// Errors that can occur while loading, patching or saving a publication.
///
/// Problems inside a single publication (bad markup, missing image metadata,
/// a cancelled review) are not errors: they are collected as
/// [`Issue`](crate::report::Issue)s on the pass [`Report`](crate::report::Report).
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("Missing required element: {0}")]
    MissingElement(String),

    #[error("Invalid patch: {0}")]
    InvalidPatch(String),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of an alt-text source outside the engine: an image metadata
/// extractor or an AI description service.
///
/// These never abort a pass; the affected image is treated as having no
/// metadata and a `ProviderFailure` issue is reported.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("provider failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
