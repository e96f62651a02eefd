use thiserror::Error;

/// Errors that can occur while resolving a VAST ad document or
/// selecting a media rendition from one
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Malformed ad document: {0}")]
    MalformedDocument(String),

    #[error("Wrapper follow budget exhausted")]
    WrapperBudgetExceeded,

    #[error("Remote fetch failed: {0}")]
    RemoteFetch(String),

    #[error("No candidate media files to choose from")]
    NoCandidates,

    #[error("Resolution cancelled")]
    Cancelled,

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<quick_xml::Error> for ResolveError {
    fn from(err: quick_xml::Error) -> Self {
        ResolveError::MalformedDocument(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;
