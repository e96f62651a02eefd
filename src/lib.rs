pub mod bandwidth;
pub mod chooser;
pub mod error;
pub mod extract;
pub mod model;
pub mod parser;
pub mod remote;
pub mod resolver;

pub use chooser::choose_best;
pub use error::{ResolveError, Result};
pub use model::{AdDocument, MediaFile, SelectionCriteria};
pub use remote::{FetchedDocument, HttpLoader, RemoteLoader, DEFAULT_TIMEOUT_MS};
pub use resolver::{
    CancelHandle, ResolutionFailure, ResolutionSession, ResolvedAd, DEFAULT_FOLLOW_BUDGET,
};

use std::sync::Arc;

/// Resolve an ad document from XML text using the default HTTP loader
pub async fn resolve(xml: &str) -> std::result::Result<ResolvedAd, ResolutionFailure> {
    let loader = HttpLoader::new().map_err(ResolutionFailure::bare)?;
    ResolutionSession::new(Arc::new(loader)).resolve(xml).await
}

/// Resolve an ad document starting from a remote URL
pub async fn resolve_from_url(
    url: &str,
    timeout_ms: u64,
    follow_budget: u32,
) -> std::result::Result<ResolvedAd, ResolutionFailure> {
    let loader = HttpLoader::new().map_err(ResolutionFailure::bare)?;
    ResolutionSession::new(Arc::new(loader))
        .with_timeout_ms(timeout_ms)
        .with_follow_budget(follow_budget)
        .resolve_from_url(url)
        .await
}
