use crate::bandwidth;
use crate::chooser;
use crate::error::{ResolveError, Result};
use crate::extract;
use crate::model::{AdDocument, MediaFile, ResolutionState, SelectionCriteria};
use crate::parser;
use crate::remote::{RemoteLoader, DEFAULT_TIMEOUT_MS};
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Default number of wrapper hops allowed in one resolution session
pub const DEFAULT_FOLLOW_BUDGET: u32 = 5;

type ResolvedObserver = Box<dyn Fn(&AdDocument) + Send + Sync>;

/// Cloneable handle for cancelling a resolution in progress.
///
/// Cancellation takes effect at the session's next suspension point: before
/// the next fetch begins, or before the final document is returned. An
/// in-flight fetch is not aborted, but its result is discarded.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One ad resolution session: parses documents, runs the element
/// extractors, and follows wrapper references through the injected loader
/// until an inline ad or a terminal failure is reached.
///
/// A session resolves or fails exactly once; both entry points consume it.
/// Concurrent sessions are fully independent, each owning its own
/// [`AdDocument`] and [`ResolutionState`].
pub struct ResolutionSession {
    loader: Arc<dyn RemoteLoader>,
    timeout_ms: u64,
    document: AdDocument,
    state: ResolutionState,
    cancel: CancelHandle,
    observers: Vec<ResolvedObserver>,
}

impl ResolutionSession {
    pub fn new(loader: Arc<dyn RemoteLoader>) -> Self {
        ResolutionSession {
            loader,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            document: AdDocument::default(),
            state: ResolutionState::new(DEFAULT_FOLLOW_BUDGET),
            cancel: CancelHandle::default(),
            observers: Vec::new(),
        }
    }

    /// Maximum number of wrapper hops before the chain is treated as broken
    pub fn with_follow_budget(mut self, follow_budget: u32) -> Self {
        self.state = ResolutionState::new(follow_budget);
        self
    }

    /// Timeout applied to each individual fetch, not to the whole chain
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Register an observer notified once with the final document when
    /// resolution completes
    pub fn on_resolved(&mut self, observer: impl Fn(&AdDocument) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Kilobits per second measured on the most recent fetch; 0 before any
    /// remote fetch has completed
    pub fn bandwidth_estimate_kbs(&self) -> f64 {
        self.state.bandwidth_estimate_kbs
    }

    /// Resolve starting from XML text already in hand
    pub async fn resolve(self, xml: &str) -> std::result::Result<ResolvedAd, ResolutionFailure> {
        self.run(xml.to_string()).await
    }

    /// Resolve starting from a remote document URL
    pub async fn resolve_from_url(
        mut self,
        url: &str,
    ) -> std::result::Result<ResolvedAd, ResolutionFailure> {
        match self.fetch(url).await {
            Ok(xml) => self.run(xml).await,
            Err(error) => Err(self.fail(error)),
        }
    }

    async fn run(mut self, mut xml: String) -> std::result::Result<ResolvedAd, ResolutionFailure> {
        loop {
            let parsed = match parser::parse_document(&xml) {
                Ok(parsed) => parsed,
                Err(error) => return Err(self.fail(error)),
            };
            debug!(
                "parsed VAST {} document with {} ad(s)",
                parsed.version,
                parsed.ads.len()
            );

            for fragment in extract::extract_all(&parsed) {
                self.document.merge(fragment);
            }

            let Some(next_url) = self.document.take_wrapper_url() else {
                break;
            };

            if self.state.remaining_follows == 0 {
                // Budget exhaustion is itself a trackable ad-serving
                // failure, so the error pixels still fire
                self.dispatch_error_impressions().await;
                return Err(self.fail(ResolveError::WrapperBudgetExceeded));
            }
            self.state.remaining_follows -= 1;

            if self.cancel.is_cancelled() {
                return Err(self.fail(ResolveError::Cancelled));
            }

            debug!(
                "following wrapper to {next_url} ({} follow(s) left)",
                self.state.remaining_follows
            );
            xml = match self.fetch(&next_url).await {
                Ok(body) => body,
                Err(error) => return Err(self.fail(error)),
            };
        }

        if self.cancel.is_cancelled() {
            return Err(self.fail(ResolveError::Cancelled));
        }

        for observer in &self.observers {
            observer(&self.document);
        }

        Ok(ResolvedAd {
            document: self.document,
            bandwidth_estimate_kbs: self.state.bandwidth_estimate_kbs,
        })
    }

    /// Fetch one document and fold its size and timing into the bandwidth
    /// estimate
    async fn fetch(&mut self, url: &str) -> Result<String> {
        let fetched = self.loader.load(url, self.timeout_ms).await?;

        // A fetch that lands after cancellation is discarded
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        self.state.bandwidth_estimate_kbs = bandwidth::estimate_kbs(
            fetched.byte_length,
            fetched.elapsed_ms,
            self.state.bandwidth_estimate_kbs,
        );
        self.document.set_source_url(url);

        Ok(fetched.body)
    }

    /// Fire the accumulated error-impression pixels. Dispatch failures are
    /// logged, never propagated.
    async fn dispatch_error_impressions(&self) {
        for url in self.document.error_impression_urls() {
            if let Err(error) = self.loader.load(url, self.timeout_ms).await {
                warn!("error impression dispatch failed for {url}: {error}");
            }
        }
    }

    fn fail(self, error: ResolveError) -> ResolutionFailure {
        ResolutionFailure {
            error,
            partial: self.document,
            bandwidth_estimate_kbs: self.state.bandwidth_estimate_kbs,
        }
    }
}

/// A completed resolution: the immutable ad model plus the session's final
/// bandwidth estimate
#[derive(Debug, Clone)]
pub struct ResolvedAd {
    document: AdDocument,
    bandwidth_estimate_kbs: f64,
}

impl ResolvedAd {
    pub fn document(&self) -> &AdDocument {
        &self.document
    }

    pub fn into_document(self) -> AdDocument {
        self.document
    }

    pub fn bandwidth_estimate_kbs(&self) -> f64 {
        self.bandwidth_estimate_kbs
    }

    /// Choose the best rendition for a playback context, using the
    /// session's measured bandwidth as the ceiling when the criteria carry
    /// no explicit one
    pub fn best_media_file(&self, criteria: &SelectionCriteria) -> Result<&MediaFile> {
        let mut criteria = criteria.clone();
        if criteria.bandwidth_ceiling_kbs.is_none() && self.bandwidth_estimate_kbs > 0.0 {
            criteria.bandwidth_ceiling_kbs = Some(self.bandwidth_estimate_kbs);
        }

        chooser::choose_best(self.document.media_files(), &criteria)
    }
}

/// A failed resolution.
///
/// Terminal: the accumulated partial model is available for diagnostics
/// only and is never presented as a successful resolution.
#[derive(Debug)]
pub struct ResolutionFailure {
    error: ResolveError,
    partial: AdDocument,
    bandwidth_estimate_kbs: f64,
}

impl ResolutionFailure {
    pub(crate) fn bare(error: ResolveError) -> Self {
        ResolutionFailure {
            error,
            partial: AdDocument::default(),
            bandwidth_estimate_kbs: 0.0,
        }
    }

    pub fn error(&self) -> &ResolveError {
        &self.error
    }

    pub fn into_error(self) -> ResolveError {
        self.error
    }

    /// Whatever was accumulated before the failure, for diagnostics
    pub fn partial_document(&self) -> &AdDocument {
        &self.partial
    }

    pub fn bandwidth_estimate_kbs(&self) -> f64 {
        self.bandwidth_estimate_kbs
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ResolutionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
