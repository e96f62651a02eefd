use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Represents one encoded rendition of the ad creative
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct MediaFile {
    /// The media file URL
    pub url: String,

    /// The media file MIME type
    pub mime_type: String,

    /// The rendition width in pixels (0 when the document omits it)
    pub width: u32,

    /// The rendition height in pixels (0 when the document omits it)
    pub height: u32,

    /// The declared bitrate in kilobits per second
    pub bitrate_kbs: Option<u32>,

    /// Whether the rendition is a VPAID creative rather than plain media
    pub is_vpaid: bool,
}

/// Constraints describing the playback context a rendition is chosen for
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SelectionCriteria {
    /// The player viewport width in pixels
    pub viewport_width: u32,

    /// The player viewport height in pixels
    pub viewport_height: u32,

    /// Soft bitrate ceiling in kbps; when absent the session's bandwidth
    /// estimate is used instead
    pub bandwidth_ceiling_kbs: Option<f64>,

    /// Acceptable MIME types; when absent every MIME type is accepted
    pub supported_mime_types: Option<Vec<String>>,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        SelectionCriteria {
            viewport_width: 800,
            viewport_height: 600,
            bandwidth_ceiling_kbs: None,
            supported_mime_types: None,
        }
    }
}

/// Per-session bookkeeping, mutated only by the resolver
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionState {
    pub(crate) remaining_follows: u32,
    pub(crate) bandwidth_estimate_kbs: f64,
}

impl ResolutionState {
    pub(crate) fn new(follow_budget: u32) -> Self {
        ResolutionState {
            remaining_follows: follow_budget,
            bandwidth_estimate_kbs: 0.0,
        }
    }

    /// Wrapper hops still allowed in this session
    pub fn remaining_follows(&self) -> u32 {
        self.remaining_follows
    }

    /// Kilobits per second measured on the most recent fetch, 0 before any
    pub fn bandwidth_estimate_kbs(&self) -> f64 {
        self.bandwidth_estimate_kbs
    }
}

/// A typed fragment reported by one element extractor for one document.
///
/// Extractors only report what is present on the current document; the
/// replace/append merge policy lives in [`AdDocument::merge`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    MediaFiles(Vec<MediaFile>),
    VpaidUrl(String),
    AdParameters(String),
    Clickthrough(String),
    Impressions(Vec<String>),
    ErrorImpressions(Vec<String>),
    TrackingEvents(Vec<(String, String)>),
    WrapperUrl(String),
}

/// The cumulative resolved model for one resolution session.
///
/// Owned by the resolver while the session runs; callers only ever see it
/// through read-only accessors once resolution completes (or through the
/// diagnostic partial-state accessor on a failure).
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Clone)]
pub struct AdDocument {
    media_files: Vec<MediaFile>,
    ad_parameters: Option<String>,
    clickthrough_url: Option<String>,
    impression_urls: Vec<String>,
    error_impression_urls: Vec<String>,
    tracking_events: HashMap<String, Vec<String>>,
    wrapper_url: Option<String>,
    vpaid_url: Option<String>,
    source_url: Option<String>,
}

impl AdDocument {
    /// The media renditions declared by the innermost document that
    /// declared any
    pub fn media_files(&self) -> &[MediaFile] {
        &self.media_files
    }

    /// Opaque creative parameters, if any document carried them
    pub fn ad_parameters(&self) -> Option<&str> {
        self.ad_parameters.as_deref()
    }

    pub fn clickthrough_url(&self) -> Option<&str> {
        self.clickthrough_url.as_deref()
    }

    /// Impression pixels accumulated across the whole wrapper chain,
    /// duplicates preserved in arrival order
    pub fn impression_urls(&self) -> &[String] {
        &self.impression_urls
    }

    /// Error-impression pixels accumulated across the whole wrapper chain
    pub fn error_impression_urls(&self) -> &[String] {
        &self.error_impression_urls
    }

    /// Tracker URLs for one event name, in arrival order; empty for
    /// event names no document declared
    pub fn tracking_urls_for(&self, event_name: &str) -> &[String] {
        self.tracking_events
            .get(event_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every event name with at least one tracker URL
    pub fn tracking_event_names(&self) -> Vec<&str> {
        self.tracking_events.keys().map(String::as_str).collect()
    }

    /// The pending wrapper reference, present only between extraction and
    /// the follow that consumes it
    pub fn wrapper_url(&self) -> Option<&str> {
        self.wrapper_url.as_deref()
    }

    /// URL of the VPAID rendition, if one was declared
    pub fn vpaid_url(&self) -> Option<&str> {
        self.vpaid_url.as_deref()
    }

    /// URL of the most recently fetched document in the chain
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    /// Merge one extracted fragment into the cumulative model.
    ///
    /// Media files are replaced wholesale by each declaring document;
    /// ad parameters, click-through, VPAID and wrapper URLs are
    /// last-write-wins; impressions, error impressions and tracking
    /// events only ever grow.
    pub(crate) fn merge(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::MediaFiles(files) => self.media_files = files,
            Fragment::VpaidUrl(url) => self.vpaid_url = Some(url),
            Fragment::AdParameters(params) => self.ad_parameters = Some(params),
            Fragment::Clickthrough(url) => self.clickthrough_url = Some(url),
            Fragment::Impressions(urls) => self.impression_urls.extend(urls),
            Fragment::ErrorImpressions(urls) => self.error_impression_urls.extend(urls),
            Fragment::TrackingEvents(events) => {
                for (event, url) in events {
                    self.tracking_events.entry(event).or_default().push(url);
                }
            }
            Fragment::WrapperUrl(url) => self.wrapper_url = Some(url),
        }
    }

    /// Consume the pending wrapper reference, clearing it once followed
    pub(crate) fn take_wrapper_url(&mut self) -> Option<String> {
        self.wrapper_url.take()
    }

    pub(crate) fn set_source_url(&mut self, url: &str) {
        self.source_url = Some(url.to_string());
    }
}
