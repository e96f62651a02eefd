//! Integration tests driving `ResolutionSession` against a scripted
//! in-memory loader.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vast_resolver::{
    CancelHandle, FetchedDocument, RemoteLoader, ResolutionSession, ResolveError, Result,
    SelectionCriteria,
};

/// Loader that serves canned bodies by URL and records every request
struct ScriptedLoader {
    responses: HashMap<String, String>,
    byte_length: Option<u64>,
    elapsed_ms: u64,
    requests: Mutex<Vec<String>>,
    cancel_on_load: Mutex<Option<CancelHandle>>,
}

impl ScriptedLoader {
    fn new(responses: &[(&str, String)]) -> Self {
        ScriptedLoader {
            responses: responses
                .iter()
                .map(|(url, body)| (url.to_string(), body.clone()))
                .collect(),
            byte_length: None,
            elapsed_ms: 50,
            requests: Mutex::new(Vec::new()),
            cancel_on_load: Mutex::new(None),
        }
    }

    /// Force the size and timing reported for every fetch
    fn with_timing(mut self, byte_length: u64, elapsed_ms: u64) -> Self {
        self.byte_length = Some(byte_length);
        self.elapsed_ms = elapsed_ms;
        self
    }

    /// Trigger the given handle while a fetch is in flight
    fn set_cancel_on_load(&self, handle: CancelHandle) {
        *self.cancel_on_load.lock().unwrap() = Some(handle);
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteLoader for ScriptedLoader {
    async fn load(&self, url: &str, _timeout_ms: u64) -> Result<FetchedDocument> {
        self.requests.lock().unwrap().push(url.to_string());

        if let Some(handle) = self.cancel_on_load.lock().unwrap().as_ref() {
            handle.cancel();
        }

        let body = self
            .responses
            .get(url)
            .ok_or_else(|| ResolveError::RemoteFetch(format!("no response scripted for {url}")))?
            .clone();

        Ok(FetchedDocument {
            byte_length: self.byte_length.unwrap_or(body.len() as u64),
            elapsed_ms: self.elapsed_ms,
            body,
        })
    }
}

fn inline_doc() -> String {
    r#"<VAST version="3.0">
  <Ad id="inline">
    <InLine>
      <AdSystem>Test Ads</AdSystem>
      <AdTitle>Sample</AdTitle>
      <Impression><![CDATA[https://inline.example/imp1]]></Impression>
      <Impression><![CDATA[https://inline.example/imp2]]></Impression>
      <Creatives>
        <Creative>
          <Linear>
            <TrackingEvents>
              <Tracking event="start"><![CDATA[https://inline.example/start]]></Tracking>
            </TrackingEvents>
            <VideoClicks>
              <ClickThrough><![CDATA[https://advertiser.example/landing]]></ClickThrough>
            </VideoClicks>
            <MediaFiles>
              <MediaFile type="video/mp4" width="800" height="600" bitrate="500">
                <![CDATA[https://cdn.example/ad.mp4]]>
              </MediaFile>
              <MediaFile type="video/webm" width="800" height="600" bitrate="1500">
                <![CDATA[https://cdn.example/ad.webm]]>
              </MediaFile>
            </MediaFiles>
          </Linear>
        </Creative>
      </Creatives>
    </InLine>
  </Ad>
</VAST>"#
        .to_string()
}

fn wrapper_doc(next_url: &str, tag: &str) -> String {
    format!(
        r#"<VAST version="3.0">
  <Ad id="{tag}">
    <Wrapper>
      <AdSystem>Chain</AdSystem>
      <VASTAdTagURI><![CDATA[{next_url}]]></VASTAdTagURI>
      <Impression><![CDATA[https://{tag}.example/imp]]></Impression>
      <Error><![CDATA[https://{tag}.example/err]]></Error>
      <Creatives>
        <Creative>
          <Linear>
            <TrackingEvents>
              <Tracking event="start"><![CDATA[https://{tag}.example/start]]></Tracking>
            </TrackingEvents>
          </Linear>
        </Creative>
      </Creatives>
    </Wrapper>
  </Ad>
</VAST>"#
    )
}

fn session(loader: &Arc<ScriptedLoader>) -> ResolutionSession {
    ResolutionSession::new(Arc::clone(loader) as Arc<dyn RemoteLoader>)
}

#[tokio::test]
async fn resolves_an_inline_document_without_fetching() {
    let loader = Arc::new(ScriptedLoader::new(&[]));
    let resolved = session(&loader).resolve(&inline_doc()).await.unwrap();

    let doc = resolved.document();
    let media_urls: Vec<&str> = doc.media_files().iter().map(|m| m.url.as_str()).collect();
    assert_eq!(
        media_urls,
        vec!["https://cdn.example/ad.mp4", "https://cdn.example/ad.webm"]
    );
    assert_eq!(
        doc.impression_urls(),
        ["https://inline.example/imp1", "https://inline.example/imp2"]
    );
    assert_eq!(
        doc.clickthrough_url(),
        Some("https://advertiser.example/landing")
    );
    assert_eq!(doc.source_url(), None);
    assert!(loader.requests().is_empty());
    assert_eq!(resolved.bandwidth_estimate_kbs(), 0.0);
}

#[tokio::test]
async fn follows_a_wrapper_chain_and_accumulates_tracking() {
    let loader = Arc::new(ScriptedLoader::new(&[
        (
            "https://hop1.example/vast",
            wrapper_doc("https://hop2.example/vast", "w1"),
        ),
        ("https://hop2.example/vast", inline_doc()),
    ]));
    let start = wrapper_doc("https://hop1.example/vast", "w0");

    let resolved = session(&loader).resolve(&start).await.unwrap();
    let doc = resolved.document();

    // Impressions accumulate outer-to-inner, every hop preserved
    assert_eq!(
        doc.impression_urls(),
        [
            "https://w0.example/imp",
            "https://w1.example/imp",
            "https://inline.example/imp1",
            "https://inline.example/imp2",
        ]
    );

    // Only the terminal document's media files are authoritative
    assert_eq!(doc.media_files().len(), 2);
    assert_eq!(doc.media_files()[0].url, "https://cdn.example/ad.mp4");

    // Tracking events append per name across the whole chain
    assert_eq!(
        doc.tracking_urls_for("start"),
        [
            "https://w0.example/start",
            "https://w1.example/start",
            "https://inline.example/start",
        ]
    );

    // The followed wrapper reference is cleared once consumed
    assert_eq!(doc.wrapper_url(), None);
    assert_eq!(doc.source_url(), Some("https://hop2.example/vast"));
    assert_eq!(
        loader.requests(),
        ["https://hop1.example/vast", "https://hop2.example/vast"]
    );
}

#[tokio::test]
async fn a_chain_matching_the_budget_exactly_succeeds() {
    let loader = Arc::new(ScriptedLoader::new(&[
        (
            "https://hop1.example/vast",
            wrapper_doc("https://hop2.example/vast", "w1"),
        ),
        ("https://hop2.example/vast", inline_doc()),
    ]));
    let start = wrapper_doc("https://hop1.example/vast", "w0");

    let resolved = session(&loader)
        .with_follow_budget(2)
        .resolve(&start)
        .await
        .unwrap();
    assert_eq!(resolved.document().media_files().len(), 2);
}

#[tokio::test]
async fn an_over_long_chain_fails_and_fires_error_impressions() {
    let loader = Arc::new(ScriptedLoader::new(&[
        (
            "https://hop1.example/vast",
            wrapper_doc("https://hop2.example/vast", "w1"),
        ),
        ("https://hop2.example/vast", inline_doc()),
    ]));
    let start = wrapper_doc("https://hop1.example/vast", "w0");

    let failure = session(&loader)
        .with_follow_budget(1)
        .resolve(&start)
        .await
        .unwrap_err();
    assert!(matches!(
        failure.error(),
        ResolveError::WrapperBudgetExceeded
    ));

    // The accumulated error pixels still fire on budget exhaustion
    let requests = loader.requests();
    assert!(requests.contains(&"https://w0.example/err".to_string()));
    assert!(requests.contains(&"https://w1.example/err".to_string()));

    // Partial state remains inspectable for diagnostics
    assert_eq!(
        failure.partial_document().impression_urls(),
        ["https://w0.example/imp", "https://w1.example/imp"]
    );
    assert!(failure.partial_document().media_files().is_empty());
}

#[tokio::test]
async fn bandwidth_is_zero_before_and_measured_after_fetching() {
    let loader = Arc::new(
        ScriptedLoader::new(&[("https://ads.example/start", inline_doc())])
            .with_timing(100_000, 800),
    );

    let session = session(&loader);
    assert_eq!(session.bandwidth_estimate_kbs(), 0.0);

    let resolved = session
        .resolve_from_url("https://ads.example/start")
        .await
        .unwrap();

    // 100_000 bytes in 800ms is exactly 1000 kbps
    assert_eq!(resolved.bandwidth_estimate_kbs(), 1000.0);
    assert_eq!(
        resolved.document().source_url(),
        Some("https://ads.example/start")
    );
}

#[tokio::test]
async fn malformed_input_fails_without_a_resolved_document() {
    let loader = Arc::new(ScriptedLoader::new(&[]));
    let failure = session(&loader)
        .resolve("definitely not an ad document")
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error(),
        ResolveError::MalformedDocument(_)
    ));
    assert!(failure.partial_document().media_files().is_empty());
    assert!(failure.partial_document().impression_urls().is_empty());
}

#[tokio::test]
async fn a_malformed_inner_document_keeps_outer_accumulation_as_partial_state() {
    let loader = Arc::new(ScriptedLoader::new(&[(
        "https://hop1.example/vast",
        "<broken".to_string(),
    )]));
    let start = wrapper_doc("https://hop1.example/vast", "w0");

    let failure = session(&loader).resolve(&start).await.unwrap_err();
    assert!(matches!(
        failure.error(),
        ResolveError::MalformedDocument(_)
    ));
    assert_eq!(
        failure.partial_document().impression_urls(),
        ["https://w0.example/imp"]
    );
}

#[tokio::test]
async fn a_failed_hop_propagates_as_remote_fetch_error() {
    let loader = Arc::new(ScriptedLoader::new(&[]));
    let start = wrapper_doc("https://gone.example/vast", "w0");

    let failure = session(&loader).resolve(&start).await.unwrap_err();
    assert!(matches!(failure.error(), ResolveError::RemoteFetch(_)));
}

#[tokio::test]
async fn cancellation_takes_effect_before_the_next_fetch() {
    let loader = Arc::new(ScriptedLoader::new(&[(
        "https://hop1.example/vast",
        inline_doc(),
    )]));
    let session = session(&loader);
    session.cancel_handle().cancel();

    let failure = session
        .resolve(&wrapper_doc("https://hop1.example/vast", "w0"))
        .await
        .unwrap_err();
    assert!(matches!(failure.error(), ResolveError::Cancelled));
    assert!(loader.requests().is_empty());
}

#[tokio::test]
async fn a_fetch_completing_after_cancellation_is_discarded() {
    let loader = Arc::new(ScriptedLoader::new(&[(
        "https://ads.example/start",
        inline_doc(),
    )]));
    let session = session(&loader);
    loader.set_cancel_on_load(session.cancel_handle());

    let failure = session
        .resolve_from_url("https://ads.example/start")
        .await
        .unwrap_err();
    assert!(matches!(failure.error(), ResolveError::Cancelled));

    // The fetch went out, but its result never reached the model
    assert_eq!(loader.requests(), ["https://ads.example/start"]);
    assert!(failure.partial_document().media_files().is_empty());
    assert_eq!(failure.bandwidth_estimate_kbs(), 0.0);
}

#[tokio::test]
async fn observers_are_notified_once_on_completion() {
    let loader = Arc::new(ScriptedLoader::new(&[]));
    let notified = Arc::new(AtomicUsize::new(0));

    let mut session = session(&loader);
    let seen = Arc::clone(&notified);
    session.on_resolved(move |doc| {
        assert_eq!(doc.media_files().len(), 2);
        seen.fetch_add(1, Ordering::SeqCst);
    });

    session.resolve(&inline_doc()).await.unwrap();
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn observers_are_not_notified_on_failure() {
    let loader = Arc::new(ScriptedLoader::new(&[]));
    let notified = Arc::new(AtomicUsize::new(0));

    let mut session = session(&loader);
    let seen = Arc::clone(&notified);
    session.on_resolved(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    session.resolve("<broken").await.unwrap_err();
    assert_eq!(notified.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rendition_choice_falls_back_to_the_measured_bandwidth() {
    let loader = Arc::new(
        ScriptedLoader::new(&[("https://ads.example/start", inline_doc())])
            .with_timing(100_000, 800),
    );

    // Measured estimate of 1000 kbps excludes the 1500 kbps rendition
    let resolved = session(&loader)
        .resolve_from_url("https://ads.example/start")
        .await
        .unwrap();
    let best = resolved
        .best_media_file(&SelectionCriteria::default())
        .unwrap();
    assert_eq!(best.url, "https://cdn.example/ad.mp4");

    // With no measurement and no ceiling, the higher bitrate wins the tie
    let loader = Arc::new(ScriptedLoader::new(&[]));
    let resolved = session(&loader).resolve(&inline_doc()).await.unwrap();
    let best = resolved
        .best_media_file(&SelectionCriteria::default())
        .unwrap();
    assert_eq!(best.url, "https://cdn.example/ad.webm");
}

#[tokio::test]
async fn choosing_from_an_ad_without_media_fails() {
    let loader = Arc::new(ScriptedLoader::new(&[]));
    let resolved = session(&loader)
        .resolve(r#"<VAST version="3.0"><Ad><InLine><AdTitle>Empty</AdTitle></InLine></Ad></VAST>"#)
        .await
        .unwrap();

    let err = resolved
        .best_media_file(&SelectionCriteria::default())
        .unwrap_err();
    assert!(matches!(err, ResolveError::NoCandidates));
}
