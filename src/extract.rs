use crate::model::{Fragment, MediaFile};
use crate::parser::{ParsedDocument, ParsedLinear, ParsedMediaFile};

/// One element extractor: reads a parsed document, reports the fragment it
/// is responsible for, or `None` when the element is absent. Extractors
/// never perform I/O and never fail.
type Extractor = fn(&ParsedDocument) -> Option<Fragment>;

/// The fixed extractor set, invoked in this order for every document
const EXTRACTORS: &[Extractor] = &[
    media_files,
    vpaid_url,
    ad_parameters,
    clickthrough,
    impressions,
    error_impressions,
    tracking_events,
    wrapper_url,
];

/// Run every element extractor against one parsed document
pub fn extract_all(doc: &ParsedDocument) -> Vec<Fragment> {
    EXTRACTORS.iter().filter_map(|extract| extract(doc)).collect()
}

fn media_files(doc: &ParsedDocument) -> Option<Fragment> {
    let files: Vec<MediaFile> = linears(doc)
        .flat_map(|linear| &linear.media_files)
        .filter(|file| !file.url.is_empty())
        .map(|file| MediaFile {
            url: file.url.clone(),
            mime_type: file.mime_type.clone(),
            width: file.width.unwrap_or(0),
            height: file.height.unwrap_or(0),
            bitrate_kbs: file.bitrate,
            is_vpaid: is_vpaid(file),
        })
        .collect();

    if files.is_empty() {
        None
    } else {
        Some(Fragment::MediaFiles(files))
    }
}

fn vpaid_url(doc: &ParsedDocument) -> Option<Fragment> {
    linears(doc)
        .flat_map(|linear| &linear.media_files)
        .find(|file| is_vpaid(file) && !file.url.is_empty())
        .map(|file| Fragment::VpaidUrl(file.url.clone()))
}

fn ad_parameters(doc: &ParsedDocument) -> Option<Fragment> {
    linears(doc)
        .find_map(|linear| linear.ad_parameters.clone())
        .map(Fragment::AdParameters)
}

fn clickthrough(doc: &ParsedDocument) -> Option<Fragment> {
    linears(doc)
        .find_map(|linear| linear.click_through.clone())
        .filter(|url| !url.is_empty())
        .map(Fragment::Clickthrough)
}

fn impressions(doc: &ParsedDocument) -> Option<Fragment> {
    let urls: Vec<String> = doc
        .ads
        .iter()
        .flat_map(|ad| &ad.impressions)
        .filter(|url| !url.is_empty())
        .cloned()
        .collect();

    if urls.is_empty() {
        None
    } else {
        Some(Fragment::Impressions(urls))
    }
}

fn error_impressions(doc: &ParsedDocument) -> Option<Fragment> {
    let urls: Vec<String> = doc
        .error_urls
        .iter()
        .chain(doc.ads.iter().flat_map(|ad| &ad.error_urls))
        .filter(|url| !url.is_empty())
        .cloned()
        .collect();

    if urls.is_empty() {
        None
    } else {
        Some(Fragment::ErrorImpressions(urls))
    }
}

fn tracking_events(doc: &ParsedDocument) -> Option<Fragment> {
    let events: Vec<(String, String)> = linears(doc)
        .flat_map(|linear| linear.tracking.iter().cloned())
        .collect();

    if events.is_empty() {
        None
    } else {
        Some(Fragment::TrackingEvents(events))
    }
}

fn wrapper_url(doc: &ParsedDocument) -> Option<Fragment> {
    doc.ads
        .iter()
        .find_map(|ad| ad.wrapper_uri.clone())
        .filter(|url| !url.is_empty())
        .map(Fragment::WrapperUrl)
}

fn linears(doc: &ParsedDocument) -> impl Iterator<Item = &ParsedLinear> {
    doc.ads.iter().flat_map(|ad| &ad.linears)
}

fn is_vpaid(file: &ParsedMediaFile) -> bool {
    file.api_framework
        .as_deref()
        .is_some_and(|framework| framework.eq_ignore_ascii_case("VPAID"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_document;

    const SAMPLE: &str = r#"<VAST version="3.0">
  <Ad>
    <InLine>
      <Impression><![CDATA[https://t.example/imp]]></Impression>
      <Error><![CDATA[https://t.example/err]]></Error>
      <Creatives>
        <Creative>
          <Linear>
            <AdParameters><![CDATA[params]]></AdParameters>
            <TrackingEvents>
              <Tracking event="start"><![CDATA[https://t.example/start]]></Tracking>
            </TrackingEvents>
            <VideoClicks>
              <ClickThrough><![CDATA[https://t.example/click]]></ClickThrough>
            </VideoClicks>
            <MediaFiles>
              <MediaFile type="video/mp4" width="640" height="360" bitrate="500">
                <![CDATA[https://cdn.example/a.mp4]]>
              </MediaFile>
              <MediaFile type="application/javascript" apiFramework="VPAID">
                <![CDATA[https://cdn.example/vpaid.js]]>
              </MediaFile>
            </MediaFiles>
          </Linear>
        </Creative>
      </Creatives>
    </InLine>
  </Ad>
</VAST>"#;

    #[test]
    fn extracts_every_declared_fragment() {
        let doc = parse_document(SAMPLE).unwrap();
        let fragments = extract_all(&doc);

        assert!(fragments
            .iter()
            .any(|f| matches!(f, Fragment::MediaFiles(files) if files.len() == 2)));
        assert!(fragments
            .iter()
            .any(|f| matches!(f, Fragment::VpaidUrl(url) if url == "https://cdn.example/vpaid.js")));
        assert!(fragments
            .iter()
            .any(|f| matches!(f, Fragment::AdParameters(p) if p == "params")));
        assert!(fragments
            .iter()
            .any(|f| matches!(f, Fragment::Clickthrough(url) if url == "https://t.example/click")));
        assert!(fragments
            .iter()
            .any(|f| matches!(f, Fragment::Impressions(urls) if urls == &["https://t.example/imp"])));
        assert!(fragments
            .iter()
            .any(|f| matches!(f, Fragment::ErrorImpressions(urls) if urls == &["https://t.example/err"])));
        assert!(fragments
            .iter()
            .any(|f| matches!(f, Fragment::TrackingEvents(events) if events.len() == 1)));
        assert!(!fragments.iter().any(|f| matches!(f, Fragment::WrapperUrl(_))));
    }

    #[test]
    fn missing_dimension_attributes_become_zero_sentinels() {
        let doc = parse_document(SAMPLE).unwrap();
        let fragments = extract_all(&doc);

        let Some(Fragment::MediaFiles(files)) = fragments
            .iter()
            .find(|f| matches!(f, Fragment::MediaFiles(_)))
        else {
            panic!("no media files fragment");
        };
        let vpaid = &files[1];
        assert_eq!(vpaid.width, 0);
        assert_eq!(vpaid.height, 0);
        assert_eq!(vpaid.bitrate_kbs, None);
        assert!(vpaid.is_vpaid);
        assert!(!files[0].is_vpaid);
    }

    #[test]
    fn wrapper_reference_is_reported_when_present() {
        let doc = parse_document(
            r#"<VAST version="2.0"><Ad><Wrapper>
                 <VASTAdTagURI><![CDATA[https://ads.example/next.xml]]></VASTAdTagURI>
               </Wrapper></Ad></VAST>"#,
        )
        .unwrap();
        let fragments = extract_all(&doc);

        assert!(fragments
            .iter()
            .any(|f| matches!(f, Fragment::WrapperUrl(url) if url == "https://ads.example/next.xml")));
    }

    #[test]
    fn absent_elements_produce_no_fragments() {
        let doc = parse_document(r#"<VAST version="3.0"></VAST>"#).unwrap();
        assert!(extract_all(&doc).is_empty());
    }
}
