use crate::error::{ResolveError, Result};
use async_trait::async_trait;
use log::debug;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use std::path::Path;
use std::time::{Duration, Instant};

/// Default per-fetch timeout applied when the caller does not supply one
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// The result of one completed remote fetch
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedDocument {
    /// The response body text
    pub body: String,

    /// Payload size in bytes
    pub byte_length: u64,

    /// Wall-clock duration of the fetch in milliseconds
    pub elapsed_ms: u64,
}

/// The injected network capability the resolver follows wrapper chains
/// through.
///
/// The resolver never retries a failed hop; retry policy, if any, belongs
/// to the implementation behind this trait.
#[async_trait]
pub trait RemoteLoader: Send + Sync {
    /// Fetch one document, reporting its size and elapsed time alongside
    /// the body. Fails with [`ResolveError::RemoteFetch`] on network
    /// failure, non-success status, or timeout.
    async fn load(&self, url: &str, timeout_ms: u64) -> Result<FetchedDocument>;
}

/// The default loader, backed by a reqwest client
pub struct HttpLoader {
    client: reqwest::Client,
}

impl HttpLoader {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(|e| {
            ResolveError::RemoteFetch(format!("failed to build HTTP client: {e}"))
        })?;

        Ok(HttpLoader { client })
    }
}

#[async_trait]
impl RemoteLoader for HttpLoader {
    async fn load(&self, url: &str, timeout_ms: u64) -> Result<FetchedDocument> {
        // Validate the URL before going to the network
        let url = url::Url::parse(url)?;

        // Random request ID for correlating log lines
        let req_id: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();

        debug!("[{req_id}] fetching {url}");
        let start_time = Instant::now();

        let response = self
            .client
            .get(url)
            .timeout(Duration::from_millis(timeout_ms))
            .send()
            .await
            .map_err(|e| {
                debug!("[{req_id}] request failed after {:?}", start_time.elapsed());
                ResolveError::RemoteFetch(format!("failed to fetch URL: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(ResolveError::RemoteFetch(format!(
                "failed to fetch URL: HTTP status {}",
                response.status()
            )));
        }

        let body = response.text().await.map_err(|e| {
            ResolveError::RemoteFetch(format!("failed to read response body: {e}"))
        })?;

        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        let byte_length = body.len() as u64;
        debug!("[{req_id}] received {byte_length} bytes in {elapsed_ms}ms");

        Ok(FetchedDocument {
            body,
            byte_length,
            elapsed_ms,
        })
    }
}

/// Read ad XML from a `file://` URL, a plain file path, or a remote URL
pub async fn load_source(input: &str) -> Result<String> {
    if let Some(path) = input.strip_prefix("file://") {
        debug!("reading from file: {path}");
        return Ok(tokio::fs::read_to_string(path).await?);
    }

    if Path::new(input).exists() {
        debug!("reading from local file: {input}");
        return Ok(tokio::fs::read_to_string(input).await?);
    }

    let loader = HttpLoader::new()?;
    Ok(loader.load(input, DEFAULT_TIMEOUT_MS).await?.body)
}
