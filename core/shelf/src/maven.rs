//! Maven Central implementation of the registry and artifact source.
//!
//! Release metadata comes from the Solr search API
//! (`{registry}/solrsearch/select`), artifacts from the standard repository
//! layout (`{repository}/{group path}/{artifact}/{version}/{artifact}-{version}.jar`).
//!
//! Requests that fail at the transport level or with a 5xx/429 status are
//! retried up to three times with exponential backoff and jitter. Other
//! failures are returned immediately.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ShelfConfig;
use crate::errors::{ShelfError, ShelfResult};
use crate::registry::{ArtifactSource, ByteSource, ReleaseRegistry};
use crate::release::ReleaseId;

/// Maximum number of attempts per request.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("kshelf/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct SearchResponse {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    docs: Vec<SearchDoc>,
}

#[derive(Debug, Deserialize)]
struct SearchDoc {
    #[serde(rename = "g")]
    group_id: String,
    #[serde(rename = "a")]
    artifact_id: String,
    #[serde(rename = "v")]
    version: String,
    timestamp: i64,
}

/// Registry and artifact source backed by Maven Central (or a mirror).
#[derive(Debug, Clone)]
pub struct MavenCentral {
    metadata_client: reqwest::Client,
    download_client: reqwest::Client,
    registry_base: String,
    repository_base: String,
    group_id: String,
    artifact_id: String,
    rows: u32,
}

impl MavenCentral {
    /// # Errors
    ///
    /// Returns a network error if an HTTP client cannot be built.
    pub fn new(config: &ShelfConfig) -> ShelfResult<Self> {
        Ok(Self {
            metadata_client: build_client(config.registry_timeout)?,
            download_client: build_client(config.download_timeout)?,
            registry_base: config.registry_base().to_string(),
            repository_base: config.repository_base().to_string(),
            group_id: config.group_id.clone(),
            artifact_id: config.artifact_id.clone(),
            rows: config.rows,
        })
    }

    #[must_use]
    pub fn search_url(&self) -> String {
        format!(
            "{}/solrsearch/select?q=g:{}+AND+a:{}&rows={}&core=gav&wt=json",
            self.registry_base, self.group_id, self.artifact_id, self.rows
        )
    }

    #[must_use]
    pub fn artifact_url(&self, release: &ReleaseId) -> String {
        format!(
            "{}/{}/{artifact}/{version}/{artifact}-{version}.jar",
            self.repository_base,
            self.group_id.replace('.', "/"),
            artifact = self.artifact_id,
            version = release.version,
        )
    }
}

#[async_trait]
impl ReleaseRegistry for MavenCentral {
    async fn fetch_releases(&self) -> ShelfResult<Vec<ReleaseId>> {
        let url = self.search_url();
        let response = send_with_retry(&self.metadata_client, &url).await?;
        let text = response.text().await.map_err(|e| {
            ShelfError::network_with_source(format!("failed to read response from {url}"), e)
        })?;
        let releases = parse_releases(&text, &self.group_id, &self.artifact_id)?;
        info!(count = releases.len(), "fetched release list");
        Ok(releases)
    }
}

#[async_trait]
impl ArtifactSource for MavenCentral {
    async fn open(&self, release: &ReleaseId) -> ShelfResult<ByteSource> {
        let url = self.artifact_url(release);
        let response = send_with_retry(&self.download_client, &url).await?;
        let total = response.content_length();
        debug!(url = %url, total = ?total, "artifact stream opened");
        let chunks = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| ShelfError::network_with_source("failed to read artifact body", e))
        });
        Ok(ByteSource::new(total, chunks))
    }
}

/// Parses a Solr search response into release ids.
///
/// # Errors
///
/// Returns a network error if the body is not a search response or a
/// document belongs to another group or artifact.
pub fn parse_releases(body: &str, group_id: &str, artifact_id: &str) -> ShelfResult<Vec<ReleaseId>> {
    let parsed: SearchResponse = serde_json::from_str(body)
        .map_err(|e| ShelfError::network_with_source("failed to parse release list", e))?;
    parsed
        .response
        .docs
        .into_iter()
        .map(|doc| {
            if doc.group_id != group_id {
                return Err(ShelfError::network(format!(
                    "expected group id {group_id} but got {}",
                    doc.group_id
                )));
            }
            if doc.artifact_id != artifact_id {
                return Err(ShelfError::network(format!(
                    "expected artifact id {artifact_id} but got {}",
                    doc.artifact_id
                )));
            }
            Ok(ReleaseId::new(doc.version, doc.timestamp))
        })
        .collect()
}

fn build_client(timeout: Duration) -> ShelfResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ShelfError::network_with_source("failed to create HTTP client", e))
}

/// Sends a GET request, retrying transient failures.
async fn send_with_retry(client: &reqwest::Client, url: &str) -> ShelfResult<reqwest::Response> {
    let mut last_error = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            let delay = calculate_retry_delay(attempt);
            debug!(url, attempt = attempt + 1, delay_ms = delay, "retrying request");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match client.get(url).send().await {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                let status = response.status();
                let error = http_error(status, url);
                if !is_transient(status) {
                    return Err(error);
                }
                warn!(url, %status, "transient HTTP error");
                last_error = Some(error);
            }
            Err(e) => {
                warn!(url, error = %e, "request failed");
                last_error = Some(ShelfError::network_with_source(
                    format!("failed to connect to {url}"),
                    e,
                ));
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        ShelfError::network(format!("request failed after {MAX_RETRIES} attempts: {url}"))
    }))
}

fn is_transient(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Maps an unsuccessful status to a user-facing error.
fn http_error(status: reqwest::StatusCode, url: &str) -> ShelfError {
    match status.as_u16() {
        404 => ShelfError::network(format!("not found: {url}")),
        code if code >= 500 => ShelfError::network(format!("server error ({code}): {url}")),
        code => ShelfError::network(format!("HTTP error {code}: {url}")),
    }
}

/// Calculates the retry delay with exponential backoff and jitter.
///
/// The delay doubles with each attempt (2s, 4s) with +/- 25% jitter.
fn calculate_retry_delay(attempt: u32) -> u64 {
    let base_delay = BASE_RETRY_DELAY_MS * 2u64.pow(attempt);
    let jitter_range = base_delay / 4;
    let jitter = rand::rng().random_range(0..=jitter_range * 2);
    base_delay - jitter_range + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "org.jetbrains.kotlin";
    const ARTIFACT: &str = "kotlin-compiler";

    fn sample_response() -> &'static str {
        r#"{
            "responseHeader": {"status": 0},
            "response": {
                "numFound": 2,
                "start": 0,
                "docs": [
                    {"id": "org.jetbrains.kotlin:kotlin-compiler:2.0.20", "g": "org.jetbrains.kotlin",
                     "a": "kotlin-compiler", "v": "2.0.20", "p": "jar", "timestamp": 1724320800000},
                    {"id": "org.jetbrains.kotlin:kotlin-compiler:2.0.10", "g": "org.jetbrains.kotlin",
                     "a": "kotlin-compiler", "v": "2.0.10", "p": "jar", "timestamp": 1722470400000}
                ]
            }
        }"#
    }

    fn maven(home: &std::path::Path) -> MavenCentral {
        let mut config = ShelfConfig::with_home(home);
        config.registry_url = String::from("http://registry.local/");
        config.repository_url = String::from("http://repo.local/maven2");
        MavenCentral::new(&config).unwrap()
    }

    #[test]
    fn parses_search_documents() {
        let releases = parse_releases(sample_response(), GROUP, ARTIFACT).unwrap();
        assert_eq!(
            releases,
            vec![
                ReleaseId::new("2.0.20", 1_724_320_800_000),
                ReleaseId::new("2.0.10", 1_722_470_400_000),
            ]
        );
    }

    #[test]
    fn rejects_foreign_group() {
        let body = r#"{"response":{"docs":[{"g":"com.example","a":"kotlin-compiler","v":"1","timestamp":1}]}}"#;
        let err = parse_releases(body, GROUP, ARTIFACT).unwrap_err();
        assert!(err.to_string().contains("expected group id"));
    }

    #[test]
    fn rejects_foreign_artifact() {
        let body = r#"{"response":{"docs":[{"g":"org.jetbrains.kotlin","a":"kotlin-stdlib","v":"1","timestamp":1}]}}"#;
        let err = parse_releases(body, GROUP, ARTIFACT).unwrap_err();
        assert!(err.to_string().contains("expected artifact id"));
    }

    #[test]
    fn malformed_body_is_a_network_error() {
        let err = parse_releases("<html>", GROUP, ARTIFACT).unwrap_err();
        assert!(err.is_network());
    }

    #[test]
    fn empty_docs_is_an_empty_list() {
        let releases = parse_releases(r#"{"response":{"docs":[]}}"#, GROUP, ARTIFACT).unwrap();
        assert!(releases.is_empty());
    }

    #[test]
    fn builds_search_url_without_double_slash() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            maven(dir.path()).search_url(),
            "http://registry.local/solrsearch/select?q=g:org.jetbrains.kotlin+AND+a:kotlin-compiler&rows=200&core=gav&wt=json"
        );
    }

    #[test]
    fn builds_artifact_url_from_group_path() {
        let dir = tempfile::tempdir().unwrap();
        let url = maven(dir.path()).artifact_url(&ReleaseId::new("2.0.20", 1));
        assert_eq!(
            url,
            "http://repo.local/maven2/org/jetbrains/kotlin/kotlin-compiler/2.0.20/kotlin-compiler-2.0.20.jar"
        );
    }

    #[test]
    fn retry_delay_stays_within_jitter_bounds() {
        for attempt in 1..MAX_RETRIES {
            let base = BASE_RETRY_DELAY_MS * 2u64.pow(attempt);
            let delay = calculate_retry_delay(attempt);
            assert!(delay >= base - base / 4);
            assert!(delay <= base + base / 4);
        }
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_transient(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient(reqwest::StatusCode::NOT_FOUND));
    }

    #[test]
    fn http_error_messages() {
        assert!(http_error(reqwest::StatusCode::NOT_FOUND, "u").to_string().contains("not found"));
        assert!(
            http_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "u")
                .to_string()
                .contains("500")
        );
    }
}
