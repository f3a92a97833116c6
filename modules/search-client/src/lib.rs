pub mod error;
pub mod types;

pub use error::{Result, SearchError};
pub use types::{
    parse_items, AdBody, AdCard, AdImage, AdLibraryAd, AdSnapshot, AdVideo, ImageResult, Platform,
    RawItem, SearchRequest, SocialPost, Upstream, WebResult,
};

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use tracing::{debug, info};
use types::WebSearchInput;

const DEFAULT_API_KEY_HEADER: &str = "X-API-KEY";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one upstream search endpoint. Issues exactly one HTTP call per
/// `search`; retrying and caching belong to the caller.
pub struct SearchClient {
    client: reqwest::Client,
    upstream: Upstream,
    base_url: String,
    api_key: String,
    api_key_header: String,
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("upstream", &self.upstream)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("api_key_header", &self.api_key_header)
            .finish()
    }
}

impl SearchClient {
    pub fn new(
        upstream: Upstream,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Configuration(format!(
                "API key for {upstream:?} search is empty"
            )));
        }
        Ok(Self {
            client: build_http_client(DEFAULT_TIMEOUT)?,
            upstream,
            base_url: base_url.into(),
            api_key,
            api_key_header: DEFAULT_API_KEY_HEADER.to_string(),
        })
    }

    /// Override the header carrying the API key (default `X-API-KEY`).
    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = header.into();
        self
    }

    /// Use a preconfigured HTTP client (proxy, TLS or pool settings).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Transport-level timeout. Callers usually also wrap calls in their own deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = build_http_client(timeout)?;
        Ok(self)
    }

    pub fn upstream(&self) -> Upstream {
        self.upstream
    }

    /// Run one page of a search and return the parsed items.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<RawItem>> {
        info!(
            upstream = ?self.upstream,
            query = %request.query,
            offset = request.offset,
            limit = request.limit,
            "Search request"
        );

        let builder = match self.upstream {
            Upstream::WebSearch | Upstream::ImageSearch => self
                .client
                .post(&self.base_url)
                .json(&WebSearchInput::from(request)),
            Upstream::AdLibrary | Upstream::SocialPosts | Upstream::Generic => self
                .client
                .get(&self.base_url)
                .query(&request.query_params()),
        };

        let resp = builder
            .header(self.api_key_header.as_str(), self.api_key.as_str())
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(SearchError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                body: serde_json::from_str(&text).ok(),
                message: text,
            });
        }

        let payload: serde_json::Value = resp.json().await?;
        let items = parse_items(self.upstream, payload)?;
        debug!(upstream = ?self.upstream, count = items.len(), "Search page parsed");
        Ok(items)
    }
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SearchError::Configuration(format!("Failed to build HTTP client: {e}")))
}

/// Parse a `Retry-After` header value: delta-seconds or an HTTP-date.
/// Dates in the past yield a zero delay; garbage yields `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if let Ok(secs) = value.parse::<f64>() {
        // Saturate delta-seconds too large for a Duration.
        if secs.is_finite() && secs >= 0.0 {
            return Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX));
        }
        return None;
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = at.with_timezone(&Utc) - Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("2"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(" 120 "), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(
            parse_retry_after("99999999999999999999"),
            Some(Duration::MAX)
        );
    }

    #[test]
    fn retry_after_http_date() {
        let future = (Utc::now() + chrono::Duration::seconds(90)).to_rfc2822();
        let delay = parse_retry_after(&future).unwrap();
        assert!(delay > Duration::from_secs(80) && delay <= Duration::from_secs(90));

        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn retry_after_garbage() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after("-3"), None);
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let client =
            SearchClient::new(Upstream::AdLibrary, "https://example.test/ads", "sk-live-123")
                .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("sk-live-123"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn empty_api_key_is_configuration_error() {
        let err = SearchClient::new(Upstream::WebSearch, "https://example.test/search", "  ")
            .err()
            .unwrap();
        assert!(matches!(err, SearchError::Configuration(_)));
    }

    // --- HTTP handling against canned responses ---

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn http_response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut out = format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n",
            body.len()
        );
        for (name, value) in headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        out.push_str("\r\n");
        out.push_str(body);
        out
    }

    /// Serve `response` to one connection and hand back the raw request head.
    async fn serve_once(response: String) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/search", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut chunk = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&chunk[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&head).into_owned()
        });
        (url, handle)
    }

    fn client(url: &str) -> SearchClient {
        let http = reqwest::Client::builder().no_proxy().build().unwrap();
        SearchClient::new(Upstream::AdLibrary, url, "secret")
            .unwrap()
            .with_http_client(http)
    }

    fn request() -> SearchRequest {
        SearchRequest {
            query: "earbuds".into(),
            locale: Some("US".into()),
            platforms: Vec::new(),
            active_only: false,
            offset: 0,
            limit: 10,
        }
    }

    #[tokio::test]
    async fn rate_limit_carries_retry_after() {
        let (url, server) = serve_once(http_response(
            "429 Too Many Requests",
            &[("Retry-After", "2")],
            "",
        ))
        .await;

        let err = client(&url).search(&request()).await.unwrap_err();

        assert!(matches!(err, SearchError::RateLimited { .. }));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn error_status_attaches_json_body() {
        let (url, server) = serve_once(http_response(
            "404 Not Found",
            &[("Content-Type", "application/json")],
            r#"{"error":"no such page"}"#,
        ))
        .await;

        let err = client(&url).search(&request()).await.unwrap_err();

        let SearchError::Api { status, message, body } = err else {
            panic!("expected an Api error");
        };
        assert_eq!(status, 404);
        assert!(message.contains("no such page"));
        assert_eq!(body, Some(serde_json::json!({"error": "no such page"})));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn success_parses_items_and_sends_key() {
        let (url, server) = serve_once(http_response(
            "200 OK",
            &[("Content-Type", "application/json")],
            r#"{"data":[{"ad_archive_id":"77","snapshot":{"title":"Buds"}}]}"#,
        ))
        .await;

        let items = client(&url).search(&request()).await.unwrap();

        assert_eq!(items.len(), 1);
        let RawItem::Ad(ad) = &items[0] else {
            panic!("expected an ad item");
        };
        assert_eq!(ad.ad_archive_id, "77");

        let head = server.await.unwrap().to_lowercase();
        assert!(head.starts_with("get /search?"));
        assert!(head.contains("q=earbuds"));
        assert!(head.contains("country=us"));
        assert!(head.contains("x-api-key: secret"));
    }

    #[tokio::test]
    async fn non_json_success_is_malformed() {
        let (url, server) = serve_once(http_response("200 OK", &[], "<html>oops</html>")).await;

        let err = client(&url).search(&request()).await.unwrap_err();

        assert!(matches!(err, SearchError::Malformed(_)));
        server.await.unwrap();
    }
}
