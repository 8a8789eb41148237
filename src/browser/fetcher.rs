//! HTTP fetcher behind the tab host
//!
//! This module loads the documents a tab navigates to:
//! - Building the HTTP client with the configured user agent
//! - GET requests following redirects
//! - Classification of HTTP and network failures

use crate::config::FetchConfig;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;

/// Result of loading one document
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
    },

    /// The response is not an HTML document
    ContentMismatch {
        final_url: String,
        content_type: String,
    },

    /// Non-success HTTP status
    HttpError { status_code: u16 },

    /// Network error (connection refused, timeout, etc.)
    NetworkError { error: String },
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The fetch configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use listing_harvester::browser::build_http_client;
/// use listing_harvester::config::FetchConfig;
///
/// let client = build_http_client(&FetchConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .https_only(config.https_only)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a page the way a tab would load it
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx with an HTML body | `Success` |
/// | 2xx with another content type | `ContentMismatch` |
/// | any other status | `HttpError` |
/// | timeout, refused connection, TLS failure | `NetworkError` |
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
pub async fn fetch_page(client: &Client, url: &str) -> FetchResult {
    let response = match client.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            let error = if e.is_timeout() {
                "Request timeout".to_string()
            } else if e.is_connect() {
                "Connection refused".to_string()
            } else {
                e.to_string()
            };
            return FetchResult::NetworkError { error };
        }
    };

    let status = response.status();
    let final_url = response.url().to_string();

    if !status.is_success() {
        return FetchResult::HttpError {
            status_code: status.as_u16(),
        };
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    // A missing header is treated as HTML, like a browser sniffing the body
    if !content_type.is_empty() && !content_type.contains("html") {
        return FetchResult::ContentMismatch {
            final_url,
            content_type,
        };
    }

    match response.text().await {
        Ok(body) => FetchResult::Success {
            final_url,
            status_code: status.as_u16(),
            body,
        },
        Err(e) => FetchResult::NetworkError {
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&FetchConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_html_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<html><title>List</title></html>", "text/html; charset=utf-8"),
            )
            .mount(&server)
            .await;

        let client = build_http_client(&FetchConfig::default()).unwrap();
        let result = fetch_page(&client, &format!("{}/list", server.uri())).await;

        match result {
            FetchResult::Success { body, status_code, .. } => {
                assert_eq!(status_code, 200);
                assert!(body.contains("<title>List</title>"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_classifies_failures() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
            .mount(&server)
            .await;

        let client = build_http_client(&FetchConfig::default()).unwrap();

        let missing = fetch_page(&client, &format!("{}/missing", server.uri())).await;
        assert!(matches!(missing, FetchResult::HttpError { status_code: 404 }));

        let json = fetch_page(&client, &format!("{}/data.json", server.uri())).await;
        assert!(matches!(json, FetchResult::ContentMismatch { .. }));
    }
}
