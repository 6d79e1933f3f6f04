//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for profile pages, with redirects left unfollowed
//! - Classification of the response for the relation stage

use crate::config::Config;
use crate::url::validate_url;
use crate::{RelcrawlError, Result};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client};
use tracing::debug;
use url::Url;

/// Result of fetching a profile page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResult {
    /// A 3xx response with a resolvable Location
    Redirect {
        /// HTTP status code
        status: u16,
        /// Location resolved against the requested URL
        location: Url,
    },

    /// A 200 HTML page with a non-blank body
    Html {
        /// Page body content
        body: String,
    },

    /// A 200 HTML page whose body is blank
    Empty,

    /// A 2xx response that is not an HTML page
    Unsupported {
        /// The Content-Type received, if any
        content_type: Option<String>,
    },

    /// Any other status
    HttpError {
        /// The HTTP status code
        status: u16,
    },
}

fn client_builder(config: &Config) -> reqwest::ClientBuilder {
    Client::builder()
        .user_agent(config.user_agent.header_value())
        .timeout(config.fetch_timeout())
        .connect_timeout(config.fetch_timeout())
        .gzip(true)
        .brotli(true)
}

/// Builds the client used for profile pages
///
/// Redirects are never followed; they become relations instead.
pub fn build_page_client(config: &Config) -> std::result::Result<Client, reqwest::Error> {
    client_builder(config).redirect(Policy::none()).build()
}

/// Builds the client used for robots.txt and webhook requests
pub fn build_http_client(config: &Config) -> std::result::Result<Client, reqwest::Error> {
    client_builder(config)
        .redirect(Policy::limited(config.crawler.max_redirects))
        .build()
}

/// Fetches a profile page and classifies the response
///
/// # Classification
///
/// | Response | Result |
/// |----------|--------|
/// | 3xx with Location | Redirect |
/// | 3xx without Location | error |
/// | 200, `text/html`, non-blank body | Html |
/// | 200, `text/html`, blank body | Empty |
/// | other 2xx | Unsupported |
/// | anything else | HttpError |
///
/// Transport failures and timeouts are returned as [`RelcrawlError::Http`].
pub async fn fetch_page(client: &Client, url: &Url) -> Result<FetchResult> {
    let http_error = |source: reqwest::Error| RelcrawlError::Http {
        url: url.to_string(),
        source,
    };

    let response = client.get(url.as_str()).send().await.map_err(http_error)?;
    let status = response.status();

    if status.is_redirection() {
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| url.join(v.trim()).ok())
            .ok_or_else(|| RelcrawlError::RedirectWithoutLocation {
                url: url.to_string(),
            })?;
        let location = validate_url(location.as_str())?;

        debug!("Redirect {} from {} to {}", status.as_u16(), url, location);
        return Ok(FetchResult::Redirect {
            status: status.as_u16(),
            location,
        });
    }

    if !status.is_success() {
        return Ok(FetchResult::HttpError {
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let is_html = content_type
        .as_deref()
        .map(|ct| {
            ct.split(';')
                .next()
                .unwrap_or("")
                .trim()
                .eq_ignore_ascii_case("text/html")
        })
        .unwrap_or(false);

    if status.as_u16() != 200 || !is_html {
        return Ok(FetchResult::Unsupported { content_type });
    }

    let body = response.text().await.map_err(http_error)?;
    if body.trim().is_empty() {
        Ok(FetchResult::Empty)
    } else {
        Ok(FetchResult::Html { body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn fetch(server: &MockServer, template: ResponseTemplate) -> Result<FetchResult> {
        Mock::given(method("GET"))
            .and(path("/foo"))
            .respond_with(template)
            .mount(server)
            .await;

        let client = build_page_client(&Config::default()).unwrap();
        let url = Url::parse(&format!("{}/foo", server.uri())).unwrap();
        fetch_page(&client, &url).await
    }

    #[test]
    fn test_build_clients() {
        let config = Config::default();
        assert!(build_page_client(&config).is_ok());
        assert!(build_http_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_html_page() {
        let server = MockServer::start().await;
        let result = fetch(
            &server,
            ResponseTemplate::new(200)
                .set_body_raw("<html><body>hi</body></html>", "text/html; charset=utf-8"),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            FetchResult::Html {
                body: "<html><body>hi</body></html>".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_blank_html_page() {
        let server = MockServer::start().await;
        let result = fetch(
            &server,
            ResponseTemplate::new(200).set_body_raw("  \n ", "text/html"),
        )
        .await
        .unwrap();

        assert_eq!(result, FetchResult::Empty);
    }

    #[tokio::test]
    async fn test_unsupported_content_type() {
        let server = MockServer::start().await;
        let result = fetch(
            &server,
            ResponseTemplate::new(200).set_body_raw("{}", "application/json"),
        )
        .await
        .unwrap();

        assert_eq!(
            result,
            FetchResult::Unsupported {
                content_type: Some("application/json".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_permanent_redirect_not_followed() {
        let server = MockServer::start().await;
        let result = fetch(
            &server,
            ResponseTemplate::new(301).insert_header("location", "/canonical-foo"),
        )
        .await
        .unwrap();

        let expected = Url::parse(&format!("{}/canonical-foo", server.uri())).unwrap();
        assert_eq!(
            result,
            FetchResult::Redirect {
                status: 301,
                location: expected
            }
        );
    }

    #[tokio::test]
    async fn test_redirect_without_location() {
        let server = MockServer::start().await;
        let result = fetch(&server, ResponseTemplate::new(302)).await;

        assert!(matches!(
            result,
            Err(RelcrawlError::RedirectWithoutLocation { .. })
        ));
    }

    #[tokio::test]
    async fn test_http_error() {
        let server = MockServer::start().await;
        let result = fetch(&server, ResponseTemplate::new(500)).await.unwrap();

        assert_eq!(result, FetchResult::HttpError { status: 500 });
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let client = build_page_client(&Config::default()).unwrap();
        let url = Url::parse("http://127.0.0.1:1/foo").unwrap();

        assert!(matches!(
            fetch_page(&client, &url).await,
            Err(RelcrawlError::Http { .. })
        ));
    }
}
