use crate::UrlError;
use url::Url;

/// Longest accepted URL, matching the `urls.url` column
pub const MAX_URL_LENGTH: usize = 1024;

/// Longest accepted host (including any port)
pub const MAX_HOST_LENGTH: usize = 255;

/// Checks that a string is a URL the crawler is willing to store
///
/// # Rules
///
/// 1. It must parse as an absolute URL
/// 2. The scheme must be `http` or `https`
/// 3. It must have a host of at most 255 characters
/// 4. The whole string must be at most 1024 characters
///
/// # Returns
///
/// * `Ok(Url)` - The parsed URL
/// * `Err(UrlError)` - The first rule that was violated
///
/// # Examples
///
/// ```
/// use relcrawl::url::validate_url;
///
/// assert!(validate_url("http://example.com/foo").is_ok());
/// assert!(validate_url("ftp://example.com/foo").is_err());
/// ```
pub fn validate_url(page: &str) -> Result<Url, UrlError> {
    let url = Url::parse(page).map_err(|e| UrlError::Parse(format!("{}: {}", page, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(page.to_string()));
    }

    let host = url
        .host_str()
        .ok_or_else(|| UrlError::MissingHost(page.to_string()))?;

    let host_len = host.len() + url.port().map(|p| p.to_string().len() + 1).unwrap_or(0);
    if host_len > MAX_HOST_LENGTH {
        return Err(UrlError::HostTooLong(page.to_string()));
    }

    if page.len() > MAX_URL_LENGTH {
        return Err(UrlError::TooLong(page.len()));
    }

    Ok(url)
}
