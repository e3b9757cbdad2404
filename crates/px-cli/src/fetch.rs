//! Subscription fetching.

use std::fs;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials for a protected subscription URL.
#[derive(Debug, Clone, Default)]
pub struct BasicAuth {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Fetch a subscription body over HTTP(S).
pub async fn read_from_server(url: &str, auth: &BasicAuth) -> Result<String, String> {
    log::debug!("fetching subscription from {url}");

    let client = reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {e}"))?;

    let mut request = client.get(url);
    if let Some(username) = auth.username.as_deref().filter(|u| !u.is_empty()) {
        request = request.basic_auth(username, auth.password.as_deref());
    }

    let response = request
        .send()
        .await
        .map_err(|e| format!("HTTP request failed for {url}: {e}"))?;

    let status = response.status();
    if !status.is_success() {
        return Err(format!("HTTP {status} for {url}"));
    }

    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read response body: {e}"))?;
    log::debug!("fetched {} bytes from {url}", body.len());
    Ok(body)
}

pub fn is_remote(source: &str) -> bool {
    let lower = source.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Read a subscription from a URL or a local file.
pub async fn read_source(source: &str, auth: &BasicAuth) -> Result<String, String> {
    if is_remote(source) {
        read_from_server(source, auth).await
    } else {
        fs::read_to_string(source).map_err(|e| format!("Failed to read '{source}': {e}"))
    }
}
