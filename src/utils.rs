//! Loading the list of proxies to probe.

use crate::error::{Error, Result};
use log::{info, warn};
use reqwest::Client;

/// Fetch and parse a list of proxies from a URL or file path.
pub async fn load_proxy_list(source: &str) -> Result<Vec<String>> {
    let failed = |reason: String| Error::ProxySource { location: source.to_string(), reason };

    let content = if source.starts_with("http://") || source.starts_with("https://") {
        let response = Client::new()
            .get(source)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| failed(e.to_string()))?;
        response.text().await.map_err(|e| failed(e.to_string()))?
    } else {
        tokio::fs::read_to_string(source).await.map_err(|e| failed(e.to_string()))?
    };

    let proxies = parse_proxy_list(&content);
    if proxies.is_empty() {
        warn!("No proxies found in {}", source);
    } else {
        info!("Loaded {} proxies from {}", proxies.len(), source);
    }
    Ok(proxies)
}

/// One proxy URL per line; blank lines and `#` comments are skipped.
pub fn parse_proxy_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
