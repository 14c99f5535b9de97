//! Gateway endpoint discovery
//!
//! A single REST call resolves the socket endpoint when the
//! configuration does not pin one.

use crate::error::{GatewayError, Result};
use serde::Deserialize;
use tracing::debug;

const API_BASE: &str = "https://discordapp.com/api";

#[derive(Debug, Deserialize)]
struct GatewayRoute {
    url: String,
}

/// Fetch the gateway URL for `version` and suffix the connection query
pub(crate) async fn gateway_url(
    client: &reqwest::Client,
    version: u8,
    encoding: &str,
) -> Result<String> {
    let route = format!("{}/v{}/gateway", API_BASE, version);
    debug!("fetching gateway route from {}", route);

    let response = client
        .get(&route)
        .send()
        .await
        .map_err(|e| GatewayError::EndpointDiscoveryFailed(e.to_string()))?;

    if !response.status().is_success() {
        return Err(GatewayError::EndpointDiscoveryFailed(format!(
            "gateway route returned {}",
            response.status()
        )));
    }

    let route: GatewayRoute = response
        .json()
        .await
        .map_err(|e| GatewayError::EndpointDiscoveryFailed(e.to_string()))?;

    Ok(with_query(&route.url, version, encoding))
}

fn with_query(url: &str, version: u8, encoding: &str) -> String {
    format!("{}?v={}&encoding={}", url, version, encoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_suffix_carries_version_and_encoding() {
        assert_eq!(
            with_query("wss://gateway.discord.gg", 6, "json"),
            "wss://gateway.discord.gg?v=6&encoding=json"
        );
    }
}
