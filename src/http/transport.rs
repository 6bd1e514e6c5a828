//! Network client construction
//!
//! Builds the `reqwest::Client` shared by every call. A caller-supplied
//! client is used verbatim; otherwise one is built from the configured
//! timeouts and user agent. No retry or interceptor layers are added here.

use crate::config::ClientConfig;
use crate::error::Result;
use reqwest::Client;
use tracing::debug;

/// Build the network client for `config`
pub fn build_client(config: &ClientConfig) -> Result<Client> {
    if let Some(client) = &config.http_client {
        debug!("Using caller-supplied HTTP client");
        return Ok(client.clone());
    }

    let client = Client::builder()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .build()?;

    debug!(
        "Built HTTP client (timeout {:?}, connect timeout {:?})",
        config.timeout, config.connect_timeout
    );
    Ok(client)
}
