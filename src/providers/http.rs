use crate::core::constants::USER_AGENT;
use crate::traits::JsonTransport;
use crate::{MapError, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Shared async HTTP client. Public POI APIs reject anonymous agents, and
/// building the client once keeps a single connection pool for every
/// provider request.
pub(crate) static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|err| {
            log::warn!("falling back to a default HTTP client: {err}");
            Client::new()
        })
});

/// [`JsonTransport`] backed by the shared reqwest client
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestTransport;

#[async_trait]
impl JsonTransport for ReqwestTransport {
    async fn get_json(
        &self,
        url: &str,
        params: &[(String, String)],
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let response = HTTP_CLIENT
            .get(url)
            .query(params)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MapError::ProviderUnavailable {
                provider: url.to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        Ok(response.json::<serde_json::Value>().await?)
    }
}
