//! Remote timing tables over HTTP.
//!
//! `HttpProvider` fetches
//! `GET {base_url}/timings/{date}/{category}/{reading_id}.json`.
//! All connection details come from [`ProviderConfig`]; nothing is
//! hardcoded.

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::config::ProviderConfig;
use crate::provider::traits::{decode_table, ProviderError, TimingProvider};
use crate::timing::{ReadingKey, TimingTable};

/// Fetches timing JSON from a static file server or API.
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProvider {
    /// Build an `HttpProvider` from provider config.
    ///
    /// The client carries the per-request timeout from
    /// `config.timeout_secs`.  A default client is used as a last-resort
    /// fallback if the builder fails.
    pub fn from_config(config: &ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Request URL for `key`.
    pub fn url_for(&self, key: &ReadingKey) -> String {
        format!(
            "{}/timings/{}/{}/{}.json",
            self.base_url, key.date, key.category, key.reading_id
        )
    }
}

#[async_trait]
impl TimingProvider for HttpProvider {
    async fn timing_data(&self, key: &ReadingKey) -> Result<TimingTable, ProviderError> {
        let url = self.url_for(key);
        log::debug!("http provider: GET {url}");

        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ProviderError::NotFound(key.clone())),
            status if !status.is_success() => {
                return Err(ProviderError::Request(format!("{url} returned {status}")));
            }
            _ => {}
        }

        let body = response.bytes().await?;
        decode_table(&body)
    }
}
