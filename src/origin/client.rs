use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};

use super::PartSource;
use crate::config::OriginConfig;
use crate::{Error, Result};

/// HTTP client for a live-read capable origin.
pub struct OriginClient {
    client: Client,
    capability_header: String,
    part_size_header: String,
}

impl OriginClient {
    pub fn new(config: &OriginConfig) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            capability_header: config.capability_header.clone(),
            part_size_header: config.part_size_header.clone(),
        }
    }

    /// The underlying client, for forwarding requests that are not live reads.
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Name of the header that enables live reads.
    pub fn capability_header(&self) -> &str {
        &self.capability_header
    }

    fn live_get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header(self.capability_header.as_str(), "true")
    }
}

#[async_trait::async_trait]
impl PartSource for OriginClient {
    async fn part_size(&self, url: &str) -> Result<Option<u64>> {
        let response = self.live_get(url).header(RANGE, "bytes=0-1").send().await?;

        if !response.status().is_success() {
            tracing::debug!(url, status = %response.status(), "Part size probe failed");
            return Ok(None);
        }

        let Some(value) = response.headers().get(self.part_size_header.as_str()) else {
            return Ok(None);
        };

        match value.to_str().ok().and_then(|v| v.trim().parse::<u64>().ok()) {
            Some(size) if size > 0 => Ok(Some(size)),
            _ => {
                tracing::warn!(url, value = ?value, "Ignoring unparseable part size header");
                Ok(None)
            }
        }
    }

    async fn part_exists(&self, url: &str, part_size: u64, part: u64) -> Result<bool> {
        // A part that starts past the end of the address space cannot exist.
        let Some((start, end)) = part_size
            .checked_mul(part.saturating_sub(1))
            .and_then(|start| Some((start, start.checked_add(1)?)))
        else {
            tracing::debug!(url, part_size, part, "Part offset overflows");
            return Ok(false);
        };
        let response = self
            .live_get(url)
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .await?;

        let exists = response.status().is_success();
        tracing::trace!(url, part, exists, "Probed part");
        Ok(exists)
    }

    async fn fetch_part(&self, url: &str, part: u64) -> Result<Bytes> {
        let response = self
            .live_get(url)
            .query(&[("partNumber", part)])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            tracing::debug!(url, part, size = bytes.len(), "Fetched part");
            return Ok(bytes);
        }

        match status {
            StatusCode::NOT_FOUND | StatusCode::RANGE_NOT_SATISFIABLE => Err(Error::PartUnavailable {
                url: url.to_string(),
                part,
            }),
            _ => Err(Error::OriginStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}
