//! Stream registry client
//!
//! Typed create/retrieve/list/delete against the external platform. The
//! registry holds no cache; every call goes to the platform and local state
//! is never touched here.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use livecast_mux::{CreateLiveStreamRequest, MuxClient, MuxCredentials};
use tracing::{info, warn};

use crate::config::MuxConfig;
use crate::error::{Error, Result};
use crate::models::{CreateStreamParams, StreamId, StreamRecord};

/// Registry operations the lifecycle core depends on
#[async_trait]
pub trait StreamRegistryClient: Send + Sync {
    /// Create one stream. Parameters are already validated by construction.
    async fn create(&self, params: CreateStreamParams) -> Result<StreamRecord>;

    /// Fetch one stream; `Error::NotFound` if the platform has no such id
    async fn retrieve(&self, id: &StreamId) -> Result<StreamRecord>;

    /// Fetch every stream; an empty platform yields an empty vector
    async fn list(&self) -> Result<Vec<StreamRecord>>;

    /// Delete one stream; `Error::NotFound` if it is already gone
    async fn delete(&self, id: &StreamId) -> Result<()>;
}

/// [`StreamRegistryClient`] backed by the Mux API
///
/// Built without credentials it still answers every call, always with the
/// same `Error::Configuration`, so callers see one consistent failure.
pub struct MuxRegistry {
    client: Option<MuxClient>,
    page_limit: u32,
    max_pages: u32,
}

impl MuxRegistry {
    #[must_use]
    pub fn new(client: MuxClient, page_limit: u32, max_pages: u32) -> Self {
        Self {
            client: Some(client),
            page_limit: page_limit.max(1),
            max_pages: max_pages.max(1),
        }
    }

    /// A registry with no credentials; every call fails with `Error::Configuration`
    #[must_use]
    pub const fn unconfigured() -> Self {
        Self {
            client: None,
            page_limit: 25,
            max_pages: 1,
        }
    }

    /// Build from configuration. Missing credentials are not an error here;
    /// they surface on each call instead.
    pub fn from_config(config: &MuxConfig) -> Result<Self> {
        let Some((token_id, token_secret)) = config.credentials() else {
            warn!("{}", crate::error::MISSING_CREDENTIALS);
            return Ok(Self {
                page_limit: config.list_page_limit.max(1),
                max_pages: config.max_list_pages.max(1),
                ..Self::unconfigured()
            });
        };

        let client = MuxClient::with_base_url(
            &config.base_url,
            MuxCredentials::new(token_id, token_secret),
            Duration::from_secs(config.request_timeout_seconds),
        )?;

        Ok(Self::new(client, config.list_page_limit, config.max_list_pages))
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<&MuxClient> {
        self.client.as_ref().ok_or_else(Error::missing_credentials)
    }
}

#[async_trait]
impl StreamRegistryClient for MuxRegistry {
    async fn create(&self, params: CreateStreamParams) -> Result<StreamRecord> {
        let client = self.client()?;
        let request = CreateLiveStreamRequest::new(
            params.policy().into(),
            params.reconnect_window_seconds(),
        );

        let record = StreamRecord::try_from(client.create_live_stream(&request).await?)?;
        info!(
            stream_id = %record.id,
            policy = %params.policy(),
            reconnect_window = params.reconnect_window_seconds(),
            "Live stream created"
        );
        Ok(record)
    }

    async fn retrieve(&self, id: &StreamId) -> Result<StreamRecord> {
        let client = self.client()?;
        StreamRecord::try_from(client.get_live_stream(id.as_str()).await?)
    }

    async fn list(&self) -> Result<Vec<StreamRecord>> {
        let client = self.client()?;
        let mut records = Vec::new();
        let mut seen = HashSet::new();

        for page in 1..=self.max_pages {
            let items = client.list_live_streams(page, self.page_limit).await?;
            let short_page = items.len() < self.page_limit as usize;

            for item in items {
                let id = item.id.clone();
                match StreamRecord::try_from(item) {
                    // Pages can shift between requests; keep the first copy
                    Ok(record) if seen.insert(record.id.clone()) => records.push(record),
                    Ok(_) => {}
                    Err(e) => warn!(stream_id = %id, error = %e, "Skipping malformed live stream"),
                }
            }

            if short_page {
                return Ok(records);
            }
        }

        // Every allowed page was full. A partial catalogue would read as
        // deletions, so only succeed if nothing lies beyond the cap.
        let overflow = client
            .list_live_streams(self.max_pages + 1, self.page_limit)
            .await?;
        if !overflow.is_empty() {
            warn!(
                max_pages = self.max_pages,
                page_limit = self.page_limit,
                "Live stream list exceeds the page cap"
            );
            return Err(Error::upstream(format!(
                "Live stream list truncated at {} pages of {}",
                self.max_pages, self.page_limit
            )));
        }

        Ok(records)
    }

    async fn delete(&self, id: &StreamId) -> Result<()> {
        let client = self.client()?;
        client.delete_live_stream(id.as_str()).await?;
        info!(stream_id = %id, "Live stream deleted");
        Ok(())
    }
}
