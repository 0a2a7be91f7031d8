//! Mux HTTP Client
//!
//! Pure HTTP client for the Mux live-stream API, no dependency on the core
//! domain model.

use std::fmt;
use std::time::Duration;

use reqwest::Client;
use tracing::debug;
use url::Url;

use super::error::{check_response, json_with_limit, MuxError};
use super::types::{CreateLiveStreamRequest, DataResponse, ListResponse, LiveStream};

/// Public Mux API endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.mux.com";

const LIVE_STREAMS_PATH: &str = "/video/v1/live-streams";

/// URL-encode a string for safe use in a path segment or query parameter
fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// Access token pair used for HTTP basic auth
#[derive(Clone)]
pub struct MuxCredentials {
    token_id: String,
    token_secret: String,
}

impl MuxCredentials {
    pub fn new(token_id: impl Into<String>, token_secret: impl Into<String>) -> Self {
        Self {
            token_id: token_id.into(),
            token_secret: token_secret.into(),
        }
    }

    #[must_use]
    pub fn token_id(&self) -> &str {
        &self.token_id
    }
}

impl fmt::Debug for MuxCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxCredentials")
            .field("token_id", &self.token_id)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

/// Mux HTTP Client
///
/// Provides the four live-stream operations the lifecycle core needs:
/// create, retrieve, list (one page at a time) and delete.
#[derive(Clone)]
pub struct MuxClient {
    base_url: String,
    credentials: MuxCredentials,
    client: Client,
}

impl MuxClient {
    /// Create a client against the public Mux endpoint
    pub fn new(credentials: MuxCredentials) -> Result<Self, MuxError> {
        Self::with_base_url(DEFAULT_BASE_URL, credentials, Duration::from_secs(30))
    }

    /// Create a client against a custom endpoint (proxies, tests).
    /// Redirects are not followed.
    pub fn with_base_url(
        base_url: &str,
        credentials: MuxCredentials,
        request_timeout: Duration,
    ) -> Result<Self, MuxError> {
        let parsed = Url::parse(base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MuxError::InvalidConfig(format!(
                "unsupported URL scheme: {}",
                parsed.scheme()
            )));
        }
        if credentials.token_id.is_empty() || credentials.token_secret.is_empty() {
            return Err(MuxError::InvalidConfig("empty access token".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .pool_max_idle_per_host(10)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }

    /// Get the configured endpoint
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self) -> String {
        format!("{}{}", self.base_url, LIVE_STREAMS_PATH)
    }

    fn item_url(&self, id: &str) -> String {
        format!("{}{}/{}", self.base_url, LIVE_STREAMS_PATH, url_encode(id))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.credentials.token_id, Some(&self.credentials.token_secret))
    }

    /// Create a live stream
    pub async fn create_live_stream(
        &self,
        request: &CreateLiveStreamRequest,
    ) -> Result<LiveStream, MuxError> {
        let response = self
            .authorized(self.client.post(self.collection_url()))
            .json(request)
            .send()
            .await?;

        let response = check_response(response, None).await?;
        let created: DataResponse<LiveStream> = json_with_limit(response).await?;

        debug!(stream_id = %created.data.id, "Mux live stream created");
        Ok(created.data)
    }

    /// Retrieve a single live stream
    pub async fn get_live_stream(&self, id: &str) -> Result<LiveStream, MuxError> {
        let response = self
            .authorized(self.client.get(self.item_url(id)))
            .send()
            .await?;

        let response = check_response(response, Some(id)).await?;
        let stream: DataResponse<LiveStream> = json_with_limit(response).await?;
        Ok(stream.data)
    }

    /// List one page of live streams (pages are 1-based)
    pub async fn list_live_streams(&self, page: u32, limit: u32) -> Result<Vec<LiveStream>, MuxError> {
        let response = self
            .authorized(self.client.get(self.collection_url()))
            .query(&[("limit", limit), ("page", page)])
            .send()
            .await?;

        let response = check_response(response, None).await?;
        let list: ListResponse = json_with_limit(response).await?;
        let items = list.into_items();

        debug!(page, limit, count = items.len(), "Mux live streams listed");
        Ok(items)
    }

    /// Delete a live stream
    pub async fn delete_live_stream(&self, id: &str) -> Result<(), MuxError> {
        let response = self
            .authorized(self.client.delete(self.item_url(id)))
            .send()
            .await?;

        check_response(response, Some(id)).await?;
        debug!(stream_id = %id, "Mux live stream deleted");
        Ok(())
    }
}

impl fmt::Debug for MuxClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
