//! Mux HTTP API Types
//!
//! Wire types for the `/video/v1/live-streams` endpoints. These mirror the JSON
//! the platform sends and are converted into domain records by livecast-core.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Envelope around single-object responses: `{"data": {...}}`
#[derive(Debug, Deserialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Envelope around list responses. Mux omits `data` (or sends null) for an
/// empty collection, so both decode to an empty page.
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub data: Option<Vec<LiveStream>>,
}

impl ListResponse {
    #[must_use]
    pub fn into_items(self) -> Vec<LiveStream> {
        self.data.unwrap_or_default()
    }
}

/// Playback policy of a playback ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPolicy {
    Public,
    Signed,
    /// Policies this client does not model (e.g. `drm`)
    #[serde(other)]
    Other,
}

impl PlaybackPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Signed => "signed",
            Self::Other => "other",
        }
    }
}

/// Playback ID attached to a live stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackId {
    pub id: String,
    pub policy: PlaybackPolicy,
}

/// Live stream object as returned by Mux
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveStream {
    pub id: String,
    #[serde(default)]
    pub stream_key: String,
    /// `idle`, `active`, `disconnected`, ... kept as text; the core parses it
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub playback_ids: Vec<PlaybackId>,
    #[serde(default, deserialize_with = "deserialize_unix_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_asset_id: Option<String>,
    #[serde(default)]
    pub reconnect_window: Option<f64>,
    #[serde(default)]
    pub recent_asset_ids: Vec<String>,
}

/// Settings applied to the asset recorded from a live stream
#[derive(Debug, Clone, Serialize)]
pub struct NewAssetSettings {
    pub playback_policy: Vec<PlaybackPolicy>,
}

/// Body of `POST /video/v1/live-streams`
#[derive(Debug, Clone, Serialize)]
pub struct CreateLiveStreamRequest {
    pub playback_policy: Vec<PlaybackPolicy>,
    pub reconnect_window: u32,
    pub new_asset_settings: NewAssetSettings,
}

impl CreateLiveStreamRequest {
    /// Build a request that applies `policy` to both the live playback ID and
    /// the recorded asset.
    #[must_use]
    pub fn new(policy: PlaybackPolicy, reconnect_window: u32) -> Self {
        Self {
            playback_policy: vec![policy],
            reconnect_window,
            new_asset_settings: NewAssetSettings {
                playback_policy: vec![policy],
            },
        }
    }
}

/// Mux encodes timestamps as a string of unix seconds; accept bare numbers too.
fn deserialize_unix_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    let secs = match Option::<Raw>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(Raw::Number(n)) => n,
        Some(Raw::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid unix timestamp: {s}")))?,
    };

    Utc.timestamp_opt(secs, 0)
        .single()
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {secs}")))
}
