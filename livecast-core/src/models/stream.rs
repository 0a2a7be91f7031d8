use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use livecast_mux::LiveStream;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest reconnect window the platform accepts
pub const MAX_RECONNECT_WINDOW_SECONDS: u32 = 1800;

/// Stream ID assigned by the platform at creation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl StreamId {
    #[must_use]
    pub const fn from_string(id: String) -> Self {
        Self(id)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, used for default titles
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.char_indices().nth(8).map_or(&self.0, |(end, _)| &self.0[..end])
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Secret ingest credential
///
/// `Debug` and `Display` never print the key and the type is not
/// serializable; [`StreamKey::expose`] is the only way to read it.
#[derive(Clone, PartialEq, Eq)]
pub struct StreamKey(String);

impl StreamKey {
    /// Wrap a key; empty keys are rejected
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::upstream("live stream has an empty stream key"));
        }
        Ok(Self(key))
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamKey(<redacted>)")
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Server-reported broadcast state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Idle,
    Active,
    Disconnected,
    /// Anything else the platform reports (e.g. `disabled`)
    #[serde(other)]
    Unknown,
}

impl StreamStatus {
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status {
            "idle" => Self::Idle,
            "active" => Self::Active,
            "disconnected" => Self::Disconnected,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Disconnected => "disconnected",
            Self::Unknown => "unknown",
        }
    }

    /// Whether `self -> to` is a transition the platform normally reports.
    ///
    /// `idle -> disconnected` is not one of them, but observing it is not an
    /// error; callers only use this to pick a log level.
    #[must_use]
    pub const fn is_expected_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Idle, Self::Active)
                | (Self::Active, Self::Idle | Self::Disconnected)
                | (Self::Disconnected, Self::Active | Self::Idle)
        )
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Playback policy of a playback target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackPolicy {
    #[default]
    Public,
    Signed,
}

impl PlaybackPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Signed => "signed",
        }
    }
}

impl FromStr for PlaybackPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Self::Public),
            "signed" => Ok(Self::Signed),
            other => Err(Error::Validation(format!(
                "unknown playback policy '{other}' (expected public or signed)"
            ))),
        }
    }
}

impl fmt::Display for PlaybackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<PlaybackPolicy> for livecast_mux::PlaybackPolicy {
    fn from(policy: PlaybackPolicy) -> Self {
        match policy {
            PlaybackPolicy::Public => Self::Public,
            PlaybackPolicy::Signed => Self::Signed,
        }
    }
}

/// Identifier viewers use to request playback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackTarget {
    pub playback_id: String,
    pub policy: PlaybackPolicy,
}

/// One broadcast entity as reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamRecord {
    pub id: StreamId,
    pub status: StreamStatus,
    #[serde(skip_serializing)]
    pub stream_key: StreamKey,
    pub playback_targets: Vec<PlaybackTarget>,
    pub created_at: DateTime<Utc>,
    /// Present only while `status == Active`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_asset_id: Option<String>,
}

impl StreamRecord {
    /// First playback target, the one players use
    #[must_use]
    pub fn primary_playback_id(&self) -> Option<&str> {
        self.playback_targets.first().map(|t| t.playback_id.as_str())
    }

    #[must_use]
    pub fn has_playback_targets(&self) -> bool {
        !self.playback_targets.is_empty()
    }
}

impl TryFrom<LiveStream> for StreamRecord {
    type Error = Error;

    fn try_from(wire: LiveStream) -> Result<Self> {
        if wire.id.trim().is_empty() {
            return Err(Error::upstream("live stream without an id"));
        }
        let stream_key = StreamKey::new(wire.stream_key)?;
        let created_at = wire.created_at.ok_or_else(|| {
            Error::upstream(format!("live stream {} has no created_at", wire.id))
        })?;

        let status = StreamStatus::parse(&wire.status);
        let playback_targets = wire
            .playback_ids
            .into_iter()
            .filter_map(|pb| {
                let policy = match pb.policy {
                    livecast_mux::PlaybackPolicy::Public => PlaybackPolicy::Public,
                    livecast_mux::PlaybackPolicy::Signed => PlaybackPolicy::Signed,
                    livecast_mux::PlaybackPolicy::Other => {
                        tracing::debug!(playback_id = %pb.id, "Skipping playback ID with unsupported policy");
                        return None;
                    }
                };
                Some(PlaybackTarget {
                    playback_id: pb.id,
                    policy,
                })
            })
            .collect();

        let active_asset_id = wire
            .active_asset_id
            .filter(|_| status == StreamStatus::Active);

        Ok(Self {
            id: StreamId(wire.id),
            status,
            stream_key,
            playback_targets,
            created_at,
            active_asset_id,
        })
    }
}

/// Validated creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateStreamParams {
    policy: PlaybackPolicy,
    reconnect_window_seconds: u32,
}

impl CreateStreamParams {
    /// Validate parameters before any network call
    pub fn new(policy: PlaybackPolicy, reconnect_window_seconds: i64) -> Result<Self> {
        if reconnect_window_seconds <= 0 {
            return Err(Error::Validation(format!(
                "reconnect window must be positive, got {reconnect_window_seconds}"
            )));
        }
        let window = u32::try_from(reconnect_window_seconds)
            .ok()
            .filter(|w| *w <= MAX_RECONNECT_WINDOW_SECONDS)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "reconnect window must be at most {MAX_RECONNECT_WINDOW_SECONDS} seconds, got {reconnect_window_seconds}"
                ))
            })?;

        Ok(Self {
            policy,
            reconnect_window_seconds: window,
        })
    }

    #[must_use]
    pub const fn policy(&self) -> PlaybackPolicy {
        self.policy
    }

    #[must_use]
    pub const fn reconnect_window_seconds(&self) -> u32 {
        self.reconnect_window_seconds
    }
}

impl Default for CreateStreamParams {
    fn default() -> Self {
        Self {
            policy: PlaybackPolicy::Public,
            reconnect_window_seconds: 60,
        }
    }
}
