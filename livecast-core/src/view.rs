//! Stream view model
//!
//! Pure projections from registry records and grid entries to what a
//! presentation layer renders. Nothing here touches the network or mutates a
//! snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{demo_catalog, StreamEntry, StreamId, StreamRecord, StreamStatus};

/// Live means viewable: broadcasting and with something to play
#[must_use]
pub fn is_live(record: &StreamRecord) -> bool {
    record.status == StreamStatus::Active && record.has_playback_targets()
}

#[must_use]
pub const fn is_coming_soon(entry: &StreamEntry) -> bool {
    matches!(entry, StreamEntry::Placeholder(_))
}

/// Badge color for a broadcast status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Green,
    Amber,
    Red,
    Neutral,
}

impl StatusColor {
    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::Green => "#10b981",
            Self::Amber => "#f59e0b",
            Self::Red => "#ef4444",
            Self::Neutral => "#9333ea",
        }
    }
}

#[must_use]
pub const fn status_color(status: StreamStatus) -> StatusColor {
    match status {
        StreamStatus::Active => StatusColor::Green,
        StreamStatus::Idle => StatusColor::Amber,
        StreamStatus::Disconnected => StatusColor::Red,
        StreamStatus::Unknown => StatusColor::Neutral,
    }
}

/// Title shown when a stream has none of its own
#[must_use]
pub fn default_title(id: &StreamId) -> String {
    format!("Stream {}", id.short())
}

/// Encoder credentials, handed out only on explicit request
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestInfo {
    pub rtmp_url: String,
    pub stream_key: String,
}

impl fmt::Debug for IngestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestInfo")
            .field("rtmp_url", &self.rtmp_url)
            .field("stream_key", &"<redacted>")
            .finish()
    }
}

#[must_use]
pub fn ingest_info(record: &StreamRecord, rtmp_url: &str) -> IngestInfo {
    IngestInfo {
        rtmp_url: rtmp_url.to_string(),
        stream_key: record.stream_key.expose().to_string(),
    }
}

/// Grid tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamCard {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StreamStatus>,
    pub status_color: &'static str,
    pub is_live: bool,
    pub is_coming_soon: bool,
    /// Only set when the card can actually play
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewers: Option<u32>,
    pub tags: Vec<String>,
}

impl StreamCard {
    #[must_use]
    pub fn from_entry(entry: &StreamEntry) -> Self {
        match entry {
            StreamEntry::Real(record) => {
                let live = is_live(record);
                Self {
                    id: record.id.to_string(),
                    title: default_title(&record.id),
                    username: None,
                    description: None,
                    status: Some(record.status),
                    status_color: status_color(record.status).hex(),
                    is_live: live,
                    is_coming_soon: false,
                    playback_id: record
                        .primary_playback_id()
                        .filter(|_| live)
                        .map(str::to_string),
                    viewers: None,
                    tags: Vec::new(),
                }
            }
            StreamEntry::Placeholder(demo) => Self {
                id: demo.id(),
                title: demo.title.clone(),
                username: Some(demo.username.clone()),
                description: Some(demo.description.clone()),
                status: None,
                status_color: StatusColor::Neutral.hex(),
                is_live: false,
                is_coming_soon: true,
                playback_id: None,
                viewers: Some(demo.viewers),
                tags: demo.tags.clone(),
            },
        }
    }
}

/// Detail page of one registry stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDetail {
    pub id: StreamId,
    pub title: String,
    pub status: StreamStatus,
    pub status_color: &'static str,
    pub is_live: bool,
    /// The player is replaced by an offline notice
    pub is_offline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_asset_id: Option<String>,
    /// The last refresh failed; data shown is the last good copy
    pub stale: bool,
}

impl StreamDetail {
    #[must_use]
    pub fn from_record(record: &StreamRecord, stale: bool) -> Self {
        let live = is_live(record);
        Self {
            id: record.id.clone(),
            title: default_title(&record.id),
            status: record.status,
            status_color: status_color(record.status).hex(),
            is_live: live,
            is_offline: !live,
            playback_id: record.primary_playback_id().map(str::to_string),
            created_at: record.created_at,
            active_asset_id: record.active_asset_id.clone(),
            stale,
        }
    }
}

/// Grid contents: registry streams first, then the demo catalogue
#[must_use]
pub fn grid_entries(records: &[StreamRecord], demo_enabled: bool) -> Vec<StreamEntry> {
    let mut entries: Vec<StreamEntry> = records.iter().cloned().map(StreamEntry::Real).collect();
    if demo_enabled {
        entries.extend(demo_catalog().into_iter().map(StreamEntry::Placeholder));
    }
    entries
}
