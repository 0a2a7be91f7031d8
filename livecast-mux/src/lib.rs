// Livecast Mux Client
//
// Pure HTTP client for the Mux Video live-stream API.
// The client speaks Mux's wire format only; it knows nothing about snapshots,
// polling or view state. livecast-core adapts it to the `StreamRegistryClient`
// trait and converts the wire types into domain records.
//
// Architecture:
// - livecast-mux: HTTP client + wire types (this crate)
// - livecast-core/registry: adapter calling this client
// - livecast-core/poller + coordinator: state that sits on top of the adapter

pub mod error;
pub mod types;

mod client;

pub use client::{MuxClient, MuxCredentials, DEFAULT_BASE_URL};
pub use error::MuxError;
pub use reqwest::StatusCode;
pub use types::{
    CreateLiveStreamRequest, LiveStream, NewAssetSettings, PlaybackId, PlaybackPolicy,
};
