mod listing;
mod stream;

pub use listing::{demo_catalog, DemoData, StreamEntry};
pub use stream::{
    CreateStreamParams, PlaybackPolicy, PlaybackTarget, StreamId, StreamKey, StreamRecord,
    StreamStatus, MAX_RECONNECT_WINDOW_SECONDS,
};
