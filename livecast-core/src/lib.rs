pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod models;
pub mod poller;
pub mod registry;
pub mod view;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use coordinator::{CreateFlowState, CreateOutcome, DeleteOutcome, LifecycleCoordinator};
pub use error::{Error, Result};
pub use models::{
    CreateStreamParams, DemoData, PlaybackPolicy, PlaybackTarget, StreamEntry, StreamId,
    StreamKey, StreamRecord, StreamStatus,
};
pub use poller::{
    CycleOutcome, PollScope, PollerHandle, ScopeHealth, StatusTransition, StreamSnapshot,
    StreamStatusPoller, TransitionBatch,
};
pub use registry::{MuxRegistry, StreamRegistryClient};
