//! Test utilities shared by unit tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::models::{
    CreateStreamParams, PlaybackPolicy, PlaybackTarget, StreamId, StreamKey, StreamRecord,
    StreamStatus,
};
use crate::registry::StreamRegistryClient;

/// A registry record with one public playback target
pub fn record(id: &str, status: StreamStatus) -> StreamRecord {
    StreamRecord {
        id: StreamId::from(id),
        status,
        stream_key: StreamKey::new(format!("key-{id}")).unwrap(),
        playback_targets: vec![PlaybackTarget {
            playback_id: format!("pb-{id}"),
            policy: PlaybackPolicy::Public,
        }],
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        active_asset_id: None,
    }
}

/// Blocks registry calls until released
pub struct Gate(Arc<Semaphore>);

impl Gate {
    pub fn release(&self) {
        self.0.close();
    }
}

struct Call<T> {
    responses: Mutex<VecDeque<Result<T>>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    count: AtomicUsize,
}

impl<T> Call<T> {
    fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            gate: Mutex::new(None),
            count: AtomicUsize::new(0),
        }
    }

    fn hold(&self) -> Gate {
        let semaphore = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(Arc::clone(&semaphore));
        Gate(semaphore)
    }

    async fn enter(&self) -> Option<Result<T>> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            // Closed means released
            let _ = gate.acquire().await;
        }
        self.responses.lock().pop_front()
    }
}

/// Scripted in-memory registry
///
/// Each operation answers from its queue, falling back to a default once
/// the queue is empty: `list` is empty, `retrieve` is `NotFound`, `create`
/// returns a fresh idle stream and `delete` succeeds.
pub struct FakeRegistry {
    create: Call<StreamRecord>,
    retrieve: Call<StreamRecord>,
    list: Call<Vec<StreamRecord>>,
    delete: Call<()>,
    last_create: Mutex<Option<CreateStreamParams>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self {
            create: Call::new(),
            retrieve: Call::new(),
            list: Call::new(),
            delete: Call::new(),
            last_create: Mutex::new(None),
        }
    }

    pub fn push_create(&self, response: Result<StreamRecord>) {
        self.create.responses.lock().push_back(response);
    }

    pub fn push_retrieve(&self, response: Result<StreamRecord>) {
        self.retrieve.responses.lock().push_back(response);
    }

    pub fn push_list(&self, response: Result<Vec<StreamRecord>>) {
        self.list.responses.lock().push_back(response);
    }

    pub fn push_delete(&self, response: Result<()>) {
        self.delete.responses.lock().push_back(response);
    }

    pub fn hold_create(&self) -> Gate {
        self.create.hold()
    }

    pub fn hold_list(&self) -> Gate {
        self.list.hold()
    }

    pub fn hold_delete(&self) -> Gate {
        self.delete.hold()
    }

    pub fn create_calls(&self) -> usize {
        self.create.count.load(Ordering::SeqCst)
    }

    pub fn retrieve_calls(&self) -> usize {
        self.retrieve.count.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list.count.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete.count.load(Ordering::SeqCst)
    }

    pub fn last_create(&self) -> Option<CreateStreamParams> {
        *self.last_create.lock()
    }
}

#[async_trait]
impl StreamRegistryClient for FakeRegistry {
    async fn create(&self, params: CreateStreamParams) -> Result<StreamRecord> {
        *self.last_create.lock() = Some(params);
        let n = self.create.count.load(Ordering::SeqCst) + 1;
        self.create
            .enter()
            .await
            .unwrap_or_else(|| Ok(record(&format!("created-{n}"), StreamStatus::Idle)))
    }

    async fn retrieve(&self, id: &StreamId) -> Result<StreamRecord> {
        self.retrieve
            .enter()
            .await
            .unwrap_or_else(|| Err(crate::Error::NotFound(id.to_string())))
    }

    async fn list(&self) -> Result<Vec<StreamRecord>> {
        self.list.enter().await.unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn delete(&self, _id: &StreamId) -> Result<()> {
        self.delete.enter().await.unwrap_or(Ok(()))
    }
}
