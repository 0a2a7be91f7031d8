//! Lifecycle coordinator
//!
//! Runs the create and delete flows for one session and keeps the attached
//! poller scopes in line with what the registry confirmed:
//! - at most one create is in flight; a second trigger is ignored
//! - a created stream is merged into every attached list scope
//! - a deleted stream is removed from every attached scope before
//!   `delete_stream` returns

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{CreateStreamParams, PlaybackPolicy, StreamId, StreamRecord};
use crate::poller::{PollScope, StreamStatusPoller, WeakPoller};
use crate::registry::StreamRegistryClient;

/// Create flow state. Failure is not a resting state: the error is returned
/// and the flow is back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateFlowState {
    Idle,
    Creating,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(StreamRecord),
    /// Another create was in flight; nothing was sent to the registry
    AlreadyInFlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The registry no longer knew the id
    AlreadyGone,
    /// A delete for the same id was in flight
    AlreadyInFlight,
}

/// Resets the create flow however the call ends, including cancellation
struct CreatingGuard<'a>(&'a Mutex<CreateFlowState>);

impl Drop for CreatingGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock() = CreateFlowState::Idle;
    }
}

struct DeletingGuard<'a> {
    deleting: &'a Mutex<HashSet<StreamId>>,
    id: StreamId,
}

impl Drop for DeletingGuard<'_> {
    fn drop(&mut self) {
        self.deleting.lock().remove(&self.id);
    }
}

pub struct LifecycleCoordinator {
    registry: Arc<dyn StreamRegistryClient>,
    create_state: Mutex<CreateFlowState>,
    deleting: Mutex<HashSet<StreamId>>,
    scopes: Mutex<Vec<WeakPoller>>,
}

impl LifecycleCoordinator {
    #[must_use]
    pub fn new(registry: Arc<dyn StreamRegistryClient>) -> Self {
        Self {
            registry,
            create_state: Mutex::new(CreateFlowState::Idle),
            deleting: Mutex::new(HashSet::new()),
            scopes: Mutex::new(Vec::new()),
        }
    }

    /// Keep `poller` in line with creates and deletes made here. Only a weak
    /// reference is held; a dropped or cancelled poller is forgotten.
    pub fn attach(&self, poller: &StreamStatusPoller) {
        let mut scopes = self.scopes.lock();
        scopes.retain(|s| s.upgrade().is_some());
        scopes.push(poller.downgrade());
    }

    #[must_use]
    pub fn create_state(&self) -> CreateFlowState {
        *self.create_state.lock()
    }

    /// Validate raw parameters, then create
    pub async fn create_with(
        &self,
        policy: PlaybackPolicy,
        reconnect_window_seconds: i64,
    ) -> Result<CreateOutcome> {
        let params = CreateStreamParams::new(policy, reconnect_window_seconds)?;
        self.create_stream(params).await
    }

    /// Create one stream and merge it into the attached list scopes
    pub async fn create_stream(&self, params: CreateStreamParams) -> Result<CreateOutcome> {
        {
            let mut state = self.create_state.lock();
            if *state == CreateFlowState::Creating {
                debug!("Create already in flight, ignoring");
                return Ok(CreateOutcome::AlreadyInFlight);
            }
            *state = CreateFlowState::Creating;
        }
        let _creating = CreatingGuard(&self.create_state);

        let record = match self.registry.create(params).await {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Stream creation failed");
                return Err(e);
            }
        };

        let merged = self.for_each_scope(|poller| {
            if *poller.scope() == PollScope::List {
                poller.merge(record.clone());
                true
            } else {
                false
            }
        });
        info!(stream_id = %record.id, scopes = merged, "Stream created");

        Ok(CreateOutcome::Created(record))
    }

    /// Delete one stream and drop it from every attached scope
    ///
    /// `NotFound` from the registry counts as success.
    pub async fn delete_stream(&self, id: &StreamId) -> Result<DeleteOutcome> {
        if !self.deleting.lock().insert(id.clone()) {
            debug!(stream_id = %id, "Delete already in flight, ignoring");
            return Ok(DeleteOutcome::AlreadyInFlight);
        }
        let _deleting = DeletingGuard {
            deleting: &self.deleting,
            id: id.clone(),
        };

        let outcome = match self.registry.delete(id).await {
            Ok(()) => DeleteOutcome::Deleted,
            Err(Error::NotFound(_)) => DeleteOutcome::AlreadyGone,
            Err(e) => {
                warn!(stream_id = %id, error = %e, "Stream deletion failed");
                return Err(e);
            }
        };

        let removed = self.for_each_scope(|poller| poller.remove(id));
        info!(stream_id = %id, ?outcome, scopes = removed, "Stream removed");

        Ok(outcome)
    }

    /// Run `f` on every live attached poller, pruning dead ones. Returns how
    /// many calls reported `true`.
    fn for_each_scope(&self, mut f: impl FnMut(&StreamStatusPoller) -> bool) -> usize {
        let mut scopes = self.scopes.lock();
        let mut hits = 0;
        scopes.retain(|weak| match weak.upgrade() {
            Some(poller) => {
                if f(&poller) {
                    hits += 1;
                }
                true
            }
            None => false,
        });
        hits
    }
}

impl std::fmt::Debug for LifecycleCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleCoordinator")
            .field("create_state", &self.create_state())
            .field("deleting", &self.deleting.lock().len())
            .field("scopes", &self.scopes.lock().len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::PollingConfig;
    use crate::models::StreamStatus;
    use crate::test_helpers::{record, FakeRegistry};

    fn setup() -> (Arc<FakeRegistry>, LifecycleCoordinator, StreamStatusPoller) {
        let registry = Arc::new(FakeRegistry::new());
        let coordinator = LifecycleCoordinator::new(registry.clone());
        let poller = StreamStatusPoller::list(registry.clone(), &PollingConfig::default());
        coordinator.attach(&poller);
        (registry, coordinator, poller)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_creates_make_one_registry_call() {
        let (registry, coordinator, _poller) = setup();
        let coordinator = Arc::new(coordinator);
        let gate = registry.hold_create();

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.create_stream(CreateStreamParams::default()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(coordinator.create_state(), CreateFlowState::Creating);

        let second = coordinator.create_stream(CreateStreamParams::default()).await.unwrap();
        assert_eq!(second, CreateOutcome::AlreadyInFlight);

        gate.release();
        let first = first.await.unwrap().unwrap();
        assert!(matches!(first, CreateOutcome::Created(_)));
        assert_eq!(registry.create_calls(), 1);
        assert_eq!(coordinator.create_state(), CreateFlowState::Idle);
    }

    #[tokio::test]
    async fn test_created_stream_is_merged_into_list_scope() {
        let (registry, coordinator, poller) = setup();
        registry.push_create(Ok(record("fresh", StreamStatus::Idle)));

        let outcome = coordinator
            .create_with(PlaybackPolicy::Public, 60)
            .await
            .unwrap();

        let CreateOutcome::Created(created) = outcome else {
            panic!("expected a created stream");
        };
        assert_eq!(poller.snapshot().get(&created.id), Some(&created));
        assert_eq!(
            registry.last_create().map(|p| p.reconnect_window_seconds()),
            Some(60)
        );
    }

    #[tokio::test]
    async fn test_failed_create_returns_to_idle() {
        let (registry, coordinator, poller) = setup();
        registry.push_create(Err(Error::upstream("HTTP 500")));

        let err = coordinator.create_stream(CreateStreamParams::default()).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(coordinator.create_state(), CreateFlowState::Idle);
        assert!(poller.snapshot().is_empty());

        // Retry is allowed
        let retry = coordinator.create_stream(CreateStreamParams::default()).await.unwrap();
        assert!(matches!(retry, CreateOutcome::Created(_)));
    }

    #[tokio::test]
    async fn test_invalid_params_never_reach_registry() {
        let (registry, coordinator, _poller) = setup();

        let err = coordinator.create_with(PlaybackPolicy::Signed, 0).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(registry.create_calls(), 0);
        assert_eq!(coordinator.create_state(), CreateFlowState::Idle);
    }

    #[tokio::test]
    async fn test_delete_removes_from_every_scope() {
        let (registry, coordinator, list) = setup();
        registry.push_list(Ok(vec![record("a", StreamStatus::Idle), record("x", StreamStatus::Active)]));
        list.refresh().await.unwrap();

        registry.push_retrieve(Ok(record("x", StreamStatus::Active)));
        let detail = StreamStatusPoller::detail(StreamId::from("x"), registry.clone(), &PollingConfig::default());
        detail.refresh().await.unwrap();
        coordinator.attach(&detail);

        let outcome = coordinator.delete_stream(&StreamId::from("x")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::Deleted);
        assert!(!list.snapshot().contains(&StreamId::from("x")));
        assert!(list.snapshot().contains(&StreamId::from("a")));
        assert!(detail.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_delete_not_found_is_success() {
        let (registry, coordinator, list) = setup();
        registry.push_list(Ok(vec![record("x", StreamStatus::Idle)]));
        list.refresh().await.unwrap();
        registry.push_delete(Err(Error::NotFound("x".to_string())));

        let outcome = coordinator.delete_stream(&StreamId::from("x")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome::AlreadyGone);
        assert!(list.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_record() {
        let (registry, coordinator, list) = setup();
        registry.push_list(Ok(vec![record("x", StreamStatus::Idle)]));
        list.refresh().await.unwrap();
        registry.push_delete(Err(Error::upstream("HTTP 502")));

        assert!(coordinator.delete_stream(&StreamId::from("x")).await.is_err());
        assert!(list.snapshot().contains(&StreamId::from("x")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_deletes_collapse() {
        let (registry, coordinator, _list) = setup();
        let coordinator = Arc::new(coordinator);
        let gate = registry.hold_delete();

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.delete_stream(&StreamId::from("x")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = coordinator.delete_stream(&StreamId::from("x")).await.unwrap();
        assert_eq!(second, DeleteOutcome::AlreadyInFlight);

        gate.release();
        assert_eq!(first.await.unwrap().unwrap(), DeleteOutcome::Deleted);
        assert_eq!(registry.delete_calls(), 1);
    }

    #[tokio::test]
    async fn test_dropped_scopes_are_pruned() {
        let (registry, coordinator, list) = setup();
        drop(list);

        coordinator.create_stream(CreateStreamParams::default()).await.unwrap();
        assert_eq!(coordinator.scopes.lock().len(), 0);
        assert_eq!(registry.create_calls(), 1);
    }
}
