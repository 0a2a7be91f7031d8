//! Stream status poller
//!
//! Keeps one scope (the whole catalogue or a single stream) close to the
//! registry by refetching on a fixed interval. Each poller owns its
//! [`SnapshotStore`]; readers get an `Arc<StreamSnapshot>` and subscribe to
//! [`TransitionBatch`] events, one per cycle that changed a status.
//!
//! Failure handling:
//! - `Error::Upstream`: keep the last snapshot, mark the scope stale, wait
//!   for the next tick
//! - `Error::Configuration`: mark the scope blocked and stop the loop
//! - `Error::NotFound` on a detail scope: the stream is gone, the scope
//!   becomes empty

mod snapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub use snapshot::{ApplyOutcome, CycleTicket, ScopeHealth, SnapshotStore, StreamSnapshot};

use crate::config::PollingConfig;
use crate::error::{Error, Result};
use crate::models::{StreamId, StreamRecord, StreamStatus};
use crate::registry::StreamRegistryClient;

/// What a poller keeps fresh
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PollScope {
    List,
    Detail(StreamId),
}

impl PollScope {
    /// Refresh period for this scope
    #[must_use]
    pub const fn interval(&self, config: &PollingConfig) -> Duration {
        match self {
            Self::List => Duration::from_secs(config.list_interval_seconds),
            Self::Detail(_) => Duration::from_secs(config.detail_interval_seconds),
        }
    }
}

impl std::fmt::Display for PollScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List => f.write_str("list"),
            Self::Detail(id) => write!(f, "detail:{id}"),
        }
    }
}

/// A stream's status changed between two applied snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    pub id: StreamId,
    pub from: StreamStatus,
    pub to: StreamStatus,
    pub at: DateTime<Utc>,
}

/// Every transition observed by one applied cycle, in record order
///
/// A cycle is published as a single message so a burst of changes takes one
/// slot in the channel.
pub type TransitionBatch = Arc<[StatusTransition]>;

/// Result of one poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Snapshot replaced; `transitions` events were published
    Applied { transitions: usize },
    /// Another cycle was still in flight, nothing was requested
    Skipped,
    /// A newer cycle finished first; this result was discarded
    Stale,
    /// Upstream failure; the previous snapshot is kept
    Failed,
    /// The poller was torn down; nothing was applied
    Cancelled,
}

struct PollerInner {
    scope: PollScope,
    registry: Arc<dyn StreamRegistryClient>,
    store: SnapshotStore,
    events: broadcast::Sender<TransitionBatch>,
    period: Duration,
    in_flight: AtomicBool,
    started: AtomicBool,
    cancel_token: CancellationToken,
}

/// Clears the in-flight flag however the cycle ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Periodic status poller for one scope
///
/// Cloning is cheap and every clone drives the same snapshot.
#[derive(Clone)]
pub struct StreamStatusPoller {
    inner: Arc<PollerInner>,
}

impl StreamStatusPoller {
    #[must_use]
    pub fn new(
        scope: PollScope,
        registry: Arc<dyn StreamRegistryClient>,
        period: Duration,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            inner: Arc::new(PollerInner {
                scope,
                registry,
                store: SnapshotStore::new(),
                events,
                period: period.max(Duration::from_millis(1)),
                in_flight: AtomicBool::new(false),
                started: AtomicBool::new(false),
                cancel_token: CancellationToken::new(),
            }),
        }
    }

    /// Poller for the whole catalogue
    #[must_use]
    pub fn list(registry: Arc<dyn StreamRegistryClient>, config: &PollingConfig) -> Self {
        let scope = PollScope::List;
        let period = scope.interval(config);
        Self::new(scope, registry, period, config.event_capacity)
    }

    /// Poller for a single stream
    #[must_use]
    pub fn detail(
        id: StreamId,
        registry: Arc<dyn StreamRegistryClient>,
        config: &PollingConfig,
    ) -> Self {
        let scope = PollScope::Detail(id);
        let period = scope.interval(config);
        Self::new(scope, registry, period, config.event_capacity)
    }

    #[must_use]
    pub fn scope(&self) -> &PollScope {
        &self.inner.scope
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<StreamSnapshot> {
        self.inner.store.current()
    }

    #[must_use]
    pub fn health(&self) -> ScopeHealth {
        self.inner.store.health()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionBatch> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel_token.is_cancelled()
    }

    /// Start the refresh loop. The first cycle runs immediately.
    ///
    /// A poller runs at most one loop; starting it again returns a handle
    /// that can still tear it down but owns no task.
    pub fn start(&self) -> PollerHandle {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            warn!(scope = %self.inner.scope, "Poller already started");
            return PollerHandle {
                inner: Arc::clone(&self.inner),
                task: None,
            };
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.run().await });
        info!(
            scope = %self.inner.scope,
            interval = ?self.inner.period,
            "Poller started"
        );

        PollerHandle {
            inner: Arc::clone(&self.inner),
            task: Some(task),
        }
    }

    /// Run one cycle now, outside the schedule
    ///
    /// Only `Error::Configuration` (or another non-retryable error) is
    /// returned; upstream failures are folded into [`ScopeHealth`].
    pub async fn refresh(&self) -> Result<CycleOutcome> {
        self.inner.cycle().await
    }

    /// Insert a record confirmed by the registry outside a poll cycle
    pub fn merge(&self, record: StreamRecord) {
        debug!(scope = %self.inner.scope, stream_id = %record.id, "Merging stream into snapshot");
        self.inner.store.merge(record);
    }

    /// Drop a record the registry has deleted. Returns whether it was present.
    pub fn remove(&self, id: &StreamId) -> bool {
        let removed = self.inner.store.remove(id);
        debug!(scope = %self.inner.scope, stream_id = %id, removed, "Removing stream from snapshot");
        removed
    }

    /// Non-owning reference, for holders that must not keep the poller alive
    #[must_use]
    pub fn downgrade(&self) -> WeakPoller {
        WeakPoller(Arc::downgrade(&self.inner))
    }
}

impl std::fmt::Debug for StreamStatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamStatusPoller")
            .field("scope", &self.inner.scope)
            .field("period", &self.inner.period)
            .field("cancelled", &self.inner.cancel_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Weak counterpart of [`StreamStatusPoller`]
#[derive(Clone)]
pub struct WeakPoller(Weak<PollerInner>);

impl WeakPoller {
    #[must_use]
    pub fn upgrade(&self) -> Option<StreamStatusPoller> {
        self.0
            .upgrade()
            .filter(|inner| !inner.cancel_token.is_cancelled())
            .map(|inner| StreamStatusPoller { inner })
    }
}

impl PollerInner {
    async fn run(self: Arc<Self>) {
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    debug!(scope = %self.scope, "Poller shutting down");
                    return;
                }
                _ = timer.tick() => {
                    match self.cycle().await {
                        Ok(outcome) => trace!(scope = %self.scope, ?outcome, "Poll cycle finished"),
                        Err(e) => {
                            error!(scope = %self.scope, error = %e, "Polling stopped");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn cycle(&self) -> Result<CycleOutcome> {
        if self.cancel_token.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(scope = %self.scope, "Previous poll still in flight, skipping");
            return Ok(CycleOutcome::Skipped);
        }
        let _in_flight = InFlight(&self.in_flight);

        let ticket = self.store.begin_cycle();
        let fetched = tokio::select! {
            biased;
            () = self.cancel_token.cancelled() => return Ok(CycleOutcome::Cancelled),
            result = self.fetch() => result,
        };

        match fetched {
            Ok(records) => Ok(self.apply(ticket, records)),
            Err(Error::NotFound(id)) if matches!(self.scope, PollScope::Detail(_)) => {
                info!(scope = %self.scope, stream_id = %id, "Stream no longer exists");
                Ok(self.apply(ticket, Vec::new()))
            }
            Err(e) if e.is_transient() || e.is_not_found() => {
                warn!(scope = %self.scope, cycle = ticket.seq(), error = %e, "Poll failed, keeping last snapshot");
                self.store.fail(ticket, &e.to_string());
                Ok(CycleOutcome::Failed)
            }
            Err(e) => {
                let message = match &e {
                    Error::Configuration(msg) => msg.clone(),
                    other => other.to_string(),
                };
                self.store.block(&message);
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<StreamRecord>> {
        match &self.scope {
            PollScope::List => self.registry.list().await,
            PollScope::Detail(id) => self.registry.retrieve(id).await.map(|r| vec![r]),
        }
    }

    fn apply(&self, ticket: CycleTicket, records: Vec<StreamRecord>) -> CycleOutcome {
        match self.store.apply(ticket, records) {
            ApplyOutcome::Applied { transitions } => {
                for t in &transitions {
                    if t.from.is_expected_transition(t.to) {
                        info!(stream_id = %t.id, from = %t.from, to = %t.to, "Stream status changed");
                    } else {
                        warn!(stream_id = %t.id, from = %t.from, to = %t.to, "Unusual stream status change");
                    }
                }
                let count = transitions.len();
                if count > 0 {
                    // No subscribers is fine
                    let _ = self.events.send(TransitionBatch::from(transitions));
                }
                CycleOutcome::Applied { transitions: count }
            }
            ApplyOutcome::Stale => {
                debug!(scope = %self.scope, cycle = ticket.seq(), "Discarding out-of-order poll result");
                CycleOutcome::Stale
            }
            ApplyOutcome::Closed => CycleOutcome::Cancelled,
        }
    }

    fn shutdown(&self) {
        if !self.cancel_token.is_cancelled() {
            debug!(scope = %self.scope, "Tearing down poller");
        }
        // Close first so a result racing the cancellation is rejected
        self.store.close();
        self.cancel_token.cancel();
    }
}

/// Cancellation handle returned by [`StreamStatusPoller::start`]
///
/// Dropping the handle tears the poller down as well.
pub struct PollerHandle {
    inner: Arc<PollerInner>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop polling. In-flight results are discarded and no further registry
    /// calls are made.
    pub fn cancel(self) {
        drop(self);
    }

    /// Stop polling and wait for the loop to exit
    pub async fn shutdown(mut self) {
        self.inner.shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    error!(scope = %self.inner.scope, "Poller task panicked");
                }
            }
        }
    }

    /// Whether the loop has exited (cancelled or stopped on a fatal error)
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{record, FakeRegistry};

    fn config() -> PollingConfig {
        PollingConfig {
            list_interval_seconds: 30,
            detail_interval_seconds: 5,
            event_capacity: 16,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_idle_active_emits_one_transition() {
        let registry = Arc::new(FakeRegistry::new());
        registry.push_list(Ok(vec![record("s1", StreamStatus::Idle)]));
        registry.push_list(Ok(vec![record("s1", StreamStatus::Idle)]));
        registry.push_list(Ok(vec![record("s1", StreamStatus::Active)]));

        let poller = StreamStatusPoller::list(registry.clone(), &config());
        let mut events = poller.subscribe();

        for _ in 0..3 {
            poller.refresh().await.unwrap();
        }

        let batch = events.try_recv().unwrap();
        assert_eq!(batch.len(), 1);
        let event = &batch[0];
        assert_eq!(event.id, StreamId::from("s1"));
        assert_eq!(event.from, StreamStatus::Idle);
        assert_eq!(event.to, StreamStatus::Active);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_failure_keeps_snapshot() {
        let registry = Arc::new(FakeRegistry::new());
        registry.push_list(Ok(vec![record("s1", StreamStatus::Active)]));
        registry.push_list(Err(Error::upstream("HTTP 503")));

        let poller = StreamStatusPoller::list(registry.clone(), &config());
        poller.refresh().await.unwrap();
        let before = poller.snapshot();

        assert_eq!(poller.refresh().await.unwrap(), CycleOutcome::Failed);
        assert!(Arc::ptr_eq(&before, &poller.snapshot()));
        assert!(poller.health().is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_transitions_is_not_lost() {
        let ids: Vec<String> = (0..100).map(|n| format!("s{n:03}")).collect();
        let registry = Arc::new(FakeRegistry::new());
        registry.push_list(Ok(ids.iter().map(|id| record(id, StreamStatus::Idle)).collect()));
        registry.push_list(Ok(ids.iter().map(|id| record(id, StreamStatus::Active)).collect()));

        // Far fewer slots than streams changing at once
        let poller = StreamStatusPoller::list(registry.clone(), &config());
        let mut events = poller.subscribe();

        poller.refresh().await.unwrap();
        assert_eq!(
            poller.refresh().await.unwrap(),
            CycleOutcome::Applied { transitions: 100 }
        );

        let batch = events.try_recv().unwrap();
        assert_eq!(batch.len(), 100);
        assert!(batch.iter().all(|t| t.from == StreamStatus::Idle && t.to == StreamStatus::Active));
        assert_eq!(batch[0].id, StreamId::from("s000"));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_cycle_publishes_nothing() {
        let registry = Arc::new(FakeRegistry::new());
        registry.push_list(Ok(vec![record("s1", StreamStatus::Idle)]));
        registry.push_list(Ok(vec![record("s1", StreamStatus::Idle)]));

        let poller = StreamStatusPoller::list(registry.clone(), &config());
        let mut events = poller.subscribe();
        poller.refresh().await.unwrap();
        poller.refresh().await.unwrap();

        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_upstream_failure_keeps_snapshot() {
        let registry = Arc::new(FakeRegistry::new());
        registry.push_retrieve(Ok(record("s1", StreamStatus::Active)));
        registry.push_retrieve(Err(Error::upstream("connection reset")));
        registry.push_retrieve(Err(Error::upstream("connection reset")));

        let poller = StreamStatusPoller::detail(StreamId::from("s1"), registry.clone(), &config());
        poller.refresh().await.unwrap();
        let before = poller.snapshot();

        assert_eq!(poller.refresh().await.unwrap(), CycleOutcome::Failed);
        assert_eq!(poller.refresh().await.unwrap(), CycleOutcome::Failed);
        assert!(Arc::ptr_eq(&before, &poller.snapshot()));
        assert_eq!(
            poller.snapshot().get(&StreamId::from("s1")).map(|r| r.status),
            Some(StreamStatus::Active)
        );
        match poller.health() {
            ScopeHealth::Stale { consecutive_failures, .. } => assert_eq!(consecutive_failures, 2),
            other => panic!("expected stale health, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cycle_skips_ticks_instead_of_queueing() {
        let registry = Arc::new(FakeRegistry::new());
        let gate = registry.hold_list();

        let poller = StreamStatusPoller::list(registry.clone(), &config());
        let handle = poller.start();

        // Held across several 30s periods
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(registry.list_calls(), 1);

        // One catch-up cycle for the missed periods, not one per period
        gate.release();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!poller.snapshot().is_loading());
        assert_eq!(registry.list_calls(), 2);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(registry.list_calls(), 2);

        // Back on the original 30s grid
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(registry.list_calls(), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_configuration_error_blocks_and_stops_loop() {
        let registry = Arc::new(FakeRegistry::new());
        registry.push_list(Err(Error::missing_credentials()));

        let poller = StreamStatusPoller::list(registry.clone(), &config());
        let handle = poller.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(poller.health().is_blocked());
        assert!(handle.is_finished());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(registry.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_polls_on_interval() {
        let registry = Arc::new(FakeRegistry::new());
        let poller = StreamStatusPoller::list(registry.clone(), &config());
        let handle = poller.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.list_calls(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(registry.list_calls(), 3);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_calls_after_teardown() {
        let registry = Arc::new(FakeRegistry::new());
        let poller = StreamStatusPoller::detail(StreamId::from("s1"), registry.clone(), &config());
        registry.push_retrieve(Ok(record("s1", StreamStatus::Idle)));

        let handle = poller.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.retrieve_calls(), 1);

        handle.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(registry.retrieve_calls(), 1);
        assert_eq!(poller.refresh().await.unwrap(), CycleOutcome::Cancelled);
        assert_eq!(registry.retrieve_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_discarded_after_teardown() {
        let registry = Arc::new(FakeRegistry::new());
        let gate = registry.hold_list();
        registry.push_list(Ok(vec![record("s1", StreamStatus::Active)]));

        let poller = StreamStatusPoller::list(registry.clone(), &config());
        let handle = poller.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.list_calls(), 1);

        handle.cancel();
        gate.release();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(poller.snapshot().is_loading());
        assert!(poller.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_refresh_is_skipped() {
        let registry = Arc::new(FakeRegistry::new());
        let gate = registry.hold_list();

        let poller = StreamStatusPoller::list(registry.clone(), &config());
        let background = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(poller.refresh().await.unwrap(), CycleOutcome::Skipped);
        assert_eq!(registry.list_calls(), 1);

        gate.release();
        let outcome = background.await.unwrap().unwrap();
        assert_eq!(outcome, CycleOutcome::Applied { transitions: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_during_in_flight_poll_is_not_undone() {
        let registry = Arc::new(FakeRegistry::new());
        registry.push_list(Ok(vec![record("a", StreamStatus::Idle), record("x", StreamStatus::Idle)]));
        let poller = StreamStatusPoller::list(registry.clone(), &config());
        poller.refresh().await.unwrap();

        let gate = registry.hold_list();
        registry.push_list(Ok(vec![record("a", StreamStatus::Idle), record("x", StreamStatus::Idle)]));
        let background = {
            let poller = poller.clone();
            tokio::spawn(async move { poller.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(poller.remove(&StreamId::from("x")));
        gate.release();
        background.await.unwrap().unwrap();

        let snapshot = poller.snapshot();
        assert!(snapshot.contains(&StreamId::from("a")));
        assert!(!snapshot.contains(&StreamId::from("x")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detail_not_found_empties_scope() {
        let registry = Arc::new(FakeRegistry::new());
        registry.push_retrieve(Ok(record("s1", StreamStatus::Active)));
        registry.push_retrieve(Err(Error::NotFound("s1".to_string())));

        let poller = StreamStatusPoller::detail(StreamId::from("s1"), registry.clone(), &config());
        poller.refresh().await.unwrap();
        assert_eq!(poller.snapshot().len(), 1);

        poller.refresh().await.unwrap();
        assert!(poller.snapshot().is_empty());
        assert_eq!(poller.health(), ScopeHealth::Fresh);
    }

    #[test]
    fn test_scope_intervals() {
        let config = config();
        assert_eq!(PollScope::List.interval(&config), Duration::from_secs(30));
        assert_eq!(
            PollScope::Detail(StreamId::from("s1")).interval(&config),
            Duration::from_secs(5)
        );
    }
}
