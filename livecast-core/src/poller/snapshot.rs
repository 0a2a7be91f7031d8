//! Versioned per-scope snapshot
//!
//! All mutation happens under one short write lock and produces a fresh
//! `Arc<StreamSnapshot>`, so a reader either sees the previous snapshot or
//! the next one, never a mix.
//!
//! Ordering rules:
//! - every poll cycle takes a [`CycleTicket`] when it starts; a result whose
//!   ticket is not newer than the last applied cycle is discarded
//! - `remove` leaves a tombstone so a cycle already in flight cannot bring the
//!   id back; the tombstone is dropped once a cycle that started after the
//!   removal comes back without the id
//! - `merge` records a boundary so a cycle that started before the merge
//!   cannot drop the merged record; the boundary is dropped once a cycle that
//!   started after the merge is applied

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::StatusTransition;
use crate::models::{StreamId, StreamRecord};

/// Immutable point-in-time view of one scope's records
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamSnapshot {
    /// Bumped on every change, local or polled
    pub version: u64,
    /// Sequence number of the last applied poll cycle (0 before the first)
    pub cycle: u64,
    pub records: Vec<StreamRecord>,
    /// Completion time of the last applied poll cycle
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl StreamSnapshot {
    #[must_use]
    pub fn get(&self, id: &StreamId) -> Option<&StreamRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &StreamId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True until the first poll cycle has been applied
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.cycle == 0
    }
}

/// Health of a scope as seen by the view layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScopeHealth {
    /// No cycle has finished yet
    Pending,
    /// Last cycle succeeded
    Fresh,
    /// Last cycle(s) failed upstream; the snapshot holds the last good data
    Stale {
        error: String,
        consecutive_failures: u32,
    },
    /// Polling cannot succeed until the process is reconfigured
    Blocked { error: String },
}

impl ScopeHealth {
    /// Whether the view should show a non-blocking "data may be stale" marker
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }

    #[must_use]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Sequence number taken by a poll cycle when it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CycleTicket(u64);

impl CycleTicket {
    #[must_use]
    pub const fn seq(self) -> u64 {
        self.0
    }
}

/// Result of handing a cycle's records to the store
#[derive(Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { transitions: Vec<StatusTransition> },
    /// A newer cycle already applied its result
    Stale,
    /// The owning poller was torn down
    Closed,
}

#[derive(Debug)]
struct StoreState {
    current: Arc<StreamSnapshot>,
    next_cycle: u64,
    /// id -> first cycle that started after the removal
    tombstones: HashMap<StreamId, u64>,
    /// id -> first cycle that started after the merge
    merges: HashMap<StreamId, u64>,
    health: ScopeHealth,
    closed: bool,
}

/// Owner of one scope's snapshot
#[derive(Debug)]
pub struct SnapshotStore {
    state: RwLock<StoreState>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                current: Arc::new(StreamSnapshot::default()),
                next_cycle: 1,
                tombstones: HashMap::new(),
                merges: HashMap::new(),
                health: ScopeHealth::Pending,
                closed: false,
            }),
        }
    }

    #[must_use]
    pub fn current(&self) -> Arc<StreamSnapshot> {
        Arc::clone(&self.state.read().current)
    }

    #[must_use]
    pub fn health(&self) -> ScopeHealth {
        self.state.read().health.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Stop accepting results. Anything applied afterwards is discarded.
    pub fn close(&self) {
        self.state.write().closed = true;
    }

    pub fn begin_cycle(&self) -> CycleTicket {
        let mut state = self.state.write();
        let ticket = CycleTicket(state.next_cycle);
        state.next_cycle += 1;
        ticket
    }

    /// Replace the snapshot with a cycle's records
    pub fn apply(&self, ticket: CycleTicket, records: Vec<StreamRecord>) -> ApplyOutcome {
        let mut state = self.state.write();
        if state.closed {
            return ApplyOutcome::Closed;
        }
        if ticket.0 <= state.current.cycle {
            return ApplyOutcome::Stale;
        }

        let previous = Arc::clone(&state.current);
        let fetched_ids: HashSet<StreamId> = records.iter().map(|r| r.id.clone()).collect();

        // A cycle that started after a removal and no longer sees the id
        // confirms it; the tombstone is no longer needed.
        state
            .tombstones
            .retain(|id, boundary| ticket.0 < *boundary || fetched_ids.contains(id));

        let mut seen = HashSet::with_capacity(records.len());
        let mut next: Vec<StreamRecord> = records
            .into_iter()
            .filter(|r| !state.tombstones.contains_key(&r.id))
            .filter(|r| seen.insert(r.id.clone()))
            .collect();

        // Merged records the cycle could not have seen yet are carried over.
        let mut carried = Vec::new();
        state.merges.retain(|id, boundary| {
            if ticket.0 >= *boundary {
                return false;
            }
            if !seen.contains(id) {
                carried.push(id.clone());
            }
            true
        });
        for id in carried {
            if let Some(record) = previous.get(&id) {
                next.push(record.clone());
            }
        }

        let at = Utc::now();
        let transitions = next
            .iter()
            .filter_map(|record| {
                let before = previous.get(&record.id)?;
                (before.status != record.status).then(|| StatusTransition {
                    id: record.id.clone(),
                    from: before.status,
                    to: record.status,
                    at,
                })
            })
            .collect();

        state.current = Arc::new(StreamSnapshot {
            version: previous.version + 1,
            cycle: ticket.0,
            records: next,
            refreshed_at: Some(at),
        });
        state.health = ScopeHealth::Fresh;

        ApplyOutcome::Applied { transitions }
    }

    /// Record a transient failure; the snapshot is left untouched
    pub fn fail(&self, ticket: CycleTicket, error: &str) {
        let mut state = self.state.write();
        if state.closed || ticket.0 <= state.current.cycle {
            return;
        }
        let consecutive_failures = match &state.health {
            ScopeHealth::Stale {
                consecutive_failures,
                ..
            } => consecutive_failures + 1,
            _ => 1,
        };
        state.health = ScopeHealth::Stale {
            error: error.to_string(),
            consecutive_failures,
        };
    }

    /// Record a failure no retry can fix
    pub fn block(&self, error: &str) {
        let mut state = self.state.write();
        if !state.closed {
            state.health = ScopeHealth::Blocked {
                error: error.to_string(),
            };
        }
    }

    /// Insert or replace a record confirmed by the registry outside a poll
    pub fn merge(&self, record: StreamRecord) {
        let mut state = self.state.write();
        if state.closed {
            return;
        }

        let boundary = state.next_cycle;
        state.tombstones.remove(&record.id);
        state.merges.insert(record.id.clone(), boundary);

        let mut records = state.current.records.clone();
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        state.current = Arc::new(StreamSnapshot {
            version: state.current.version + 1,
            cycle: state.current.cycle,
            records,
            refreshed_at: state.current.refreshed_at,
        });
    }

    /// Drop a record the registry has deleted. Returns whether it was present.
    pub fn remove(&self, id: &StreamId) -> bool {
        let mut state = self.state.write();
        if state.closed {
            return false;
        }

        let boundary = state.next_cycle;
        state.tombstones.insert(id.clone(), boundary);
        state.merges.remove(id);

        if !state.current.contains(id) {
            return false;
        }
        let records = state
            .current
            .records
            .iter()
            .filter(|r| &r.id != id)
            .cloned()
            .collect();
        state.current = Arc::new(StreamSnapshot {
            version: state.current.version + 1,
            cycle: state.current.cycle,
            records,
            refreshed_at: state.current.refreshed_at,
        });
        true
    }

    #[cfg(test)]
    fn bookkeeping(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.tombstones.len(), state.merges.len())
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
