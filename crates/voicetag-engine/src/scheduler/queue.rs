//! Pending Task Set.
//!
//! Pure state machine: no async, no I/O, no tracing. The scheduler owns the
//! only instance and is responsible for locking.
//!
//! # Invariants
//!
//! - At most one task per key, queued or in flight.
//! - A task is removed only by [`PendingTaskSet::complete`] with its current
//!   lease, or by [`PendingTaskSet::remove`] when it is superseded.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use voicetag_core::{BubbleTag, TaskKey};

/// Lease for one generation attempt.
///
/// A completion carrying an outdated lease is stale and must not commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LeaseId(u64);

/// Where a pending task is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    /// Waiting for a generation slot.
    Queued,
    /// Handed to the backend.
    InFlight,
}

/// A generation request accepted but not yet resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTask {
    pub key: TaskKey,
    pub speaker: String,
    pub emotion: String,
    pub text: String,
    pub enqueued_at: DateTime<Utc>,
    pub lease: LeaseId,
    pub phase: TaskPhase,
}

/// A terminal failure remembered for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedTask {
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Keys currently in flight to the synthesis backend, in arrival order.
#[derive(Debug, Default)]
pub struct PendingTaskSet {
    tasks: IndexMap<TaskKey, PendingTask>,
    failed: HashMap<TaskKey, FailedTask>,
    lease_counter: u64,
}

impl PendingTaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn get(&self, key: &TaskKey) -> Option<&PendingTask> {
        self.tasks.get(key)
    }

    /// Tasks queued or in flight.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.tasks
            .values()
            .filter(|t| t.phase == TaskPhase::InFlight)
            .count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TaskKey> {
        self.tasks.keys()
    }

    /// Insert a task for `tag`. Returns `None` if the key is already pending.
    pub fn insert(&mut self, tag: &BubbleTag) -> Option<LeaseId> {
        let key = tag.key();
        if self.tasks.contains_key(&key) {
            return None;
        }
        let lease = self.next_lease();
        self.tasks.insert(
            key.clone(),
            PendingTask {
                key,
                speaker: tag.speaker.clone(),
                emotion: tag.emotion.clone(),
                text: tag.text.clone(),
                enqueued_at: Utc::now(),
                lease,
                phase: TaskPhase::Queued,
            },
        );
        Some(lease)
    }

    /// Mark the oldest queued task in flight and return a copy of it.
    pub fn start_next(&mut self) -> Option<PendingTask> {
        let task = self
            .tasks
            .values_mut()
            .find(|t| t.phase == TaskPhase::Queued)?;
        task.phase = TaskPhase::InFlight;
        Some(task.clone())
    }

    /// Remove the task for `key` if `lease` is still current.
    ///
    /// Returns `false` for a stale completion (superseded, or the key is no
    /// longer pending).
    pub fn complete(&mut self, key: &TaskKey, lease: LeaseId) -> bool {
        if self.tasks.get(key).is_some_and(|t| t.lease == lease) {
            self.tasks.shift_remove(key);
            true
        } else {
            false
        }
    }

    /// Drop the task for `key` regardless of lease.
    pub fn remove(&mut self, key: &TaskKey) -> Option<PendingTask> {
        self.tasks.shift_remove(key)
    }

    pub fn record_failure(&mut self, key: TaskKey, error: String) {
        self.failed.insert(
            key,
            FailedTask {
                error,
                failed_at: Utc::now(),
            },
        );
    }

    pub fn failure(&self, key: &TaskKey) -> Option<&FailedTask> {
        self.failed.get(key)
    }

    pub fn is_failed(&self, key: &TaskKey) -> bool {
        self.failed.contains_key(key)
    }

    /// Forget a remembered failure. Returns `true` if one existed.
    pub fn clear_failure(&mut self, key: &TaskKey) -> bool {
        self.failed.remove(key).is_some()
    }

    const fn next_lease(&mut self) -> LeaseId {
        self.lease_counter += 1;
        LeaseId(self.lease_counter)
    }
}
