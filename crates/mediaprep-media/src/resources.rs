// MediaPrep - Client-side media preprocessing
// Copyright (C) 2025 MediaPrep Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published
// by the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.

//! Release-exactly-once bookkeeping for transient pipeline handles
//!
//! Every attempt owns one [`ResourceTracker`]. Object URLs, timer tasks and
//! the frame pump are registered with a release action; `release_all` runs
//! each action once, in reverse registration order, and is idempotent.
//! Dropping the tracker releases everything, so early returns, `?`, and a
//! dropped future all take the same exit path.
//!
//! Callbacks that may still be in flight after release (a pump tick, a timer
//! that already fired) hold the tracker's [`active_token`](ResourceTracker::active_token)
//! and must check it before acting.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// What a tracked handle stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Temporary playable-buffer URL
    ObjectUrl,
    /// Pending timer task
    Timer,
    /// In-flight frame-capture loop
    FramePump,
}

/// Opaque identifier returned by [`ResourceTracker::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    id: u64,
    kind: ResourceKind,
}

impl ResourceHandle {
    /// Kind of resource behind this handle
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

struct Entry {
    handle: ResourceHandle,
    release: ReleaseFn,
}

#[derive(Default)]
struct TrackerState {
    next_id: u64,
    live: Vec<Entry>,
    released: u64,
    closed: bool,
}

/// Tracks handles created during one compression attempt
pub struct ResourceTracker {
    state: Mutex<TrackerState>,
    active: CancellationToken,
}

impl ResourceTracker {
    /// Create an empty, active tracker
    pub fn new() -> Self {
        ResourceTracker {
            state: Mutex::new(TrackerState::default()),
            active: CancellationToken::new(),
        }
    }

    /// Create a tracker whose activity also ends when `parent` is cancelled
    pub fn with_parent(parent: &CancellationToken) -> Self {
        ResourceTracker {
            state: Mutex::new(TrackerState::default()),
            active: parent.child_token(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Token cancelled by `release_all`; live callbacks check it before acting
    pub fn active_token(&self) -> CancellationToken {
        self.active.clone()
    }

    /// Whether `release_all` has not run yet
    pub fn is_active(&self) -> bool {
        !self.lock().closed && !self.active.is_cancelled()
    }

    /// Register a handle with the action that releases it.
    ///
    /// Registering on a tracker that was already released runs the action
    /// immediately: nothing may outlive the attempt.
    pub fn register<F>(&self, kind: ResourceKind, release: F) -> ResourceHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.lock();
        let handle = ResourceHandle {
            id: state.next_id,
            kind,
        };
        state.next_id += 1;

        if state.closed {
            state.released += 1;
            drop(state);
            warn!(?kind, "resource registered after release; releasing immediately");
            release();
            return handle;
        }

        trace!(?kind, id = handle.id, "tracking resource");
        state.live.push(Entry {
            handle,
            release: Box::new(release),
        });
        handle
    }

    /// Register a spawned task; releasing aborts it
    pub fn register_task(&self, kind: ResourceKind, task: AbortHandle) -> ResourceHandle {
        self.register(kind, move || task.abort())
    }

    /// Release a single handle. Returns `false` if it was already released.
    pub fn release(&self, handle: ResourceHandle) -> bool {
        let entry = {
            let mut state = self.lock();
            let position = state.live.iter().position(|e| e.handle == handle);
            match position {
                Some(index) => {
                    state.released += 1;
                    Some(state.live.remove(index))
                }
                None => None,
            }
        };

        match entry {
            Some(entry) => {
                trace!(kind = ?handle.kind, id = handle.id, "releasing resource");
                (entry.release)();
                true
            }
            None => false,
        }
    }

    /// Release every live handle and deactivate the tracker.
    ///
    /// Idempotent: later calls release nothing and return 0.
    pub fn release_all(&self) -> usize {
        let drained = {
            let mut state = self.lock();
            state.closed = true;
            let drained: Vec<Entry> = state.live.drain(..).rev().collect();
            state.released += drained.len() as u64;
            drained
        };
        self.active.cancel();

        let count = drained.len();
        for entry in drained {
            trace!(kind = ?entry.handle.kind, id = entry.handle.id, "releasing resource");
            (entry.release)();
        }
        count
    }

    /// Handles registered and not yet released
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Handles released so far, over the tracker's lifetime
    pub fn released_count(&self) -> u64 {
        self.lock().released
    }
}

impl Default for ResourceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceTracker {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ResourceTracker")
            .field("live", &state.live.len())
            .field("released", &state.released)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let shared = Arc::clone(&hits);
        let make = move || {
            let shared = Arc::clone(&shared);
            Box::new(move || {
                shared.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (hits, make)
    }

    #[test]
    fn release_all_is_idempotent() {
        let (hits, make) = counter();
        let tracker = ResourceTracker::new();
        tracker.register(ResourceKind::ObjectUrl, make());
        tracker.register(ResourceKind::Timer, make());

        assert_eq!(tracker.release_all(), 2);
        assert_eq!(tracker.release_all(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.released_count(), 2);
        assert!(!tracker.is_active());
    }

    #[test]
    fn single_release_then_release_all() {
        let (hits, make) = counter();
        let tracker = ResourceTracker::new();
        let url = tracker.register(ResourceKind::ObjectUrl, make());
        tracker.register(ResourceKind::Timer, make());

        assert!(tracker.release(url));
        assert!(!tracker.release(url));
        assert_eq!(tracker.live_count(), 1);
        assert_eq!(tracker.release_all(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn releases_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let tracker = ResourceTracker::new();
        for id in 0..3 {
            let order = Arc::clone(&order);
            tracker.register(ResourceKind::Timer, move || {
                order.lock().unwrap().push(id);
            });
        }
        tracker.release_all();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn late_registration_is_released_immediately() {
        let (hits, make) = counter();
        let tracker = ResourceTracker::new();
        tracker.release_all();
        tracker.register(ResourceKind::FramePump, make());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn drop_releases_everything() {
        let (hits, make) = counter();
        let token = {
            let tracker = ResourceTracker::new();
            tracker.register(ResourceKind::ObjectUrl, make());
            tracker.active_token()
        };
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(token.is_cancelled());
    }

    #[test]
    fn parent_cancellation_deactivates() {
        let parent = CancellationToken::new();
        let tracker = ResourceTracker::with_parent(&parent);
        assert!(tracker.is_active());
        parent.cancel();
        assert!(!tracker.is_active());
    }

    #[tokio::test]
    async fn releasing_task_aborts_it() {
        let tracker = ResourceTracker::new();
        let task = tokio::spawn(std::future::pending::<()>());
        tracker.register_task(ResourceKind::Timer, task.abort_handle());
        tracker.release_all();
        let err = task.await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
