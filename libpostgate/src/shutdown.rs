//! Graceful shutdown coordination
//!
//! Tracks in-flight requests and lets shutdown wait until the last one
//! finishes. States only move forward: RUNNING → DRAINING → STOPPED.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::error::{GateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    Draining,
    Stopped,
}

struct Inner {
    state: Mutex<ShutdownState>,
    in_flight: watch::Sender<usize>,
}

/// Shared handle to the process-wide admission state and in-flight counter
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(ShutdownState::Running),
                in_flight,
            }),
        }
    }

    pub fn state(&self) -> ShutdownState {
        *self.lock_state()
    }

    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    pub fn is_accepting(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Admit a request and count it as in flight
    ///
    /// The state check and the increment happen under one lock, so nothing
    /// is admitted after a drain has started.
    ///
    /// # Errors
    ///
    /// Returns `GateError::ServiceUnavailable` once shutdown has begun.
    pub fn track_request(&self) -> Result<RequestGuard> {
        let state = self.lock_state();
        if *state != ShutdownState::Running {
            return Err(GateError::ServiceUnavailable(
                "Server is shutting down".to_string(),
            ));
        }
        self.inner.in_flight.send_modify(|count| *count += 1);
        drop(state);

        Ok(RequestGuard {
            coordinator: self.clone(),
        })
    }

    /// Release one in-flight request; never goes below zero
    ///
    /// Prefer dropping the `RequestGuard` returned by `track_request`.
    pub fn untrack_request(&self) {
        self.inner.in_flight.send_modify(|count| {
            if *count == 0 {
                tracing::warn!("Untracked a request with no requests in flight");
            } else {
                *count -= 1;
            }
        });
    }

    /// Stop admitting requests and wait for in-flight ones to finish
    ///
    /// Returns at once when nothing is in flight. Calling it again while a
    /// drain is running waits for the same drain.
    pub async fn begin_shutdown(&self, signal: &str) {
        {
            let mut state = self.lock_state();
            if *state == ShutdownState::Running {
                *state = ShutdownState::Draining;
                tracing::info!(
                    signal = %signal,
                    in_flight = self.in_flight(),
                    "Shutdown requested, draining in-flight requests"
                );
            } else {
                tracing::debug!(signal = %signal, "Shutdown already in progress");
            }
        }

        let mut in_flight = self.inner.in_flight.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = in_flight.wait_for(|count| *count == 0).await;

        let mut state = self.lock_state();
        if *state != ShutdownState::Stopped {
            *state = ShutdownState::Stopped;
            tracing::info!("All in-flight requests finished, shutdown complete");
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ShutdownState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Marks one admitted request; releases it exactly once when dropped
///
/// Dropping covers success, error and cancellation of the owning future.
#[must_use = "the request is untracked as soon as the guard is dropped"]
#[derive(Debug)]
pub struct RequestGuard {
    coordinator: ShutdownCoordinator,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.coordinator.untrack_request();
    }
}
