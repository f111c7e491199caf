//! Bounded waits around calls that may hang inside third-party code.
//!
//! A call that overruns its bound keeps running on its own thread. The
//! [`CallTracker`] it ran under counts such abandoned calls until they return,
//! and refuses new calls in the meantime.

use crossbeam::channel::{bounded, RecvTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoundedCallError {
    /// The call did not return within the bound. Its thread is left to finish
    /// and its result is discarded.
    TimedOut,
    /// The call panicked or its thread could not be started.
    Aborted,
    /// An earlier call under the same tracker timed out and has not returned yet.
    Stalled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Running,
    Abandoned,
    Finished,
}

/// Shared count of timed-out calls still running for one resource.
#[derive(Debug, Clone, Default)]
pub(crate) struct CallTracker {
    abandoned: Arc<AtomicUsize>,
}

impl CallTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::Acquire)
    }

    pub(crate) fn is_stalled(&self) -> bool {
        self.abandoned() > 0
    }
}

/// Marks the call finished when the worker thread ends, panics included.
struct FinishGuard {
    label: String,
    state: Arc<Mutex<CallState>>,
    abandoned: Arc<AtomicUsize>,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == CallState::Abandoned {
            self.abandoned.fetch_sub(1, Ordering::AcqRel);
            info!("{} returned after its timeout, accepting calls again", self.label);
        }
        *state = CallState::Finished;
    }
}

/// Runs `call` on a dedicated thread and waits at most `timeout` for it.
///
/// Fails with `Stalled` without running `call` while `tracker` still has an
/// abandoned call in flight.
pub(crate) fn run_bounded<T, F>(
    label: &str,
    timeout: Duration,
    tracker: &CallTracker,
    call: F,
) -> Result<T, BoundedCallError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    if tracker.is_stalled() {
        debug!("{label} still has a timed-out call in flight, refusing a new one");
        return Err(BoundedCallError::Stalled);
    }

    let (tx, rx) = bounded::<T>(1);
    let state = Arc::new(Mutex::new(CallState::Running));
    let guard = FinishGuard {
        label: label.to_string(),
        state: Arc::clone(&state),
        abandoned: Arc::clone(&tracker.abandoned),
    };

    let spawned = thread::Builder::new().name(format!("{label}-call")).spawn(move || {
        let _guard = guard;
        // Receiver may be gone after a timeout.
        let _ = tx.send(call());
    });

    if let Err(e) = spawned {
        warn!("Failed to spawn bounded call thread for {label}: {e}");
        return Err(BoundedCallError::Aborted);
    }

    match rx.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == CallState::Running {
                *state = CallState::Abandoned;
                tracker.abandoned.fetch_add(1, Ordering::AcqRel);
            }
            warn!("{label} did not return within {timeout:?}");
            Err(BoundedCallError::TimedOut)
        }
        Err(RecvTimeoutError::Disconnected) => {
            debug!("{label} worker exited without a result");
            Err(BoundedCallError::Aborted)
        }
    }
}
