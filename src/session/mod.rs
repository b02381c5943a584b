//! Trace session state machines
//!
//! Each session owns its transports and timers through a single driver task;
//! cancellation flows through a `watch` channel. State transitions out of the
//! active states are guarded so that a stray response or error racing a
//! `stop()` can never fire the termination path twice.

pub mod apptrace;
pub mod heaptrace;

pub use apptrace::AppTraceSession;
pub use heaptrace::HeapTraceSession;

use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::watch;

/// Lifecycle of a trace session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

/// Move an active (Running or Stopping) session to Idle.
///
/// Returns `true` only for the caller that performed the transition; every
/// later caller sees Idle and must treat its event as stale.
pub(crate) fn leave_active(state: &Mutex<SessionState>) -> bool {
    let mut st = state.lock().expect("session state poisoned");
    if *st == SessionState::Idle {
        return false;
    }
    *st = SessionState::Idle;
    true
}

/// Sleep that yields early (returning `false`) when shutdown is signalled.
pub(crate) async fn sleep_unless_shutdown(
    shutdown: &mut watch::Receiver<bool>,
    duration: Duration,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.changed() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leave_active_fires_once() {
        let state = Mutex::new(SessionState::Running);
        assert!(leave_active(&state));
        assert!(!leave_active(&state));
        assert_eq!(*state.lock().unwrap(), SessionState::Idle);
    }

    #[test]
    fn test_leave_active_from_stopping() {
        let state = Mutex::new(SessionState::Stopping);
        assert!(leave_active(&state));
    }

    #[test]
    fn test_leave_active_noop_when_idle() {
        let state = Mutex::new(SessionState::Idle);
        assert!(!leave_active(&state));
    }

    #[tokio::test]
    async fn test_sleep_unless_shutdown_interrupted() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        assert!(!sleep_unless_shutdown(&mut rx, Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_sleep_unless_shutdown_elapses() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(sleep_unless_shutdown(&mut rx, Duration::from_millis(1)).await);
    }
}
