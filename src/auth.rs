//! Authentication handshake state.
//!
//! The outcome of an authentication attempt is shared between two flows:
//! the inbound dispatch task resolves it when the server answers, and
//! [`crate::client::Client::authenticate`] waits on it. A watch channel
//! carries the state so the waiter is woken on resolution instead of
//! polling.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Outcome of the most recent authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthState {
    /// No attempt has resolved yet (none started, or one is in flight).
    #[default]
    Unknown,
    /// The server accepted the password.
    Pass,
    /// The server rejected the password, or the session never offered one.
    Fail,
}

/// Shared, resettable view of [`AuthState`].
///
/// A resolved state is sticky: once `Pass` or `Fail` is recorded, further
/// resolutions are ignored until [`reset`] re-arms the tracker for a new
/// attempt.
///
/// [`reset`]: AuthTracker::reset
#[derive(Clone)]
pub struct AuthTracker {
    tx: Arc<watch::Sender<AuthState>>,
}

impl AuthTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(AuthState::Unknown);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> AuthState {
        *self.tx.borrow()
    }

    /// Re-arms the tracker for a fresh authentication attempt.
    pub fn reset(&self) {
        self.tx.send_replace(AuthState::Unknown);
    }

    /// Records an accepted handshake.
    pub fn pass(&self) {
        self.resolve(AuthState::Pass);
    }

    /// Records a rejected handshake, or marks a session that never offered
    /// a password.
    pub fn fail(&self) {
        self.resolve(AuthState::Fail);
    }

    fn resolve(&self, outcome: AuthState) {
        self.tx.send_if_modified(|state| {
            if *state == AuthState::Unknown {
                *state = outcome;
                true
            } else {
                false
            }
        });
    }

    /// Waits until the in-flight attempt resolves or `timeout` elapses,
    /// returning the state either way (`Unknown` on timeout).
    pub async fn wait(&self, timeout: Duration) -> AuthState {
        let mut rx = self.tx.subscribe();
        let resolved = tokio::time::timeout(timeout, async move {
            loop {
                let state = *rx.borrow_and_update();
                if state != AuthState::Unknown {
                    return state;
                }
                if rx.changed().await.is_err() {
                    return AuthState::Unknown;
                }
            }
        })
        .await;

        resolved.unwrap_or_else(|_| self.state())
    }
}

impl Default for AuthTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unknown() {
        assert_eq!(AuthTracker::new().state(), AuthState::Unknown);
    }

    #[test]
    fn resolutions_are_sticky_until_reset() {
        let tracker = AuthTracker::new();

        tracker.pass();
        assert_eq!(tracker.state(), AuthState::Pass);

        // a later (stray) failure does not overwrite the verdict
        tracker.fail();
        assert_eq!(tracker.state(), AuthState::Pass);

        tracker.reset();
        assert_eq!(tracker.state(), AuthState::Unknown);
        tracker.fail();
        assert_eq!(tracker.state(), AuthState::Fail);
    }

    #[tokio::test]
    async fn wait_wakes_on_resolution() {
        let tracker = AuthTracker::new();
        let waiter = tracker.clone();

        let handle = tokio::spawn(async move { waiter.wait(Duration::from_secs(5)).await });
        tokio::task::yield_now().await;
        tracker.pass();

        assert_eq!(handle.await.unwrap(), AuthState::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_unknown_on_timeout() {
        let tracker = AuthTracker::new();
        assert_eq!(
            tracker.wait(Duration::from_secs(10)).await,
            AuthState::Unknown
        );
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_resolved() {
        let tracker = AuthTracker::new();
        tracker.fail();
        assert_eq!(tracker.wait(Duration::from_secs(5)).await, AuthState::Fail);
    }
}
