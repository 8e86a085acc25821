//! Two-source readiness join.
//!
//! The player may start only once both the runtime and the namespace have
//! reported ready. Each source counts once; a repeated signal from the
//! same source never advances the state.

use std::sync::Arc;
use tokio::sync::watch;

/// One of the two things that must be ready before start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadySource {
    /// The runtime finished its own initialization.
    Runtime,
    /// The namespace is composed and staged.
    Namespace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Readiness {
    #[default]
    NoneReady,
    OneReady(ReadySource),
    BothReady,
}

impl Readiness {
    /// State after `source` reports ready.
    pub fn signal(self, source: ReadySource) -> Self {
        match self {
            Self::NoneReady => Self::OneReady(source),
            Self::OneReady(first) if first == source => self,
            Self::OneReady(_) | Self::BothReady => Self::BothReady,
        }
    }

    pub fn is_ready(self) -> bool {
        self == Self::BothReady
    }
}

/// Shared readiness state that tasks can signal and wait on.
#[derive(Debug, Clone)]
pub struct ReadinessJoin {
    tx: Arc<watch::Sender<Readiness>>,
}

impl Default for ReadinessJoin {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessJoin {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Readiness::NoneReady);
        Self { tx: Arc::new(tx) }
    }

    /// Record that `source` is ready.
    ///
    /// Returns true only for the signal that completes the join.
    pub fn signal(&self, source: ReadySource) -> bool {
        let mut completed = false;
        self.tx.send_if_modified(|state| {
            let next = state.signal(source);
            if next == *state {
                return false;
            }
            completed = next.is_ready();
            *state = next;
            true
        });
        completed
    }

    pub fn state(&self) -> Readiness {
        *self.tx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Wait until both sources have signalled.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|state| state.is_ready()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_state_machine() {
        let state = Readiness::NoneReady.signal(ReadySource::Runtime);
        assert_eq!(state, Readiness::OneReady(ReadySource::Runtime));
        assert_eq!(state.signal(ReadySource::Runtime), state);
        assert_eq!(state.signal(ReadySource::Namespace), Readiness::BothReady);
        assert_eq!(
            Readiness::BothReady.signal(ReadySource::Runtime),
            Readiness::BothReady
        );
    }

    #[test]
    fn test_repeated_signal_does_not_complete() {
        let join = ReadinessJoin::new();
        assert!(!join.signal(ReadySource::Namespace));
        assert!(!join.signal(ReadySource::Namespace));
        assert!(!join.is_ready());
        assert!(join.signal(ReadySource::Runtime));
        assert!(join.is_ready());
        // Only the completing signal reports true.
        assert!(!join.signal(ReadySource::Runtime));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_completion() {
        let join = ReadinessJoin::new();
        let waiter = {
            let join = join.clone();
            tokio::spawn(async move { join.wait().await })
        };

        join.signal(ReadySource::Runtime);
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        join.signal(ReadySource::Namespace);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_returns_when_already_ready() {
        let join = ReadinessJoin::new();
        join.signal(ReadySource::Runtime);
        join.signal(ReadySource::Namespace);
        join.wait().await;
    }
}
