//! Pipeline lifecycle state.

use serde::Serialize;
use tokio::sync::watch;

/// Lifecycle of a single pipeline run. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum PipelineState {
    /// Constructed, nothing started
    Idle,
    /// All stages processing
    Running,
    /// Extraction closed its channel; enrichment and writes still finishing
    Draining,
    /// Load stage signalled completion
    Completed,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Completed => "completed",
        };
        f.write_str(name)
    }
}

/// Shared, observable pipeline state.
#[derive(Debug, Clone)]
pub struct StateTracker {
    tx: std::sync::Arc<watch::Sender<PipelineState>>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PipelineState::Idle);
        Self {
            tx: std::sync::Arc::new(tx),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> PipelineState {
        *self.tx.borrow()
    }

    /// Move to `next` if it is later than the current state.
    ///
    /// Returns whether the state changed.
    pub fn advance(&self, next: PipelineState) -> bool {
        let changed = self.tx.send_if_modified(|state| {
            if next > *state {
                *state = next;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!("Pipeline state -> {}", next);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advances_forward_only() {
        let tracker = StateTracker::new();
        assert_eq!(tracker.current(), PipelineState::Idle);

        assert!(tracker.advance(PipelineState::Running));
        assert!(tracker.advance(PipelineState::Draining));
        assert!(!tracker.advance(PipelineState::Running));
        assert!(!tracker.advance(PipelineState::Draining));
        assert_eq!(tracker.current(), PipelineState::Draining);

        assert!(tracker.advance(PipelineState::Completed));
        assert_eq!(tracker.current(), PipelineState::Completed);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let tracker = StateTracker::new();
        let mut rx = tracker.subscribe();

        let clone = tracker.clone();
        tokio::spawn(async move {
            clone.advance(PipelineState::Running);
            clone.advance(PipelineState::Completed);
        });

        rx.wait_for(|s| *s == PipelineState::Completed).await.unwrap();
        assert_eq!(tracker.current(), PipelineState::Completed);
    }
}
