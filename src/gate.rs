// Request gating and debouncing for interactive refreshes

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Latest-request-wins: each request takes a ticket, and only the holder of
/// the newest ticket may apply its result.
#[derive(Debug, Clone, Default)]
pub struct RequestGate {
    generation: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

impl RequestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request; every earlier ticket becomes stale.
    pub fn issue(&self) -> Ticket {
        Ticket(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.0
    }
}

/// Coalesces bursts of calls: after `settle`, only the most recent caller
/// within the quiet window is told to proceed.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    gate: RequestGate,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Debouncer {
            delay,
            gate: RequestGate::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait out the quiet window. Returns `true` when no newer call arrived
    /// in the meantime.
    pub async fn settle(&self) -> bool {
        let ticket = self.gate.issue();
        tokio::time::sleep(self.delay).await;
        self.gate.is_current(ticket)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Debouncer::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_ticket_supersedes() {
        let gate = RequestGate::new();
        let first = gate.issue();
        assert!(gate.is_current(first));

        let second = gate.issue();
        assert!(!gate.is_current(first));
        assert!(gate.is_current(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_call_in_burst_proceeds() {
        let debouncer = Debouncer::default();

        let first = tokio::spawn({
            let d = debouncer.clone();
            async move { d.settle().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = tokio::spawn({
            let d = debouncer.clone();
            async move { d.settle().await }
        });

        assert!(!first.await.unwrap());
        assert!(second.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_outside_window_both_proceed() {
        let debouncer = Debouncer::new(Duration::from_millis(50));

        assert!(debouncer.settle().await);
        assert!(debouncer.settle().await);
    }
}
