//! Batch timer abstraction.
//!
//! The manager needs exactly one host capability for time-based
//! batching: a one-shot, cancellable timer. It is injected at
//! construction so the core never binds to a particular async runtime;
//! the host delivers expiry by calling
//! [`ChainManager::on_batch_timer`](crate::consensus::ChainManager::on_batch_timer)
//! from whatever loop owns the manager.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// One-shot, cancellable timer owned by the chain manager.
pub trait BatchTimer {
    /// Schedules a single expiry after `timeout`. Re-arming replaces
    /// any earlier schedule.
    fn arm(&mut self, timeout: Duration);

    /// Cancels the pending expiry, if any.
    fn cancel(&mut self);

    /// True while an expiry is scheduled and not yet delivered.
    fn is_armed(&self) -> bool;
}

/// Deterministic timer for tests and single-threaded hosts.
///
/// Never fires on its own: the host observes [`ManualTimer::is_armed`]
/// and decides when "time has passed".
#[derive(Debug, Default)]
pub struct ManualTimer {
    armed: bool,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BatchTimer for ManualTimer {
    fn arm(&mut self, _timeout: Duration) {
        self.armed = true;
    }

    fn cancel(&mut self) {
        self.armed = false;
    }

    fn is_armed(&self) -> bool {
        self.armed
    }
}

/// Tokio-backed timer.
///
/// `arm` spawns a sleep task that sends one tick on the paired channel;
/// the host listens on the receiver and calls back into the manager.
/// Must be created inside a Tokio runtime.
pub struct TokioBatchTimer {
    tx: UnboundedSender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TokioBatchTimer {
    /// Creates the timer and the tick stream the host should drain.
    pub fn new() -> (Self, UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, handle: None }, rx)
    }
}

impl BatchTimer for TokioBatchTimer {
    fn arm(&mut self, timeout: Duration) {
        self.cancel();
        let tx = self.tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            // Receiver may be gone during shutdown; nothing to do then.
            let _ = tx.send(());
        }));
    }

    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TokioBatchTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_timer_tracks_armed_state() {
        let mut timer = ManualTimer::new();
        assert!(!timer.is_armed());

        timer.arm(Duration::from_secs(60));
        assert!(timer.is_armed());

        timer.cancel();
        assert!(!timer.is_armed());
    }

    #[tokio::test]
    async fn tokio_timer_delivers_one_tick() {
        let (mut timer, mut ticks) = TokioBatchTimer::new();
        timer.arm(Duration::from_millis(5));
        ticks.recv().await.expect("tick should arrive");

        // One-shot: no further ticks pending.
        assert!(ticks.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancelled_timer_never_ticks() {
        let (mut timer, mut ticks) = TokioBatchTimer::new();
        timer.arm(Duration::from_millis(20));
        timer.cancel();
        assert!(!timer.is_armed());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(ticks.try_recv().is_err());
    }
}
