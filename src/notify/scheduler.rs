use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::store::Command;

/// Capacity of the expiry channel. At most one timer is alive at a time.
const EXPIRY_CHANNEL_CAPACITY: usize = 4;

/// Drives the single notification slot's dismissal timer.
///
/// Each `show` bumps a sequence number, aborts the pending timer and starts
/// a new one. An expired timer reports its sequence number; the reducer only
/// hides the slot when that number is still current, so a timer that fires
/// between abort and delivery is harmless.
pub struct NotificationScheduler {
    seq: u64,
    timer: Option<JoinHandle<()>>,
    expired_tx: mpsc::Sender<u64>,
}

impl NotificationScheduler {
    /// Create a scheduler and the receiver its timers report to.
    pub fn new() -> (Self, mpsc::Receiver<u64>) {
        let (expired_tx, expired_rx) = mpsc::channel(EXPIRY_CHANNEL_CAPACITY);
        let scheduler = Self {
            seq: 0,
            timer: None,
            expired_tx,
        };
        (scheduler, expired_rx)
    }

    /// Start a dismissal timer for a new message and return the command that
    /// makes it visible.
    pub fn show(&mut self, message: impl Into<String>, duration: Duration) -> Command {
        self.cancel();

        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        let deadline = Instant::now() + duration;
        let tx = self.expired_tx.clone();

        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Err(e) = tx.send(seq).await {
                tracing::debug!(seq, error = %e, "Notification expiry dropped (receiver gone)");
            }
        }));

        let message = message.into();
        tracing::debug!(seq, message = %message, duration_ms = duration.as_millis() as u64, "Showing notification");
        Command::NotificationShown {
            message,
            seq,
            duration,
            deadline,
        }
    }

    /// Abort the pending dismissal timer, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.timer.take() {
            handle.abort();
            tracing::debug!(seq = self.seq, "Cancelled notification timer");
        }
    }
}

impl Drop for NotificationScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
