//! Countdown bound to a credential's expiry timestamp
//!
//! The invite-display side starts one of these per outstanding invite; if
//! no handshake completes before the deadline, the callback force-fails the
//! flow. Cancellation is the only other way the timer ends.

use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One-shot expiry notifier.
pub struct ExpiryTimer;

impl ExpiryTimer {
    /// Start a timer that invokes `on_expire` exactly once when the clock
    /// reaches `expires_at` (Unix seconds), unless cancelled first.
    ///
    /// A deadline already in the past fires immediately.
    pub fn start<F>(expires_at: i64, on_expire: F) -> ExpiryHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let now = chrono::Utc::now().timestamp();
        let delay = std::time::Duration::from_secs(expires_at.saturating_sub(now).max(0) as u64);

        tokio::spawn(async move {
            tokio::select! {
                // Bias toward cancellation so a cancel that races the
                // deadline never fires the callback.
                biased;
                _ = task_token.cancelled() => {
                    debug!(expires_at, "Expiry timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    debug!(expires_at, "Expiry timer fired");
                    on_expire();
                }
            }
        });

        ExpiryHandle { token }
    }
}

/// Handle for cancelling a running [`ExpiryTimer`].
///
/// `cancel` is idempotent and a no-op after the timer has fired.
#[derive(Debug, Clone)]
pub struct ExpiryHandle {
    token: CancellationToken,
}

impl ExpiryHandle {
    /// Cancel the timer. Safe to call repeatedly or after firing.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}
