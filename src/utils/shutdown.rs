// src/utils/shutdown.rs

//! Interrupt handling for long-running commands.
//!
//! The first interrupt asks the run to stop gracefully. A second one means
//! the operator does not want to wait for the drain.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Cancel `token` on the first signal received, call `force_exit` on the
/// second.
///
/// Returns without doing anything further once the signal channel closes.
pub async fn watch_interrupts<F>(
    mut signals: mpsc::Receiver<()>,
    token: CancellationToken,
    force_exit: F,
) where
    F: FnOnce(),
{
    if signals.recv().await.is_none() {
        return;
    }
    log::warn!("Interrupted! Finishing in-flight items before exit (interrupt again to force)");
    token.cancel();

    if signals.recv().await.is_none() {
        return;
    }
    log::error!("Second interrupt received; exiting without draining");
    force_exit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_signal_cancels_second_forces_exit() {
        let (tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let forced = Arc::new(AtomicBool::new(false));

        let watcher = {
            let token = token.clone();
            let forced = Arc::clone(&forced);
            tokio::spawn(watch_interrupts(rx, token, move || {
                forced.store(true, Ordering::SeqCst)
            }))
        };

        tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("first signal did not cancel");
        assert!(!forced.load(Ordering::SeqCst));

        tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), watcher)
            .await
            .expect("watcher did not finish")
            .unwrap();
        assert!(forced.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_closed_channel_does_nothing() {
        let (tx, rx) = mpsc::channel::<()>(1);
        let token = CancellationToken::new();
        drop(tx);

        watch_interrupts(rx, token.clone(), || panic!("forced exit")).await;
        assert!(!token.is_cancelled());
    }
}
