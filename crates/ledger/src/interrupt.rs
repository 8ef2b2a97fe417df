//! Operator interrupt signalling.
//!
//! An [`InterruptSignal`] is raised once (normally by Ctrl-C) and stays raised.
//! The encoder races each child process against it and the batch driver checks
//! it before starting the next file.

use tokio::sync::watch;

/// Raises the paired [`InterruptSignal`].
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: watch::Sender<bool>,
}

impl InterruptHandle {
    pub fn raise(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes whether an interrupt has been requested.
#[derive(Debug, Clone)]
pub struct InterruptSignal {
    rx: watch::Receiver<bool>,
}

impl InterruptSignal {
    /// A signal that is never raised.
    pub fn never() -> Self {
        interrupt_channel().1
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once the signal is raised. Pends forever if the handle is gone
    /// without having raised it.
    pub async fn raised(&self) {
        let mut rx = self.rx.clone();
        let changed = rx.wait_for(|raised| *raised).await.map(|_| ());
        if changed.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn interrupt_channel() -> (InterruptHandle, InterruptSignal) {
    let (tx, rx) = watch::channel(false);
    (InterruptHandle { tx }, InterruptSignal { rx })
}

/// Spawns a task that raises the returned signal on Ctrl-C.
///
/// Must be called from within a tokio runtime.
pub fn listen_for_ctrl_c() -> InterruptSignal {
    let (handle, signal) = interrupt_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("interrupt received, stopping after cleanup");
                handle.raise();
            }
            Err(e) => tracing::error!("failed to listen for Ctrl-C: {}", e),
        }
    });
    signal
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_raise_is_observed() {
        let (handle, signal) = interrupt_channel();
        assert!(!signal.is_raised());

        handle.raise();
        assert!(signal.is_raised());
        tokio::time::timeout(Duration::from_secs(1), signal.raised())
            .await
            .expect("raised signal should resolve immediately");
    }

    #[tokio::test]
    async fn test_raise_wakes_waiter() {
        let (handle, signal) = interrupt_channel();
        let waiter = tokio::spawn(async move { signal.raised().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.raise();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_never_signal_pends() {
        let signal = InterruptSignal::never();
        assert!(!signal.is_raised());
        let result = tokio::time::timeout(Duration::from_millis(20), signal.raised()).await;
        assert!(result.is_err());
    }
}
