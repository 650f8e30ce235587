//! Small synchronization helpers.

use tokio::sync::watch;

/// Counts in-flight operations and lets a stopper wait until the count
/// drains to zero.
///
/// This is the explicit wait-for-drain primitive used by `stop` paths:
/// waiting on the gauge proves that every guarded operation has observed
/// the stop and exited.
pub(crate) struct InFlight {
    tx: watch::Sender<usize>,
}

impl InFlight {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    /// Mark one operation as in flight until the returned guard drops.
    pub(crate) fn enter(&self) -> InFlightGuard {
        self.tx.send_modify(|n| *n += 1);
        InFlightGuard {
            tx: self.tx.clone(),
        }
    }

    /// Wait until no operation is in flight. Returns immediately when the
    /// gauge is already idle.
    pub(crate) async fn wait_idle(&self) {
        let mut rx = self.tx.subscribe();
        // wait_for inspects the current value before awaiting changes.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

pub(crate) struct InFlightGuard {
    tx: watch::Sender<usize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tx.send_modify(|n| *n = n.saturating_sub(1));
    }
}
