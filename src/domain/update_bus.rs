//! Snapshot feed from one inspection handler to the panel following it.
//!
//! A handler owns one [`UpdateBus`] for its whole life and publishes to it
//! whether or not anyone listens. A panel follows at most one handler at a
//! time: switching source drops the old receiver and calls
//! [`UpdateBus::follow`] on the new handler's bus. Every update carries the
//! complete variable list, so a panel that falls behind loses nothing by
//! jumping to the newest one; [`next_snapshot`] does exactly that.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use super::InspectorUpdate;

/// Per-handler feed of [`InspectorUpdate`] snapshots.
#[derive(Debug, Clone)]
pub struct UpdateBus {
    tx: broadcast::Sender<InspectorUpdate>,
}

impl UpdateBus {
    /// Feed retaining up to `capacity` snapshots for a slow panel.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Hands `update` to the following panel, if any. Returns `false` when
    /// nobody follows this handler; the update is then gone.
    pub fn publish(&self, update: InspectorUpdate) -> bool {
        self.tx.send(update).is_ok()
    }

    /// Starts following: the receiver sees snapshots published from now on.
    #[must_use]
    pub fn follow(&self) -> broadcast::Receiver<InspectorUpdate> {
        self.tx.subscribe()
    }

    /// `true` while at least one panel follows this handler.
    #[must_use]
    pub fn is_followed(&self) -> bool {
        self.tx.receiver_count() > 0
    }
}

/// Next snapshot for a following panel, in publish order. After falling
/// behind, the panel skips straight to the newest retained snapshot.
/// Returns `None` once the handler and its bus are gone.
///
/// Cancel safe.
pub async fn next_snapshot(
    rx: &mut broadcast::Receiver<InspectorUpdate>,
) -> Option<InspectorUpdate> {
    loop {
        match rx.recv().await {
            Ok(update) => return Some(update),
            Err(RecvError::Closed) => return None,
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "panel fell behind, jumping to newest snapshot");
                if let Some(newest) = drain_to_newest(rx) {
                    return Some(newest);
                }
            }
        }
    }
}

fn drain_to_newest(rx: &mut broadcast::Receiver<InspectorUpdate>) -> Option<InspectorUpdate> {
    let mut newest = None;
    loop {
        match rx.try_recv() {
            Ok(update) => newest = Some(update),
            Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return newest,
        }
    }
}
