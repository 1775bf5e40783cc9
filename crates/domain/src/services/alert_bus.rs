//! Alert bus: the in-process channel carrying published alerts from the
//! pipeline and the idle sweeper to the real-time fan-out.

use tokio::sync::broadcast;

use crate::models::alert::AlertRecord;

/// Default channel capacity; slow subscribers that fall this far behind
/// see a `Lagged` error and resume from the current position.
pub const DEFAULT_CAPACITY: usize = 256;

/// Cheap-to-clone handle for publishing and subscribing to alerts.
///
/// Alerts are tenant-tagged; subscribers partition by
/// `AlertRecord::tenant_id` themselves.
#[derive(Clone)]
pub struct AlertBus {
    tx: broadcast::Sender<AlertRecord>,
}

impl AlertBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an alert. Returns the number of live subscribers;
    /// zero subscribers is not an error.
    pub fn publish(&self, alert: AlertRecord) -> usize {
        self.tx.send(alert).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertRecord> {
        self.tx.subscribe()
    }
}

impl Default for AlertBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
