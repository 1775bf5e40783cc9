//! Alert store abstraction: an append-only, tenant-scoped log of state
//! transitions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::alert::AlertRecord;

/// The only failure an alert store surfaces: transiently unreachable.
/// Callers log a warning and carry on; the alert is still published so
/// live clients are not blinded by a store outage.
#[derive(Debug, Error)]
#[error("alert store unavailable: {0}")]
pub struct AlertStoreUnavailable(pub String);

/// Time-range filter for alert queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertQuery {
    pub tenant_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Append-only alert persistence.
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Append one alert row. Rows are immutable once written.
    async fn append(&self, alert: &AlertRecord) -> Result<(), AlertStoreUnavailable>;

    /// Fetch alerts, newest first, optionally filtered by tenant and
    /// time range.
    async fn query(&self, query: AlertQuery) -> Result<Vec<AlertRecord>, AlertStoreUnavailable>;
}

/// In-process alert store for development and tests.
#[derive(Default)]
pub struct InMemoryAlertStore {
    records: RwLock<Vec<AlertRecord>>,
    fail_appends: std::sync::atomic::AtomicBool,
}

impl InMemoryAlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage for append operations.
    pub fn set_failing(&self, failing: bool) {
        self.fail_appends
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of persisted alerts, for assertions.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn append(&self, alert: &AlertRecord) -> Result<(), AlertStoreUnavailable> {
        if self.fail_appends.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AlertStoreUnavailable("simulated outage".into()));
        }
        self.records.write().await.push(alert.clone());
        Ok(())
    }

    async fn query(&self, query: AlertQuery) -> Result<Vec<AlertRecord>, AlertStoreUnavailable> {
        let records = self.records.read().await;
        let mut matched: Vec<AlertRecord> = records
            .iter()
            .filter(|r| query.tenant_id.map_or(true, |t| r.tenant_id == t))
            .filter(|r| query.from.map_or(true, |from| r.timestamp >= from))
            .filter(|r| query.to.map_or(true, |to| r.timestamp <= to))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::alert::{OperationalState, Severity};
    use chrono::Duration;

    fn record(tenant_id: Uuid, age_minutes: i64) -> AlertRecord {
        AlertRecord {
            state: OperationalState::PowerLost,
            severity: Severity::Critical,
            device_id: Uuid::new_v4(),
            device_name: "Lamp".into(),
            tenant_id,
            address: "AA:BB:CC:DD:EE:FF".into(),
            timestamp: Utc::now() - Duration::minutes(age_minutes),
        }
    }

    #[tokio::test]
    async fn test_query_filters_by_tenant() {
        let store = InMemoryAlertStore::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        store.append(&record(tenant_a, 1)).await.unwrap();
        store.append(&record(tenant_b, 2)).await.unwrap();

        let result = store
            .query(AlertQuery {
                tenant_id: Some(tenant_a),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].tenant_id, tenant_a);
    }

    #[tokio::test]
    async fn test_query_time_range_newest_first() {
        let store = InMemoryAlertStore::new();
        let tenant = Uuid::new_v4();
        store.append(&record(tenant, 90)).await.unwrap();
        store.append(&record(tenant, 30)).await.unwrap();
        store.append(&record(tenant, 5)).await.unwrap();

        let result = store
            .query(AlertQuery {
                tenant_id: Some(tenant),
                from: Some(Utc::now() - Duration::hours(1)),
                to: None,
            })
            .await
            .unwrap();
        assert_eq!(result.len(), 2);
        assert!(result[0].timestamp > result[1].timestamp);
    }

    #[tokio::test]
    async fn test_failing_append_reports_unavailable() {
        let store = InMemoryAlertStore::new();
        store.set_failing(true);
        assert!(store.append(&record(Uuid::new_v4(), 0)).await.is_err());
        assert!(store.is_empty().await);
    }
}
