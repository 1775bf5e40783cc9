//! Alert entity.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use domain::models::alert::{AlertRecord, OperationalState, Severity};

/// Database entity for persisted alerts.
///
/// State and severity are stored as their wire names (`power_lost`,
/// `critical`). Rows are append-only; there is no `updated_at`.
#[derive(Debug, Clone, FromRow)]
pub struct AlertEntity {
    /// Unique identifier.
    pub id: Uuid,

    /// Tenant the alerting device belongs to.
    pub tenant_id: Uuid,

    /// Device that transitioned.
    pub device_id: Uuid,

    /// Device display name at the time of the alert.
    pub device_name: String,

    /// Hardware address of the device.
    pub address: String,

    /// Operational state entered.
    pub state: String,

    /// Severity of the transition.
    pub severity: String,

    /// When the transition was observed.
    pub timestamp: DateTime<Utc>,
}

impl AlertEntity {
    /// Convert a row back into the domain record.
    ///
    /// Fails only if a row carries a state or severity name no longer
    /// known to the code, which means a bad migration.
    pub fn into_record(self) -> Result<AlertRecord, String> {
        Ok(AlertRecord {
            state: self.state.parse::<OperationalState>()?,
            severity: self.severity.parse::<Severity>()?,
            device_id: self.device_id,
            device_name: self.device_name,
            tenant_id: self.tenant_id,
            address: self.address,
            timestamp: self.timestamp,
        })
    }
}
