//! Device domain models.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::alert::{OperationalState, StatusDecision};
use shared::validation::{
    validate_epoch_seconds, validate_hour, validate_mac_address, validate_minute,
};

/// Daily on/off window a unit is scheduled to run in.
///
/// The window is half-open, `[on, off)`, and wraps past midnight when
/// `hour_off < hour_on` (the unit runs through the night).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[validate(custom(function = "validate_hour"))]
    pub hour_on: u8,
    #[validate(custom(function = "validate_minute"))]
    pub minute_on: u8,
    #[validate(custom(function = "validate_hour"))]
    pub hour_off: u8,
    #[validate(custom(function = "validate_minute"))]
    pub minute_off: u8,
}

impl Schedule {
    fn on_minutes(&self) -> u32 {
        self.hour_on as u32 * 60 + self.minute_on as u32
    }

    fn off_minutes(&self) -> u32 {
        self.hour_off as u32 * 60 + self.minute_off as u32
    }

    /// Whether the given local time falls inside the window.
    pub fn contains(&self, local: NaiveTime) -> bool {
        use chrono::Timelike;
        let now = local.hour() * 60 + local.minute();
        let on = self.on_minutes();
        let off = self.off_minutes();

        if self.hour_off < self.hour_on {
            // Wraps past midnight.
            now >= on || now < off
        } else {
            now >= on && now < off
        }
    }
}

/// A device record as delivered by the catalog collaborator.
///
/// Drives registry registration; the catalog is the source of truth for
/// a device's existence.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDevice {
    #[validate(custom(function = "validate_mac_address"))]
    pub address: String,
    pub device_id: Uuid,
    pub tenant_id: Uuid,
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[serde(flatten)]
    #[validate(nested)]
    pub schedule: Schedule,
    pub auto_mode: bool,
    pub toggle: bool,
}

/// One validated telemetry reading from a power-control unit.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReading {
    #[validate(custom(function = "validate_mac_address"))]
    pub address: String,
    #[validate(range(min = 0.0, message = "Voltage must be non-negative"))]
    pub voltage: f64,
    #[validate(range(min = 0.0, message = "Current must be non-negative"))]
    pub current: f64,
    #[validate(range(min = 0.0, message = "Power must be non-negative"))]
    pub power: f64,
    pub power_factor: f64,
    pub total_energy: f64,
    /// Reading time in epoch seconds, as reported by the unit.
    #[validate(custom(function = "validate_epoch_seconds"))]
    pub timestamp: i64,
}

/// Registry entry: one snapshot per hardware address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub address: String,
    pub device_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub schedule: Schedule,
    pub auto_mode: bool,
    pub toggle: bool,

    pub voltage: f64,
    pub current: f64,
    pub power: f64,
    pub power_factor: f64,
    pub total_energy: f64,

    /// Derived (state, severity) pair; `None` before first evaluation.
    #[serde(flatten)]
    pub status: Option<StatusDecision>,
    /// Epoch seconds of the most recent telemetry or registry refresh.
    pub last_seen: Option<i64>,
}

impl DeviceSnapshot {
    /// Fresh snapshot for a newly registered device, no telemetry yet.
    pub fn from_catalog(device: &CatalogDevice, now: i64) -> Self {
        Self {
            address: device.address.clone(),
            device_id: device.device_id,
            tenant_id: device.tenant_id,
            name: device.name.clone(),
            schedule: device.schedule,
            auto_mode: device.auto_mode,
            toggle: device.toggle,
            voltage: 0.0,
            current: 0.0,
            power: 0.0,
            power_factor: 0.0,
            total_energy: 0.0,
            status: None,
            last_seen: Some(now),
        }
    }

    /// Overwrite control fields from the catalog, keeping derived state
    /// and last telemetry intact.
    pub fn apply_catalog(&mut self, device: &CatalogDevice) {
        self.device_id = device.device_id;
        self.tenant_id = device.tenant_id;
        self.name = device.name.clone();
        self.schedule = device.schedule;
        self.auto_mode = device.auto_mode;
        self.toggle = device.toggle;
    }

    /// Merge a telemetry reading and refresh `last_seen`.
    ///
    /// A previously `Disconnected` state is cleared so the idle sweeper
    /// does not immediately re-flag a device that just came back.
    pub fn apply_telemetry(&mut self, reading: &TelemetryReading, now: i64) {
        self.voltage = reading.voltage;
        self.current = reading.current;
        self.power = reading.power;
        self.power_factor = reading.power_factor;
        self.total_energy = reading.total_energy;
        self.last_seen = Some(now);
        if self.status.map(|s| s.state) == Some(OperationalState::Disconnected) {
            self.status = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(hour_on: u8, minute_on: u8, hour_off: u8, minute_off: u8) -> Schedule {
        Schedule {
            hour_on,
            minute_on,
            hour_off,
            minute_off,
        }
    }

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_schedule_plain_window() {
        let s = schedule(8, 0, 17, 30);
        assert!(s.contains(at(8, 0)));
        assert!(s.contains(at(12, 0)));
        assert!(s.contains(at(17, 29)));
        assert!(!s.contains(at(17, 30)));
        assert!(!s.contains(at(7, 59)));
        assert!(!s.contains(at(23, 0)));
    }

    #[test]
    fn test_schedule_wraps_past_midnight() {
        // Runs overnight: 18:00 through 05:00.
        let s = schedule(18, 0, 5, 0);
        assert!(s.contains(at(23, 0)));
        assert!(s.contains(at(2, 0)));
        assert!(s.contains(at(18, 0)));
        assert!(!s.contains(at(10, 0)));
        assert!(!s.contains(at(5, 0)));
        assert!(!s.contains(at(17, 59)));
    }

    #[test]
    fn test_catalog_device_validation() {
        let device = CatalogDevice {
            address: "AA:BB:CC:DD:EE:FF".into(),
            device_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Street lamp 12".into(),
            schedule: schedule(18, 0, 5, 0),
            auto_mode: true,
            toggle: true,
        };
        assert!(device.validate().is_ok());

        let bad = CatalogDevice {
            address: "nope".into(),
            ..device.clone()
        };
        assert!(bad.validate().is_err());

        let bad_schedule = CatalogDevice {
            schedule: schedule(25, 0, 5, 0),
            ..device
        };
        assert!(bad_schedule.validate().is_err());
    }

    #[test]
    fn test_apply_telemetry_clears_disconnected() {
        let catalog = CatalogDevice {
            address: "AA:BB:CC:DD:EE:FF".into(),
            device_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Pump".into(),
            schedule: schedule(0, 0, 23, 59),
            auto_mode: false,
            toggle: true,
        };
        let mut snapshot = DeviceSnapshot::from_catalog(&catalog, 1_000);
        snapshot.status = Some(StatusDecision::new(
            OperationalState::Disconnected,
            crate::models::alert::Severity::Critical,
        ));

        let reading = TelemetryReading {
            address: catalog.address.clone(),
            voltage: 231.0,
            current: 1.4,
            power: 320.0,
            power_factor: 0.96,
            total_energy: 12.5,
            timestamp: 2_000,
        };
        snapshot.apply_telemetry(&reading, 2_000);

        assert_eq!(snapshot.status, None);
        assert_eq!(snapshot.last_seen, Some(2_000));
        assert_eq!(snapshot.power, 320.0);
    }

    #[test]
    fn test_apply_catalog_preserves_state() {
        let catalog = CatalogDevice {
            address: "AA:BB:CC:DD:EE:FF".into(),
            device_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Pump".into(),
            schedule: schedule(8, 0, 17, 0),
            auto_mode: false,
            toggle: true,
        };
        let mut snapshot = DeviceSnapshot::from_catalog(&catalog, 1_000);
        snapshot.status = Some(StatusDecision::new(
            OperationalState::Working,
            crate::models::alert::Severity::Normal,
        ));

        let updated = CatalogDevice {
            name: "Pump (basement)".into(),
            toggle: false,
            ..catalog
        };
        snapshot.apply_catalog(&updated);

        assert_eq!(snapshot.name, "Pump (basement)");
        assert!(!snapshot.toggle);
        assert_eq!(
            snapshot.status.map(|s| s.state),
            Some(OperationalState::Working)
        );
    }
}
