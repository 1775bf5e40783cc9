//! Alert pipeline: the stateful path from a telemetry reading to a
//! persisted and published alert.
//!
//! Every reading updates the registry and runs the status engine; an
//! alert is produced only on a state *transition*, and only when the
//! device is entering or leaving an alertable severity. That gives one
//! alert when a fault appears and one when it clears, with nothing in
//! between. The idle sweeper shares the same persist+publish path.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::alert::{AlertRecord, OperationalState, Severity, StatusDecision};
use crate::models::device::{DeviceSnapshot, TelemetryReading};
use crate::services::alert_bus::AlertBus;
use crate::services::alert_store::AlertStore;
use crate::services::registry::{DeviceRegistry, RegistryError};
use crate::services::status::{StatusEngine, StatusInput};

/// How many unknown-device addresses to keep for operator triage.
const UNKNOWN_DEVICE_CAPACITY: usize = 64;

/// Pipeline tuning knobs; all of these changed across this system's
/// history, so none are constants.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Fixed UTC offset, in minutes, of the site's local time. Schedule
    /// windows are evaluated against this clock.
    pub utc_offset_minutes: i32,
    /// Seconds of silence after which a device counts as idle.
    pub idle_timeout_secs: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            idle_timeout_secs: 300,
        }
    }
}

/// What happened to one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryOutcome {
    /// Reading merged and classified.
    Evaluated(StatusDecision),
    /// Address not in the registry; reading discarded.
    UnknownDevice,
    /// Registry unavailable; nothing happened this cycle.
    Skipped,
}

pub struct AlertPipeline {
    registry: Arc<dyn DeviceRegistry>,
    store: Arc<dyn AlertStore>,
    bus: AlertBus,
    engine: StatusEngine,
    offset: FixedOffset,
    idle_timeout_secs: i64,
    /// Recently seen addresses with no catalog entry, oldest first.
    unknown: Mutex<VecDeque<String>>,
}

impl AlertPipeline {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        store: Arc<dyn AlertStore>,
        bus: AlertBus,
        engine: StatusEngine,
        settings: PipelineSettings,
    ) -> Self {
        let offset = FixedOffset::east_opt(settings.utc_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
        Self {
            registry,
            store,
            bus,
            engine,
            offset,
            idle_timeout_secs: settings.idle_timeout_secs,
            unknown: Mutex::new(VecDeque::new()),
        }
    }

    /// Process one validated telemetry reading.
    ///
    /// Duplicate suppression snapshots the previous status once, before
    /// the merge overwrites it. Two concurrent readings for the same
    /// device can both observe the same previous status and publish the
    /// same alert twice; consumers are idempotent by content, so this
    /// narrow race is tolerated rather than locked away.
    pub async fn on_telemetry(&self, reading: &TelemetryReading) -> TelemetryOutcome {
        counter!("telemetry_processed_total").increment(1);

        let previous = match self.registry.get(&reading.address).await {
            Ok(snapshot) => snapshot,
            Err(RegistryError::NotFound) => {
                self.record_unknown(&reading.address).await;
                return TelemetryOutcome::UnknownDevice;
            }
            Err(RegistryError::Unavailable) => {
                warn!(address = %reading.address, "registry unavailable, dropping reading");
                return TelemetryOutcome::Skipped;
            }
        };
        let previous_status = previous.status;

        let merged = match self.registry.merge_telemetry(&reading.address, reading).await {
            Ok(snapshot) => snapshot,
            Err(RegistryError::NotFound) => {
                // Device removed between lookup and merge.
                return TelemetryOutcome::UnknownDevice;
            }
            Err(RegistryError::Unavailable) => {
                warn!(address = %reading.address, "registry unavailable, dropping reading");
                return TelemetryOutcome::Skipped;
            }
        };

        let local = Utc::now().with_timezone(&self.offset).time();
        let input = StatusInput {
            power: merged.power,
            voltage: merged.voltage,
            toggle: merged.toggle,
            auto_mode: merged.auto_mode,
            in_schedule: merged.schedule.contains(local),
        };
        let decision = self.engine.evaluate(Some(&input));

        if let Err(err) = self.registry.set_status(&reading.address, decision).await {
            if err == RegistryError::Unavailable {
                warn!(address = %reading.address, "registry unavailable, status not recorded");
            }
            return TelemetryOutcome::Skipped;
        }

        if previous_status.map(|p| p.state) == Some(decision.state) {
            // Sustained condition, already alerted.
            return TelemetryOutcome::Evaluated(decision);
        }
        let crossing = decision.severity.is_alertable()
            || previous_status.map_or(false, |p| p.severity.is_alertable());
        if !crossing {
            // Benign shuffle, e.g. Working to Off under manual control.
            return TelemetryOutcome::Evaluated(decision);
        }

        self.emit(&merged, decision).await;
        TelemetryOutcome::Evaluated(decision)
    }

    /// Flag devices silent past the idle threshold as disconnected and
    /// alert on each transition. Returns the number of devices flipped.
    ///
    /// Absence of telemetry is itself conclusive, so the status engine
    /// is not consulted. A single device's failure never aborts the
    /// sweep for the rest.
    pub async fn sweep_idle(&self) -> usize {
        let snapshots = match self.registry.list_all().await {
            Ok(snapshots) => snapshots,
            Err(_) => {
                warn!("registry unavailable, skipping idle sweep");
                return 0;
            }
        };

        let now = Utc::now().timestamp();
        let mut transitioned = 0;

        for snapshot in snapshots {
            if snapshot.status.map(|s| s.state) == Some(OperationalState::Disconnected) {
                continue;
            }
            let idle = match snapshot.last_seen {
                Some(last_seen) => now - last_seen > self.idle_timeout_secs,
                None => true,
            };
            if !idle {
                continue;
            }

            let decision =
                StatusDecision::new(OperationalState::Disconnected, Severity::Critical);
            match self.registry.set_status(&snapshot.address, decision).await {
                Ok(()) => {}
                Err(RegistryError::NotFound) => continue,
                Err(RegistryError::Unavailable) => {
                    warn!(address = %snapshot.address, "registry unavailable mid-sweep");
                    continue;
                }
            }

            self.emit(&snapshot, decision).await;
            counter!("idle_sweep_disconnects_total").increment(1);
            transitioned += 1;
        }

        if transitioned > 0 {
            info!(count = transitioned, "marked idle devices as disconnected");
        }
        transitioned
    }

    /// Recently seen addresses with no catalog entry.
    pub async fn unknown_devices(&self) -> Vec<String> {
        self.unknown.lock().await.iter().cloned().collect()
    }

    /// Persist and publish one alert. A store outage downgrades to a
    /// warning and the alert is still published, so dashboards stay
    /// live during the outage; duplicate delivery on recovery is
    /// possible and expected.
    async fn emit(&self, snapshot: &DeviceSnapshot, decision: StatusDecision) {
        let alert = AlertRecord {
            state: decision.state,
            severity: decision.severity,
            device_id: snapshot.device_id,
            device_name: snapshot.name.clone(),
            tenant_id: snapshot.tenant_id,
            address: snapshot.address.clone(),
            timestamp: Utc::now(),
        };

        if let Err(err) = self.store.append(&alert).await {
            warn!(
                address = %alert.address,
                state = %alert.state,
                error = %err,
                "alert not persisted, publishing anyway"
            );
        }

        let subscribers = self.bus.publish(alert.clone());
        counter!("alerts_emitted_total", "severity" => decision.severity.to_string())
            .increment(1);
        debug!(
            address = %alert.address,
            state = %alert.state,
            severity = %alert.severity,
            subscribers,
            "alert published"
        );
    }

    async fn record_unknown(&self, address: &str) {
        let mut unknown = self.unknown.lock().await;
        if unknown.iter().any(|a| a == address) {
            return;
        }
        if unknown.len() >= UNKNOWN_DEVICE_CAPACITY {
            unknown.pop_front();
        }
        unknown.push_back(address.to_string());
        debug!(address = %address, "telemetry from unregistered device discarded");
    }
}
