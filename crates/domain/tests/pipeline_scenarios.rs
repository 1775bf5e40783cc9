//! End-to-end pipeline scenarios exercising the registry, status
//! engine, alert store, and bus together, the way the running service
//! wires them.

use std::sync::Arc;

use uuid::Uuid;

use domain::models::alert::{OperationalState, Severity};
use domain::models::device::{CatalogDevice, Schedule, TelemetryReading};
use domain::services::alert_bus::AlertBus;
use domain::services::alert_store::{AlertQuery, AlertStore, InMemoryAlertStore};
use domain::services::pipeline::{AlertPipeline, PipelineSettings, TelemetryOutcome};
use domain::services::registry::{DeviceRegistry, InMemoryRegistry};
use domain::services::status::{LivenessSignal, StatusEngine};

struct Harness {
    registry: Arc<InMemoryRegistry>,
    store: Arc<InMemoryAlertStore>,
    bus: AlertBus,
    pipeline: AlertPipeline,
}

fn harness() -> Harness {
    let registry = Arc::new(InMemoryRegistry::new());
    let store = Arc::new(InMemoryAlertStore::new());
    let bus = AlertBus::new(16);
    let pipeline = AlertPipeline::new(
        registry.clone(),
        store.clone(),
        bus.clone(),
        StatusEngine::new(LivenessSignal::Power, 40.0),
        PipelineSettings {
            utc_offset_minutes: 0,
            idle_timeout_secs: 300,
        },
    );
    Harness {
        registry,
        store,
        bus,
        pipeline,
    }
}

// Manual mode keeps the wall clock out of the assertions.
fn lamp(tenant_id: Uuid) -> CatalogDevice {
    CatalogDevice {
        address: "AA:BB:CC:DD:EE:01".into(),
        device_id: Uuid::new_v4(),
        tenant_id,
        name: "Lamp A1".into(),
        schedule: Schedule {
            hour_on: 0,
            minute_on: 0,
            hour_off: 23,
            minute_off: 59,
        },
        auto_mode: false,
        toggle: true,
    }
}

fn reading(address: &str, power: f64) -> TelemetryReading {
    TelemetryReading {
        address: address.into(),
        voltage: 230.0,
        current: power / 230.0,
        power,
        power_factor: 0.95,
        total_energy: 10.0,
        timestamp: chrono::Utc::now().timestamp(),
    }
}

#[tokio::test]
async fn test_full_outage_and_recovery_cycle() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let device = lamp(tenant);
    h.registry.upsert_from_catalog(&device).await.unwrap();

    let mut alerts = h.bus.subscribe();

    // Healthy load: classified, nothing alerted.
    let outcome = h.pipeline.on_telemetry(&reading(&device.address, 120.0)).await;
    match outcome {
        TelemetryOutcome::Evaluated(decision) => {
            assert_eq!(decision.state, OperationalState::Working);
            assert_eq!(decision.severity, Severity::Normal);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert!(h.store.is_empty().await);

    // Load drops while commanded on: one alert.
    let outcome = h.pipeline.on_telemetry(&reading(&device.address, 0.0)).await;
    match outcome {
        TelemetryOutcome::Evaluated(decision) => {
            assert_eq!(decision.state, OperationalState::PowerLost);
            assert_eq!(decision.severity, Severity::Critical);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(h.store.len().await, 1);

    // Sustained outage: no further alerts.
    h.pipeline.on_telemetry(&reading(&device.address, 0.0)).await;
    assert_eq!(h.store.len().await, 1);

    // Device goes silent: the sweep flags it.
    h.registry
        .force_last_seen(&device.address, Some(chrono::Utc::now().timestamp() - 600))
        .await;
    assert_eq!(h.pipeline.sweep_idle().await, 1);
    assert_eq!(h.store.len().await, 2);

    // Already disconnected: the next sweep is a no-op.
    assert_eq!(h.pipeline.sweep_idle().await, 0);

    // Telemetry resumes healthy: one recovery alert.
    h.pipeline.on_telemetry(&reading(&device.address, 120.0)).await;
    assert_eq!(h.store.len().await, 3);

    // Newest first: recovery, disconnect, outage.
    let history = h.store.query(AlertQuery::default()).await.unwrap();
    let states: Vec<_> = history.iter().map(|a| a.state).collect();
    assert_eq!(
        states,
        vec![
            OperationalState::Working,
            OperationalState::Disconnected,
            OperationalState::PowerLost,
        ]
    );
    assert_eq!(history[0].severity, Severity::Normal);
    assert!(history.iter().all(|a| a.tenant_id == tenant));

    // Every alert also went out on the bus, in emission order.
    let first = alerts.recv().await.unwrap();
    assert_eq!(first.state, OperationalState::PowerLost);
    let second = alerts.recv().await.unwrap();
    assert_eq!(second.state, OperationalState::Disconnected);
    let third = alerts.recv().await.unwrap();
    assert_eq!(third.state, OperationalState::Working);
}

#[tokio::test]
async fn test_unknown_address_is_discarded_and_remembered() {
    let h = harness();

    let outcome = h
        .pipeline
        .on_telemetry(&reading("AA:BB:CC:DD:EE:99", 50.0))
        .await;
    assert_eq!(outcome, TelemetryOutcome::UnknownDevice);
    assert!(h.store.is_empty().await);
    assert_eq!(
        h.pipeline.unknown_devices().await,
        vec!["AA:BB:CC:DD:EE:99".to_string()]
    );
}

#[tokio::test]
async fn test_store_outage_does_not_silence_the_bus() {
    let h = harness();
    let device = lamp(Uuid::new_v4());
    h.registry.upsert_from_catalog(&device).await.unwrap();
    h.pipeline.on_telemetry(&reading(&device.address, 120.0)).await;

    let mut alerts = h.bus.subscribe();
    h.store.set_failing(true);

    h.pipeline.on_telemetry(&reading(&device.address, 0.0)).await;

    // Nothing persisted, but the live alert still went out.
    assert!(h.store.is_empty().await);
    let published = alerts.recv().await.unwrap();
    assert_eq!(published.state, OperationalState::PowerLost);
    assert_eq!(published.address, device.address);
}

#[tokio::test]
async fn test_registry_outage_skips_reading() {
    let h = harness();
    let device = lamp(Uuid::new_v4());
    h.registry.upsert_from_catalog(&device).await.unwrap();

    h.registry.set_available(false);
    let outcome = h.pipeline.on_telemetry(&reading(&device.address, 120.0)).await;
    assert_eq!(outcome, TelemetryOutcome::Skipped);

    // Sweep is likewise a no-op during the outage.
    assert_eq!(h.pipeline.sweep_idle().await, 0);

    h.registry.set_available(true);
    let outcome = h.pipeline.on_telemetry(&reading(&device.address, 120.0)).await;
    assert!(matches!(outcome, TelemetryOutcome::Evaluated(_)));
}
