use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use domain::models::alert::AlertRecord;
use domain::models::device::DeviceSnapshot;
use domain::services::alert_bus::AlertBus;
use domain::services::registry::DeviceRegistry;
use shared::jwt::{ClientIdentity, TenantScope};

/// A registered client's receiving end. Dropping it makes the hub
/// treat the client as dead on the next delivery attempt.
pub struct ClientHandle {
    pub conn_id: Uuid,
    pub rx: mpsc::UnboundedReceiver<String>,
}

struct Connection {
    client_id: String,
    scope: TenantScope,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
struct Bucket {
    connections: HashMap<Uuid, Connection>,
}

impl Bucket {
    fn insert(&mut self, identity: &ClientIdentity) -> ClientHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = Uuid::new_v4();
        self.connections.insert(
            conn_id,
            Connection {
                client_id: identity.client_id.clone(),
                scope: identity.scope,
                tx,
            },
        );
        ClientHandle { conn_id, rx }
    }

    /// Connections that should see traffic for `tenant`: the tenant's
    /// own clients plus every superuser.
    fn recipients_for(&self, tenant: Uuid) -> Vec<Uuid> {
        self.connections
            .iter()
            .filter(|(_, conn)| match conn.scope {
                TenantScope::Tenant(t) => t == tenant,
                TenantScope::Superuser => true,
            })
            .map(|(id, _)| *id)
            .collect()
    }
}

#[derive(Default)]
struct AlertChannel {
    bucket: Bucket,
    /// Most recent alert payload per tenant.
    last_payload: HashMap<Uuid, String>,
    /// tenant -> client id -> payload that client acknowledged.
    acknowledged: HashMap<Uuid, HashMap<String, String>>,
}

impl AlertChannel {
    fn has_acknowledged(&self, tenant: Uuid, client_id: &str, payload: &str) -> bool {
        self.acknowledged
            .get(&tenant)
            .and_then(|by_client| by_client.get(client_id))
            .map(|acked| acked == payload)
            .unwrap_or(false)
    }

    /// Drop a dead client's ack entries so a later reconnect gets the
    /// current alert replayed.
    fn scrub_acks(&mut self, client_id: &str, scope: TenantScope) {
        match scope {
            TenantScope::Tenant(tenant) => {
                if let Some(by_client) = self.acknowledged.get_mut(&tenant) {
                    by_client.remove(client_id);
                }
            }
            TenantScope::Superuser => {
                for by_client in self.acknowledged.values_mut() {
                    by_client.remove(client_id);
                }
            }
        }
    }
}

/// Handles for the hub's background tasks.
pub struct FanoutTasks {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl FanoutTasks {
    /// Signal both loops and wait for them to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!("fan-out task panicked: {}", e);
            }
        }
        info!("fan-out stopped");
    }
}

/// Tenant-partitioned fan-out of status snapshots and alerts.
///
/// Each channel's state sits behind its own mutex, so registration and
/// a broadcast never interleave mid-iteration, while the monitor and
/// alert channels never block each other.
pub struct FanoutHub {
    registry: Arc<dyn DeviceRegistry>,
    bus: AlertBus,
    broadcast_interval: Duration,
    monitor: Mutex<Bucket>,
    alerts: Mutex<AlertChannel>,
}

impl FanoutHub {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        bus: AlertBus,
        broadcast_interval: Duration,
    ) -> Self {
        Self {
            registry,
            bus,
            broadcast_interval,
            monitor: Mutex::new(Bucket::default()),
            alerts: Mutex::new(AlertChannel::default()),
        }
    }

    /// Register a status-stream client. Call only with a resolved
    /// identity.
    pub async fn register_monitor(&self, identity: &ClientIdentity) -> ClientHandle {
        let mut bucket = self.monitor.lock().await;
        let handle = bucket.insert(identity);
        debug!(client_id = %identity.client_id, "monitor client registered");
        handle
    }

    /// Register an alert-stream client and replay the current alert
    /// for its scope, unless this client already acknowledged that
    /// exact payload.
    pub async fn register_alerts(&self, identity: &ClientIdentity) -> ClientHandle {
        let mut channel = self.alerts.lock().await;
        let handle = channel.bucket.insert(identity);

        let replay: Vec<String> = match identity.scope {
            TenantScope::Tenant(tenant) => channel
                .last_payload
                .get(&tenant)
                .filter(|payload| {
                    !channel.has_acknowledged(tenant, &identity.client_id, payload)
                })
                .cloned()
                .into_iter()
                .collect(),
            TenantScope::Superuser => channel
                .last_payload
                .iter()
                .filter(|(tenant, payload)| {
                    !channel.has_acknowledged(**tenant, &identity.client_id, payload)
                })
                .map(|(_, payload)| payload.clone())
                .collect(),
        };

        if let Some(conn) = channel.bucket.connections.get(&handle.conn_id) {
            for payload in replay {
                let _ = conn.tx.send(payload);
            }
        }
        debug!(client_id = %identity.client_id, "alert client registered");
        handle
    }

    /// Remove a monitor connection after its socket closed.
    pub async fn disconnect_monitor(&self, conn_id: Uuid) {
        self.monitor.lock().await.connections.remove(&conn_id);
    }

    /// Remove an alert connection after its socket closed. The
    /// client's acknowledgments are kept so a clean reconnect does not
    /// get an already-acked alert replayed.
    pub async fn disconnect_alerts(&self, conn_id: Uuid) {
        self.alerts.lock().await.bucket.connections.remove(&conn_id);
    }

    /// Record that the connection's client acknowledged the current
    /// alert payload for every tenant in its scope.
    pub async fn acknowledge(&self, conn_id: Uuid) {
        let mut channel = self.alerts.lock().await;
        let Some((client_id, scope)) = channel
            .bucket
            .connections
            .get(&conn_id)
            .map(|c| (c.client_id.clone(), c.scope))
        else {
            return;
        };

        let tenants: Vec<Uuid> = match scope {
            TenantScope::Tenant(tenant) => vec![tenant],
            TenantScope::Superuser => channel.last_payload.keys().copied().collect(),
        };
        for tenant in tenants {
            if let Some(payload) = channel.last_payload.get(&tenant).cloned() {
                channel
                    .acknowledged
                    .entry(tenant)
                    .or_default()
                    .insert(client_id.clone(), payload);
            }
        }
        debug!(client_id = %client_id, "alert acknowledged");
    }

    /// Push one snapshot batch per tenant to the monitor channel.
    /// Returns the number of messages delivered.
    ///
    /// With no clients connected this is a no-op that never touches
    /// the registry.
    pub async fn broadcast_status(&self) -> usize {
        let mut bucket = self.monitor.lock().await;
        if bucket.connections.is_empty() {
            return 0;
        }

        let snapshots = match self.registry.list_all().await {
            Ok(snapshots) => snapshots,
            Err(_) => {
                warn!("registry unavailable, skipping status broadcast");
                return 0;
            }
        };

        let mut by_tenant: HashMap<Uuid, Vec<&DeviceSnapshot>> = HashMap::new();
        for snapshot in &snapshots {
            by_tenant.entry(snapshot.tenant_id).or_default().push(snapshot);
        }

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (conn_id, conn) in bucket.connections.iter() {
            let devices: Vec<&&DeviceSnapshot> = match conn.scope {
                TenantScope::Tenant(tenant) => by_tenant
                    .get(&tenant)
                    .map(|list| list.iter().collect())
                    .unwrap_or_default(),
                TenantScope::Superuser => by_tenant.values().flatten().collect(),
            };
            let message = json!({ "type": "status", "devices": devices }).to_string();
            if conn.tx.send(message).is_ok() {
                delivered += 1;
            } else {
                dead.push(*conn_id);
            }
        }
        for conn_id in dead {
            bucket.connections.remove(&conn_id);
        }

        counter!("status_broadcast_messages_total").increment(delivered as u64);
        delivered
    }

    /// Distribute one alert to its tenant's clients and superusers.
    /// Returns the number of clients reached; 0 when the payload is
    /// unchanged for the tenant.
    pub async fn publish_alert(&self, record: &AlertRecord) -> usize {
        let payload = json!({ "type": "alert", "alert": record }).to_string();
        let tenant = record.tenant_id;

        let mut channel = self.alerts.lock().await;
        if channel.last_payload.get(&tenant) == Some(&payload) {
            return 0;
        }
        channel.last_payload.insert(tenant, payload.clone());
        // A new alert invalidates every previous acknowledgment for
        // the tenant.
        channel.acknowledged.remove(&tenant);

        let recipients = channel.bucket.recipients_for(tenant);
        let mut delivered = 0;
        let mut dead = Vec::new();
        for conn_id in recipients {
            let Some(conn) = channel.bucket.connections.get(&conn_id) else {
                continue;
            };
            if conn.tx.send(payload.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(conn_id);
            }
        }
        for conn_id in dead {
            if let Some(conn) = channel.bucket.connections.remove(&conn_id) {
                channel.scrub_acks(&conn.client_id, conn.scope);
            }
        }

        counter!("alerts_fanned_out_total").increment(delivered as u64);
        delivered
    }

    /// Spawn the status tick and the alert-bus listener.
    pub fn start(self: &Arc<Self>) -> FanoutTasks {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        {
            let hub = Arc::clone(self);
            let mut shutdown_rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(hub.broadcast_interval);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            hub.broadcast_status().await;
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }));
        }

        {
            let hub = Arc::clone(self);
            let mut rx = self.bus.subscribe();
            let mut shutdown_rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        received = rx.recv() => {
                            match received {
                                Ok(record) => {
                                    hub.publish_alert(&record).await;
                                }
                                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                    warn!(skipped, "alert listener lagged, resuming");
                                }
                                Err(broadcast::error::RecvError::Closed) => break,
                            }
                        }
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }));
        }

        info!(
            broadcast_interval = ?self.broadcast_interval,
            "fan-out started"
        );
        FanoutTasks {
            shutdown_tx,
            handles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::models::alert::{OperationalState, Severity};
    use domain::models::device::{CatalogDevice, Schedule};
    use domain::services::registry::{DeviceRegistry, InMemoryRegistry};

    fn identity(tenant: Option<Uuid>, client_id: &str) -> ClientIdentity {
        ClientIdentity {
            client_id: client_id.to_string(),
            scope: match tenant {
                Some(t) => TenantScope::Tenant(t),
                None => TenantScope::Superuser,
            },
        }
    }

    fn catalog_device(address: &str, tenant: Uuid) -> CatalogDevice {
        CatalogDevice {
            address: address.into(),
            device_id: Uuid::new_v4(),
            tenant_id: tenant,
            name: format!("Lamp {address}"),
            schedule: Schedule {
                hour_on: 18,
                minute_on: 0,
                hour_off: 5,
                minute_off: 0,
            },
            auto_mode: true,
            toggle: true,
        }
    }

    fn alert(tenant: Uuid, state: OperationalState) -> AlertRecord {
        AlertRecord {
            state,
            severity: Severity::Critical,
            device_id: Uuid::new_v4(),
            device_name: "Lamp".into(),
            tenant_id: tenant,
            address: "AA:BB:CC:DD:EE:FF".into(),
            timestamp: Utc::now(),
        }
    }

    async fn hub_with_registry() -> (Arc<FanoutHub>, Arc<InMemoryRegistry>) {
        let registry = Arc::new(InMemoryRegistry::new());
        let hub = Arc::new(FanoutHub::new(
            registry.clone(),
            AlertBus::default(),
            Duration::from_secs(5),
        ));
        (hub, registry)
    }

    #[tokio::test]
    async fn test_status_broadcast_partitions_by_tenant() {
        let (hub, registry) = hub_with_registry().await;
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        registry
            .upsert_from_catalog(&catalog_device("AA:BB:CC:DD:EE:01", tenant_a))
            .await
            .unwrap();
        registry
            .upsert_from_catalog(&catalog_device("AA:BB:CC:DD:EE:02", tenant_b))
            .await
            .unwrap();

        let mut client_a = hub.register_monitor(&identity(Some(tenant_a), "a")).await;
        let mut admin = hub.register_monitor(&identity(None, "admin")).await;

        assert_eq!(hub.broadcast_status().await, 2);

        let message: serde_json::Value =
            serde_json::from_str(&client_a.rx.recv().await.unwrap()).unwrap();
        let devices = message["devices"].as_array().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0]["tenantId"], tenant_a.to_string());

        let message: serde_json::Value =
            serde_json::from_str(&admin.rx.recv().await.unwrap()).unwrap();
        assert_eq!(message["devices"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_broadcast_skips_without_clients() {
        let (hub, registry) = hub_with_registry().await;
        registry
            .upsert_from_catalog(&catalog_device("AA:BB:CC:DD:EE:03", Uuid::new_v4()))
            .await
            .unwrap();
        // No clients: no work, even with devices present.
        assert_eq!(hub.broadcast_status().await, 0);
    }

    #[tokio::test]
    async fn test_alert_reaches_tenant_and_superuser_only() {
        let (hub, _) = hub_with_registry().await;
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();

        let mut client_a = hub.register_alerts(&identity(Some(tenant_a), "a")).await;
        let mut client_b = hub.register_alerts(&identity(Some(tenant_b), "b")).await;
        let mut admin = hub.register_alerts(&identity(None, "admin")).await;

        assert_eq!(
            hub.publish_alert(&alert(tenant_a, OperationalState::PowerLost))
                .await,
            2
        );

        assert!(client_a.rx.try_recv().is_ok());
        assert!(admin.rx.try_recv().is_ok());
        assert!(client_b.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unchanged_payload_not_repeated() {
        let (hub, _) = hub_with_registry().await;
        let tenant = Uuid::new_v4();
        let record = alert(tenant, OperationalState::PowerLost);

        let mut client = hub.register_alerts(&identity(Some(tenant), "a")).await;
        assert_eq!(hub.publish_alert(&record).await, 1);
        assert_eq!(hub.publish_alert(&record).await, 0);
        assert!(client.rx.try_recv().is_ok());
        assert!(client.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_replay_on_connect_unless_acked() {
        let (hub, _) = hub_with_registry().await;
        let tenant = Uuid::new_v4();
        hub.publish_alert(&alert(tenant, OperationalState::PowerLost))
            .await;

        // Fresh client gets the current alert immediately.
        let mut client = hub.register_alerts(&identity(Some(tenant), "a")).await;
        assert!(client.rx.try_recv().is_ok());

        // Ack, disconnect, reconnect: no replay of the acked payload.
        hub.acknowledge(client.conn_id).await;
        hub.disconnect_alerts(client.conn_id).await;
        let mut client = hub.register_alerts(&identity(Some(tenant), "a")).await;
        assert!(client.rx.try_recv().is_err());

        // A new alert invalidates the ack.
        hub.publish_alert(&alert(tenant, OperationalState::Disconnected))
            .await;
        assert!(client.rx.try_recv().is_ok());
        hub.disconnect_alerts(client.conn_id).await;
        let mut client = hub.register_alerts(&identity(Some(tenant), "a")).await;
        assert!(client.rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_dead_client_scrubbed_on_send_failure() {
        let (hub, _) = hub_with_registry().await;
        let tenant = Uuid::new_v4();

        let client = hub.register_alerts(&identity(Some(tenant), "a")).await;
        drop(client.rx);

        assert_eq!(
            hub.publish_alert(&alert(tenant, OperationalState::PowerLost))
                .await,
            0
        );
        assert!(hub
            .alerts
            .lock()
            .await
            .bucket
            .connections
            .is_empty());
    }

    #[tokio::test]
    async fn test_start_and_stop_lifecycle() {
        let (hub, _) = hub_with_registry().await;
        let tasks = hub.start();

        let tenant = Uuid::new_v4();
        let mut client = hub.register_alerts(&identity(Some(tenant), "a")).await;
        hub.bus.publish(alert(tenant, OperationalState::PowerLost));

        let received = tokio::time::timeout(Duration::from_secs(1), client.rx.recv())
            .await
            .expect("alert should arrive")
            .expect("channel open");
        assert!(received.contains("\"type\":\"alert\""));

        tasks.stop().await;
    }
}
