//! Real-time fan-out hub.
//!
//! Tenant-partitioned distribution of device status snapshots and
//! alerts to WebSocket dashboards. The hub owns two channels: the
//! monitor channel receives a batched status message on a fixed cadence
//! and the alert channel receives alerts as the pipeline publishes
//! them, with per-client acknowledgment tracking and replay-on-connect.
//!
//! The hub is constructed explicitly and injected; there are no
//! process-global connection tables. Clients are registered only after
//! their credential resolved, so an unauthenticated socket never
//! appears in any bucket.

mod hub;

pub use hub::{ClientHandle, FanoutHub, FanoutTasks};
