//! Domain layer for the Power Monitor backend.
//!
//! This crate contains:
//! - Domain models (device snapshots, telemetry readings, alerts)
//! - The status engine, device registry, and alert pipeline
//! - Domain error types

pub mod models;
pub mod services;
