pub mod alerts;
pub mod devices;
pub mod health;
pub mod telemetry;
pub mod ws;
