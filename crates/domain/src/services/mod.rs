//! Business logic services.

pub mod alert_bus;
pub mod alert_store;
pub mod pipeline;
pub mod registry;
pub mod status;
