//! Domain models.

pub mod alert;
pub mod device;
