//! Database entity definitions (row mappings).

pub mod alert;

pub use alert::AlertEntity;
