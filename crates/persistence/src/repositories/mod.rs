//! Repository implementations.

pub mod alert;

pub use alert::AlertRepository;
