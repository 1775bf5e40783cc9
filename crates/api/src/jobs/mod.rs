pub mod idle_sweep;
pub mod scheduler;

pub use idle_sweep::IdleSweepJob;
pub use scheduler::{Job, JobScheduler};
