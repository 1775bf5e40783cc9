pub mod auth;
pub mod logging;
pub mod metrics;

pub use auth::require_auth;
pub use logging::init_logging;
pub use metrics::{init_metrics, metrics_handler, metrics_middleware};
