//! Idle-device sweep background job.

use std::sync::Arc;
use std::time::Duration;

use domain::services::pipeline::AlertPipeline;

use super::scheduler::Job;

/// Shortest allowed sweep interval. Anything tighter just burns the
/// registry lock for no additional detection value.
const MIN_INTERVAL_SECS: u64 = 10;

/// Background job that flags silent devices as disconnected.
///
/// Detection and alerting live in [`AlertPipeline::sweep_idle`]; this
/// type only supplies the schedule.
pub struct IdleSweepJob {
    pipeline: Arc<AlertPipeline>,
    interval: Duration,
}

impl IdleSweepJob {
    /// Create a sweep job running every `interval_secs`, clamped to the
    /// 10 s floor.
    pub fn new(pipeline: Arc<AlertPipeline>, interval_secs: u64) -> Self {
        Self {
            pipeline,
            interval: Duration::from_secs(interval_secs.max(MIN_INTERVAL_SECS)),
        }
    }
}

#[async_trait::async_trait]
impl Job for IdleSweepJob {
    fn name(&self) -> &'static str {
        "idle_sweep"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> Result<(), String> {
        // A registry outage is already logged inside the sweep and
        // surfaces as zero transitions; not a job failure.
        self.pipeline.sweep_idle().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::services::alert_bus::AlertBus;
    use domain::services::alert_store::InMemoryAlertStore;
    use domain::services::pipeline::PipelineSettings;
    use domain::services::registry::InMemoryRegistry;
    use domain::services::status::{LivenessSignal, StatusEngine};

    fn pipeline() -> Arc<AlertPipeline> {
        Arc::new(AlertPipeline::new(
            Arc::new(InMemoryRegistry::new()),
            Arc::new(InMemoryAlertStore::new()),
            AlertBus::default(),
            StatusEngine::new(LivenessSignal::Power, 40.0),
            PipelineSettings::default(),
        ))
    }

    #[test]
    fn test_interval_clamped_to_floor() {
        let job = IdleSweepJob::new(pipeline(), 1);
        assert_eq!(job.interval(), Duration::from_secs(10));

        let job = IdleSweepJob::new(pipeline(), 60);
        assert_eq!(job.interval(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_execute_with_empty_registry_succeeds() {
        let job = IdleSweepJob::new(pipeline(), 60);
        assert!(job.execute().await.is_ok());
    }
}
