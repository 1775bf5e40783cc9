//! Telemetry ingestion endpoint.
//!
//! Stands in for the broker transport: an ingestion client posts one
//! validated reading at a time and the pipeline takes it from there.

use axum::{extract::State, Json};
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::alert::StatusDecision;
use domain::models::device::TelemetryReading;
use domain::services::pipeline::TelemetryOutcome;

/// What the pipeline did with the reading.
#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub outcome: &'static str,
    #[serde(flatten)]
    pub status: Option<StatusDecision>,
}

/// Ingest one telemetry reading.
///
/// POST /api/v1/telemetry
///
/// A reading for an address the catalog never registered is discarded,
/// not an error; the unit may simply not be provisioned yet.
pub async fn ingest_reading(
    State(state): State<AppState>,
    Json(reading): Json<TelemetryReading>,
) -> Result<Json<IngestResponse>, ApiError> {
    reading.validate()?;

    match state.pipeline.on_telemetry(&reading).await {
        TelemetryOutcome::Evaluated(decision) => Ok(Json(IngestResponse {
            outcome: "evaluated",
            status: Some(decision),
        })),
        TelemetryOutcome::UnknownDevice => Ok(Json(IngestResponse {
            outcome: "discarded",
            status: None,
        })),
        TelemetryOutcome::Skipped => Err(ApiError::ServiceUnavailable(
            "Device registry unavailable".into(),
        )),
    }
}
