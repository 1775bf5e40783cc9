//! Alert history endpoint.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::alert::AlertRecord;
use domain::services::alert_store::AlertQuery;
use shared::jwt::{ClientIdentity, TenantScope};

/// Query parameters for alert history.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAlertsQuery {
    /// Only meaningful for superusers; tenant clients are always
    /// scoped to their own tenant.
    pub tenant_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Response for alert history, newest first.
#[derive(Debug, serde::Serialize)]
pub struct ListAlertsResponse {
    pub alerts: Vec<AlertRecord>,
}

/// Alert history, optionally bounded by time.
///
/// GET /api/v1/alerts?tenantId=&from=&to=
pub async fn list_alerts(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    Query(query): Query<ListAlertsQuery>,
) -> Result<Json<ListAlertsResponse>, ApiError> {
    let tenant_id = match identity.scope {
        TenantScope::Tenant(own) => {
            if query.tenant_id.is_some_and(|requested| requested != own) {
                return Err(ApiError::Forbidden(
                    "Cannot query another tenant's alerts".into(),
                ));
            }
            Some(own)
        }
        TenantScope::Superuser => query.tenant_id,
    };

    let alerts = state
        .store
        .query(AlertQuery {
            tenant_id,
            from: query.from,
            to: query.to,
        })
        .await?;
    Ok(Json(ListAlertsResponse { alerts }))
}
