//! Device endpoint handlers.
//!
//! The catalog collaborator pushes device records here; dashboards read
//! the live snapshots back. Tenant clients only ever see their own
//! devices; cross-tenant lookups answer as if the device did not exist.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use domain::models::device::{CatalogDevice, DeviceSnapshot};
use shared::jwt::{ClientIdentity, TenantScope};

/// Response for device listing.
#[derive(Debug, serde::Serialize)]
pub struct ListDevicesResponse {
    pub devices: Vec<DeviceSnapshot>,
}

fn visible_to(identity: &ClientIdentity, tenant_id: Uuid) -> bool {
    match identity.scope {
        TenantScope::Tenant(own) => own == tenant_id,
        TenantScope::Superuser => true,
    }
}

/// Register a device or update its control fields.
///
/// PUT /api/v1/devices
pub async fn upsert_device(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    Json(device): Json<CatalogDevice>,
) -> Result<StatusCode, ApiError> {
    device.validate()?;
    if !visible_to(&identity, device.tenant_id) {
        return Err(ApiError::Forbidden(
            "Cannot register devices for another tenant".into(),
        ));
    }

    state.registry.upsert_from_catalog(&device).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Remove a device from the registry.
///
/// DELETE /api/v1/devices/:id  (catalog device id)
pub async fn delete_device(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    Path(device_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let snapshot = state.registry.get_by_id(device_id).await?;
    if !visible_to(&identity, snapshot.tenant_id) {
        return Err(ApiError::NotFound("Device not found".into()));
    }

    state.registry.remove(device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current snapshot of one device.
///
/// GET /api/v1/devices/:id  (hardware address)
pub async fn get_device(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
    Path(address): Path<String>,
) -> Result<Json<DeviceSnapshot>, ApiError> {
    let snapshot = state.registry.get(&address).await?;
    if !visible_to(&identity, snapshot.tenant_id) {
        return Err(ApiError::NotFound("Device not found".into()));
    }
    Ok(Json(snapshot))
}

/// All device snapshots visible to the caller.
///
/// GET /api/v1/devices
pub async fn list_devices(
    State(state): State<AppState>,
    Extension(identity): Extension<ClientIdentity>,
) -> Result<Json<ListDevicesResponse>, ApiError> {
    let devices = state
        .registry
        .list_all()
        .await?
        .into_iter()
        .filter(|snapshot| visible_to(&identity, snapshot.tenant_id))
        .collect();
    Ok(Json(ListDevicesResponse { devices }))
}
