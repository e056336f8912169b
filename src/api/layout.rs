use crate::broker::{BrokerConfig, BrokerConfigStore};
use crate::layout::{Layout, MachinePlacement, MachineStatus, Zone, ZonePatch};
use crate::overlay::{LayoutError, LayoutStore, EXPORT_FILENAME};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Shared state for the layout API
#[derive(Clone)]
pub struct LayoutAppState {
    pub store: Arc<LayoutStore>,
    pub broker_configs: Arc<BrokerConfigStore>,
}

/// Zone entry of GET /api/zones
#[derive(Serialize, Deserialize)]
pub struct ZoneSummary {
    pub id: String,
    /// False for zones that come from the base layout
    pub removable: bool,
    #[serde(rename = "machineCount")]
    pub machine_count: usize,
}

/// Body of POST /api/zones/:zone/machines
#[derive(Deserialize)]
pub struct AddMachineRequest {
    pub id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub status: MachineStatus,
}

/// Body of PUT /api/zones/:zone/machines/:id/position
#[derive(Deserialize)]
pub struct PositionRequest {
    pub x: f64,
    pub y: f64,
}

/// Body of POST /api/machines/:id/move
#[derive(Deserialize)]
pub struct MoveRequest {
    #[serde(rename = "fromZone")]
    pub from_zone: String,
    #[serde(rename = "toZone")]
    pub to_zone: String,
    pub x: f64,
    pub y: f64,
}

/// Response of GET /api/machines/:id/zone
#[derive(Serialize, Deserialize)]
pub struct MachineZoneResponse {
    pub id: String,
    pub zone: String,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create layout API router
pub fn create_layout_router(state: LayoutAppState) -> Router {
    Router::new()
        .route("/api/layout", get(get_layout))
        .route("/api/layout/export", get(export_layout))
        .route("/api/zones", get(list_zones))
        .route(
            "/api/zones/:zone",
            get(get_zone).put(upsert_zone).delete(remove_zone),
        )
        .route("/api/zones/:zone/machines", post(add_machine))
        .route(
            "/api/zones/:zone/machines/:id",
            axum::routing::delete(remove_machine),
        )
        .route(
            "/api/zones/:zone/machines/:id/position",
            put(set_machine_position),
        )
        .route(
            "/api/zones/:zone/broker-config",
            get(get_broker_config).put(put_broker_config),
        )
        .route("/api/machines", get(list_machines))
        .route("/api/machines/:id/zone", get(find_machine_zone))
        .route("/api/machines/:id/move", post(move_machine))
        .with_state(Arc::new(state))
}

/// GET /api/layout - Effective layout
async fn get_layout(State(state): State<Arc<LayoutAppState>>) -> Json<Layout> {
    Json(state.store.effective_layout())
}

/// GET /api/layout/export - Effective layout as a downloadable file
async fn export_layout(
    State(state): State<Arc<LayoutAppState>>,
) -> Result<Response, LayoutApiError> {
    let json = state
        .store
        .export_effective_layout()
        .map_err(|e| LayoutApiError::Internal(format!("{:#}", e)))?;

    let disposition = format!("attachment; filename=\"{}\"", EXPORT_FILENAME);
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        json,
    )
        .into_response())
}

/// GET /api/zones - Zone keys in merge order
async fn list_zones(State(state): State<Arc<LayoutAppState>>) -> Json<Vec<ZoneSummary>> {
    let layout = state.store.effective_layout();
    let zones = layout
        .iter()
        .map(|(id, zone)| ZoneSummary {
            id: id.clone(),
            removable: state.store.is_removable_zone(id),
            machine_count: zone.machines.len(),
        })
        .collect();
    Json(zones)
}

/// GET /api/zones/:zone - One zone of the effective layout
async fn get_zone(
    State(state): State<Arc<LayoutAppState>>,
    Path(zone_id): Path<String>,
) -> Result<Json<Zone>, LayoutApiError> {
    Ok(Json(effective_zone(&state.store, &zone_id)?))
}

/// PUT /api/zones/:zone - Create or update an overlay zone
async fn upsert_zone(
    State(state): State<Arc<LayoutAppState>>,
    Path(zone_id): Path<String>,
    Json(patch): Json<ZonePatch>,
) -> Result<Json<Zone>, LayoutApiError> {
    state
        .store
        .upsert_zone(&zone_id, patch)
        .map_err(LayoutApiError::Layout)?;

    Ok(Json(effective_zone(&state.store, &zone_id)?))
}

/// DELETE /api/zones/:zone - Remove a zone created through the overlay
async fn remove_zone(
    State(state): State<Arc<LayoutAppState>>,
    Path(zone_id): Path<String>,
) -> Result<StatusCode, LayoutApiError> {
    if !state.store.is_removable_zone(&zone_id) {
        return Err(LayoutApiError::BaseZoneLocked(zone_id));
    }
    if !state.store.remove_zone(&zone_id) {
        return Err(LayoutApiError::ZoneNotFound(zone_id));
    }

    info!(zone = %zone_id, "Zone removed via API");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/zones/:zone/machines - Place a machine
async fn add_machine(
    State(state): State<Arc<LayoutAppState>>,
    Path(zone_id): Path<String>,
    Json(request): Json<AddMachineRequest>,
) -> Result<(StatusCode, Json<MachinePlacement>), LayoutApiError> {
    let machine_id = request.id.trim();
    if machine_id.is_empty() {
        return Err(LayoutApiError::InvalidRequest(
            "machine id must not be empty".to_string(),
        ));
    }

    let zone = effective_zone(&state.store, &zone_id)?;
    let position = zone.clamp_position(request.x, request.y);
    state
        .store
        .add_machine(&zone_id, machine_id, position, request.status);

    Ok((
        StatusCode::CREATED,
        Json(MachinePlacement {
            position,
            status: request.status,
        }),
    ))
}

/// PUT /api/zones/:zone/machines/:id/position - Reposition a machine
async fn set_machine_position(
    State(state): State<Arc<LayoutAppState>>,
    Path((zone_id, machine_id)): Path<(String, String)>,
    Json(request): Json<PositionRequest>,
) -> Result<Json<MachinePlacement>, LayoutApiError> {
    let zone = effective_zone(&state.store, &zone_id)?;
    let position = zone.clamp_position(request.x, request.y);
    state
        .store
        .set_machine_position(&zone_id, &machine_id, position);

    let zone = effective_zone(&state.store, &zone_id)?;
    zone.machines
        .get(&machine_id)
        .cloned()
        .map(Json)
        .ok_or(LayoutApiError::MachineNotFound(machine_id))
}

/// DELETE /api/zones/:zone/machines/:id - Remove an overlay machine
async fn remove_machine(
    State(state): State<Arc<LayoutAppState>>,
    Path((zone_id, machine_id)): Path<(String, String)>,
) -> Result<StatusCode, LayoutApiError> {
    if state.store.remove_machine(&zone_id, &machine_id) {
        return Ok(StatusCode::NO_CONTENT);
    }

    let zone = effective_zone(&state.store, &zone_id)?;
    if zone.machines.contains_key(&machine_id) {
        warn!(
            zone = %zone_id,
            machine_id = %machine_id,
            "Refused removal of base layout machine"
        );
        Err(LayoutApiError::BaseMachineLocked(machine_id))
    } else {
        Err(LayoutApiError::MachineNotFound(machine_id))
    }
}

/// POST /api/machines/:id/move - Move a machine to another zone
async fn move_machine(
    State(state): State<Arc<LayoutAppState>>,
    Path(machine_id): Path<String>,
    Json(request): Json<MoveRequest>,
) -> Result<Json<MachinePlacement>, LayoutApiError> {
    let target = effective_zone(&state.store, &request.to_zone)?;
    let position = target.clamp_position(request.x, request.y);

    state
        .store
        .move_machine_to_zone(&machine_id, &request.from_zone, &request.to_zone, position);

    Ok(Json(MachinePlacement {
        position,
        status: MachineStatus::Inactive,
    }))
}

/// GET /api/machines - All placed machine ids
async fn list_machines(State(state): State<Arc<LayoutAppState>>) -> Json<Vec<String>> {
    Json(state.store.list_machine_ids(None))
}

/// GET /api/machines/:id/zone - Zone a machine is placed in
async fn find_machine_zone(
    State(state): State<Arc<LayoutAppState>>,
    Path(machine_id): Path<String>,
) -> Result<Json<MachineZoneResponse>, LayoutApiError> {
    let zone = state
        .store
        .find_machine_zone(&machine_id)
        .ok_or_else(|| LayoutApiError::MachineNotFound(machine_id.clone()))?;

    Ok(Json(MachineZoneResponse {
        id: machine_id,
        zone,
    }))
}

/// GET /api/zones/:zone/broker-config - Broker settings for a zone
async fn get_broker_config(
    State(state): State<Arc<LayoutAppState>>,
    Path(zone_id): Path<String>,
) -> Json<BrokerConfig> {
    Json(state.broker_configs.config_for(Some(&zone_id)))
}

/// PUT /api/zones/:zone/broker-config - Replace broker settings for a zone
async fn put_broker_config(
    State(state): State<Arc<LayoutAppState>>,
    Path(zone_id): Path<String>,
    Json(config): Json<BrokerConfig>,
) -> Json<BrokerConfig> {
    // Kept in memory even if the write fails
    if let Err(e) = state
        .broker_configs
        .set_config(Some(&zone_id), config.clone())
    {
        warn!(zone = %zone_id, error = %e, "Broker settings not persisted");
    }
    Json(config)
}

fn effective_zone(store: &LayoutStore, zone_id: &str) -> Result<Zone, LayoutApiError> {
    store
        .effective_layout()
        .swap_remove(zone_id)
        .ok_or_else(|| LayoutApiError::ZoneNotFound(zone_id.to_string()))
}

/// Layout API error types
enum LayoutApiError {
    ZoneNotFound(String),
    MachineNotFound(String),
    BaseZoneLocked(String),
    BaseMachineLocked(String),
    InvalidRequest(String),
    Layout(LayoutError),
    Internal(String),
}

impl IntoResponse for LayoutApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            LayoutApiError::ZoneNotFound(zone) => {
                (StatusCode::NOT_FOUND, format!("Zone '{}' not found", zone))
            }
            LayoutApiError::MachineNotFound(id) => {
                (StatusCode::NOT_FOUND, format!("Machine '{}' not found", id))
            }
            LayoutApiError::BaseZoneLocked(zone) => (
                StatusCode::FORBIDDEN,
                format!("Zone '{}' comes from the base layout and can't be removed", zone),
            ),
            LayoutApiError::BaseMachineLocked(id) => (
                StatusCode::FORBIDDEN,
                format!(
                    "Machine '{}' comes from the base layout and can't be removed",
                    id
                ),
            ),
            LayoutApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            LayoutApiError::Layout(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            LayoutApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: error_message })).into_response()
    }
}
