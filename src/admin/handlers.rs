use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::load_balancer::Backend;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub listen_port: String,
    pub backends: usize,
    pub cursor: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendStatus {
    pub index: usize,
    pub address: String,
    pub alive: bool,
}

impl BackendStatus {
    fn of(index: usize, backend: &dyn Backend) -> Self {
        Self {
            index,
            address: backend.address().to_string(),
            alive: backend.is_alive(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LivenessUpdate {
    pub alive: bool,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        listen_port: state.balancer.listen_port().to_string(),
        backends: state.balancer.backends().len(),
        cursor: state.balancer.cursor(),
    })
}

pub async fn get_backends(State(state): State<AppState>) -> Json<Vec<BackendStatus>> {
    let statuses = state
        .balancer
        .backends()
        .iter()
        .enumerate()
        .map(|(i, b)| BackendStatus::of(i, b.as_ref()))
        .collect();
    Json(statuses)
}

/// Flip a backend's liveness on behalf of an external health checker.
pub async fn set_liveness(
    State(state): State<AppState>,
    Path(index): Path<usize>,
    Json(update): Json<LivenessUpdate>,
) -> Result<Json<BackendStatus>, (StatusCode, &'static str)> {
    let backend = state
        .balancer
        .backends()
        .get(index)
        .ok_or((StatusCode::NOT_FOUND, "No backend at that index"))?;

    let control = backend.liveness().ok_or((
        StatusCode::CONFLICT,
        "Backend does not accept liveness updates",
    ))?;
    control.set_alive(update.alive);

    tracing::info!(
        index,
        backend = %backend.address(),
        alive = update.alive,
        "Liveness updated via admin API"
    );
    Ok(Json(BackendStatus::of(index, backend.as_ref())))
}
