use super::protocol::*;
use super::runner::Fleet;
use crate::coordinator::types::ItemId;

use axum::{
    Extension, Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

/// HTTP router exposing the control plane of `fleet`.
pub fn control_plane(fleet: Arc<Fleet>) -> Router {
    Router::new()
        .route(ENDPOINT_FLEET_START, post(handle_start_fleet))
        .route(ENDPOINT_FLEET_STOP, post(handle_stop_fleet))
        .route(ENDPOINT_FLEET_RESUME, post(handle_resume_fleet))
        .route(ENDPOINT_FLEET_STATUS, get(handle_fleet_status))
        .layer(Extension(fleet))
}

pub async fn handle_start_fleet(
    Extension(fleet): Extension<Arc<Fleet>>,
    Json(req): Json<StartFleetRequest>,
) -> (StatusCode, Json<StartFleetResponse>) {
    match fleet
        .start(req.worker_count, ItemId(req.start_id), req.max_id.map(ItemId))
        .await
    {
        Ok(workers) => {
            tracing::info!("Fleet of {} started from the control plane", workers.len());
            (
                StatusCode::OK,
                Json(StartFleetResponse {
                    workers,
                    error: None,
                }),
            )
        }
        Err(e) => {
            tracing::error!("Failed to start fleet: {}", e);
            (
                StatusCode::BAD_REQUEST,
                Json(StartFleetResponse {
                    workers: Vec::new(),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn handle_stop_fleet(
    Extension(fleet): Extension<Arc<Fleet>>,
) -> (StatusCode, Json<AckResponse>) {
    acknowledge(fleet.stop().await)
}

pub async fn handle_resume_fleet(
    Extension(fleet): Extension<Arc<Fleet>>,
) -> (StatusCode, Json<AckResponse>) {
    acknowledge(fleet.resume().await)
}

pub async fn handle_fleet_status(
    Extension(fleet): Extension<Arc<Fleet>>,
) -> (StatusCode, Json<FleetStatusResponse>) {
    let coordinator = fleet.coordinator();
    let snapshot = match fleet.snapshot().await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::error!("Failed to read fleet state: {}", e);
            None
        }
    };

    let status = if snapshot.is_some() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    (
        status,
        Json(FleetStatusResponse {
            snapshot,
            cooldown: coordinator.cooldown_phase(),
            events: coordinator.events().recent(),
        }),
    )
}

fn acknowledge(result: anyhow::Result<()>) -> (StatusCode, Json<AckResponse>) {
    match result {
        Ok(()) => (
            StatusCode::OK,
            Json(AckResponse {
                ok: true,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Control request failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AckResponse {
                    ok: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
