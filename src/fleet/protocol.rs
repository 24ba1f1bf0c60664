//! Control Plane Protocol
//!
//! DTOs exchanged with the user-facing control surface.

use crate::coordinator::CooldownPhase;
use crate::coordinator::types::{FleetSnapshot, WorkerRecord};
use crate::events::StatusEvent;

use serde::{Deserialize, Serialize};

pub const ENDPOINT_FLEET_START: &str = "/fleet/start";
pub const ENDPOINT_FLEET_STOP: &str = "/fleet/stop";
pub const ENDPOINT_FLEET_RESUME: &str = "/fleet/resume";
pub const ENDPOINT_FLEET_STATUS: &str = "/fleet/status";

#[derive(Debug, Serialize, Deserialize)]
pub struct StartFleetRequest {
    pub worker_count: usize,
    #[serde(default = "default_start_id")]
    pub start_id: u64,
    pub max_id: Option<u64>,
}

fn default_start_id() -> u64 {
    1
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartFleetResponse {
    pub workers: Vec<WorkerRecord>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FleetStatusResponse {
    pub snapshot: Option<FleetSnapshot>,
    pub cooldown: CooldownPhase,
    pub events: Vec<StatusEvent>,
}
