//! Health check endpoint.

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::HttpState;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub connections: ConnectionCounts,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCounts {
    pub earth: usize,
    pub mars: usize,
}

pub fn health_check(start_time: Instant, connections: ConnectionCounts) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
    }
}

/// `GET /health`
pub async fn health(State(state): State<HttpState>) -> Json<HealthResponse> {
    let counts = ConnectionCounts {
        earth: state.earth.len(),
        mars: state.mars.len(),
    };
    Json(health_check(state.start_time, counts))
}
