//! `/healthz` liveness and `/readyz` readiness.

use serde::{Deserialize, Serialize};

/// Liveness response body. Serializes to exactly `{"status":"ok"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests.
    pub status: String,
}

/// Liveness: the process is up and serving.
pub fn health_check() -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
    }
}

/// Readiness response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// `"ready"` or `"shutting_down"`.
    pub status: String,
}

impl ReadinessResponse {
    /// Whether the server accepts new connections.
    pub fn is_ready(&self) -> bool {
        self.status == "ready"
    }
}

/// Readiness flips once shutdown has begun.
pub fn readiness(shutting_down: bool) -> ReadinessResponse {
    let status = if shutting_down { "shutting_down" } else { "ready" };
    ReadinessResponse {
        status: status.into(),
    }
}
