use serde::Serialize;
use utoipa::ToSchema;

/// Storage-driven service status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// The durable store is reachable.
    Ok,
    /// The store is down; live sessions keep working from memory.
    Degraded,
}

/// Body of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Sessions currently resident in the registry.
    pub active_sessions: usize,
}

impl HealthResponse {
    /// Build the response from the degraded flag and the resident session count.
    pub fn new(degraded: bool, active_sessions: usize) -> Self {
        let status = if degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Ok
        };
        Self {
            status,
            active_sessions,
        }
    }
}
