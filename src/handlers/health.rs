use crate::handlers::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: String,
    pub timestamp: String,
    pub uptime_secs: u64,
    pub details: HealthDetails,
    pub response_time_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthDetails {
    pub database: ComponentHealth,
    /// Absent when no cache is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<ComponentHealth>,
}

static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Call once at startup so uptime is measured from boot
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

fn uptime_secs() -> u64 {
    START_TIME.get().map(|t| t.elapsed().as_secs()).unwrap_or(0)
}

fn component(result: Result<(), String>, latency_ms: u64) -> ComponentHealth {
    match result {
        Ok(()) => ComponentHealth {
            status: ComponentStatus::Up,
            message: "Connection successful".to_string(),
            latency_ms: Some(latency_ms),
        },
        Err(e) => ComponentHealth {
            status: ComponentStatus::Down,
            message: format!("Connection failed: {}", e),
            latency_ms: Some(latency_ms),
        },
    }
}

/// The database is critical, the cache is not
fn overall_status(details: &HealthDetails) -> ComponentStatus {
    let cache_up = details
        .redis
        .as_ref()
        .map_or(true, |r| r.status == ComponentStatus::Up);
    match (details.database.status == ComponentStatus::Up, cache_up) {
        (true, true) => ComponentStatus::Up,
        (true, false) => ComponentStatus::Degraded,
        (false, _) => ComponentStatus::Down,
    }
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Process is running")),
    tag = "Health"
)]
pub async fn liveness_check() -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Database and cache status
#[utoipa::path(
    get,
    path = "/health/detailed",
    responses(
        (status = 200, description = "Up or degraded"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "Health"
)]
pub async fn detailed_health_check(State(state): State<AppState>) -> impl IntoResponse {
    let start = Instant::now();

    let db_start = Instant::now();
    let db_result = crate::db::check_connection(&state.db)
        .await
        .map_err(|e| e.to_string());
    let database = component(db_result, db_start.elapsed().as_millis() as u64);

    let redis = match &state.redis {
        Some(client) => {
            let redis_start = Instant::now();
            let result = check_redis_connection(client).await;
            Some(component(result, redis_start.elapsed().as_millis() as u64))
        }
        None => None,
    };

    let details = HealthDetails { database, redis };
    let status = overall_status(&details);
    let status_code = match status {
        ComponentStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    let response = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: uptime_secs(),
        details,
        response_time_ms: start.elapsed().as_millis(),
    };

    (status_code, Json(response))
}

async fn check_redis_connection(client: &redis::Client) -> Result<(), String> {
    let mut conn = client
        .get_async_connection()
        .await
        .map_err(|e| format!("Failed to connect: {}", e))?;

    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .map_err(|e| format!("Ping failed: {}", e))?;

    Ok(())
}

/// - GET /health          liveness
/// - GET /health/detailed database and cache status
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(liveness_check))
        .route("/detailed", get(detailed_health_check))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_outage_only_degrades() {
        let details = HealthDetails {
            database: component(Ok(()), 1),
            redis: Some(component(Err("refused".into()), 1)),
        };
        assert_eq!(overall_status(&details), ComponentStatus::Degraded);

        let details = HealthDetails {
            database: component(Err("refused".into()), 1),
            redis: None,
        };
        assert_eq!(overall_status(&details), ComponentStatus::Down);
    }
}
