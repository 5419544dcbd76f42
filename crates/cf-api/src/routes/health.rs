//! Health check endpoint.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};

use crate::dto::{Envelope, HealthData};
use crate::state::AppState;

/// Creates health routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

/// Service health, including a database ping.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthData),
        (status = 503, description = "Database unreachable")
    ),
    tag = "Health"
)]
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Envelope<HealthData>>) {
    let database = state.db.is_healthy().await;

    let (code, status) = if database {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(Envelope::success(
            "ok",
            HealthData {
                status: status.to_string(),
                database,
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        )),
    )
}
