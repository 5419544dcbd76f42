//! API routes.

pub mod alerts;
pub mod comments;
pub mod health;
pub mod tasks;

use axum::Router;

use crate::error::ApiError;
use crate::state::AppState;
use cf_core::db::{create_user_repository, SYSTEM_USER_LOGIN};
use cf_core::models::User;

/// Creates the main API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/alerts", alerts::routes())
        .nest("/cases/:case_id/tasks", tasks::routes())
        .nest("/manage", tasks::manage_routes())
        .merge(health::routes())
        .with_state(state)
}

/// Resolves the user a request acts as.
///
/// With no explicit id the seeded system user is used; requests do not
/// carry authentication.
pub(crate) async fn acting_user(
    state: &AppState,
    user_id: Option<i64>,
) -> Result<User, ApiError> {
    let users = create_user_repository(&state.db);

    match user_id {
        Some(id) => users
            .get(id)
            .await?
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown user id {}", id))),
        None => users
            .get_by_login(SYSTEM_USER_LOGIN)
            .await?
            .ok_or_else(|| {
                ApiError::Internal(format!("System user '{}' is not seeded", SYSTEM_USER_LOGIN))
            }),
    }
}
