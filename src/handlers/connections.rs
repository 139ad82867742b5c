//! Platform Connections API Handlers (spec §6).
//!
//! Listing and disconnecting a seller's linked platform accounts. Connection
//! creation/OAuth exchange is an external collaborator's responsibility; this
//! crate only manages the lifecycle of a connection row once it exists.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{AuthenticatedUser, PlatformConnectionResponse};
use crate::AppState;

/// `GET /platform-connections`: non-secret fields only.
pub async fn list_connections_handler(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<PlatformConnectionResponse>>> {
    let connections = state.store.list_connections(user.id).await?;
    Ok(Json(connections.into_iter().map(Into::into).collect()))
}

/// `DELETE /platform-connections/:id`: soft-disconnect, `204`.
pub async fn disconnect_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    let connection = state.store.get_connection(connection_id).await?;
    if connection.user_id != user.id {
        return Err(AppError::NotFound {
            resource: format!("platform_connection {}", connection_id),
        });
    }

    state.onboarding.disconnect(connection_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    // Handler wiring is covered by the crate's integration tests (tests/),
    // which exercise these routes against a real database and redis.
}
