use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;

use crate::core::error::KioskError;
use crate::core::state::AppState;
use crate::models::kiosk::{PresenceResponse, PresentUser};
use crate::models::LocationId;
use crate::stores::repository::Repository;

/// Users currently in the lab, split into students and staff
///
/// GET /presence/{location_id}
pub async fn presence_handler(
    State(state): State<Arc<AppState>>,
    Path(location_id): Path<LocationId>,
) -> Result<Response, KioskError> {
    if state.store.location(location_id).is_none() {
        return Err(KioskError::NotFound(format!("Location {}", location_id)));
    }

    let (mut staff, students): (Vec<PresentUser>, Vec<PresentUser>) = state
        .store
        .present_at(location_id)
        .into_iter()
        .map(|(user, access)| {
            let user_type = user.type_id.and_then(|id| state.store.user_type(id));
            PresentUser {
                sid: user.sid,
                name: user.name,
                level: user_type.as_ref().map_or(0, |t| t.level),
                type_name: user_type.map(|t| t.name),
                since: access.time_in,
            }
        })
        .partition(|user| user.level > 0);

    // Stable, so equal levels stay in check-in order
    staff.sort_by(|a, b| b.level.cmp(&a.level));

    Ok((
        StatusCode::OK,
        Json(PresenceResponse {
            location_id,
            students,
            staff,
        }),
    )
        .into_response())
}
