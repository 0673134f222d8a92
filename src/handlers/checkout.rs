use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::debug;

use crate::checkin::resolver::checkout;
use crate::core::error::KioskError;
use crate::core::state::AppState;
use crate::models::kiosk::{CheckoutQuery, SuccessResponse};
use crate::models::user::UserKey;
use crate::models::LocationId;
use crate::utils::time::now_millis;

/// Manual checkout button on the presence board
///
/// POST /checkout_button/{location_id}?sid=<sid>
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    Path(location_id): Path<LocationId>,
    Query(params): Query<CheckoutQuery>,
) -> Result<Response, KioskError> {
    let key = UserKey::new(params.sid, location_id);
    let closed = checkout(state.store.as_ref(), key, now_millis())?;

    if closed.is_none() {
        debug!(sid = params.sid, location_id, "Checkout pressed for user not checked in");
    }

    Ok((
        StatusCode::OK,
        Json(SuccessResponse::new("You have checked out.").with_next("/success/checkout")),
    )
        .into_response())
}
