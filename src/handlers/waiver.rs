use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::checkin::resolver::sign_waiver;
use crate::core::error::KioskError;
use crate::core::state::AppState;
use crate::models::kiosk::{ScanResponse, SuccessResponse, WaiverRequest};
use crate::models::user::UserKey;
use crate::utils::time::now_millis;

/// Accept or decline the waiver. Accepting checks the user in.
///
/// Only answers a waiver that a card tap or registration asked for, within
/// the waiver window.
///
/// POST /waiver  {sid, location_id, agreed}
pub async fn waiver_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WaiverRequest>,
) -> Result<Response, KioskError> {
    let key = UserKey::new(request.sid, request.location_id);
    let now = now_millis();

    if !state.waivers.take(key, now) {
        warn!(sid = request.sid, location_id = request.location_id, "Waiver answer without a pending waiver");
        return Err(KioskError::WaiverNotPending);
    }

    if !request.agreed {
        info!(sid = request.sid, location_id = request.location_id, "Waiver declined");
        return Ok((
            StatusCode::OK,
            Json(SuccessResponse::new("Waiver declined.").with_next("/")),
        )
            .into_response());
    }

    let outcome = sign_waiver(state.store.as_ref(), key, now)?;

    Ok((StatusCode::OK, Json(ScanResponse::new(outcome))).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{add_user, body_json, create_test_state, LOCATION};
    use crate::stores::repository::Repository;

    fn request(sid: i64, agreed: bool) -> Json<WaiverRequest> {
        Json(WaiverRequest {
            sid,
            location_id: LOCATION,
            agreed,
        })
    }

    fn sent_to_waiver(state: &AppState, sid: i64) {
        state.waivers.mark(UserKey::new(sid, LOCATION), now_millis());
    }

    #[tokio::test]
    async fn test_accepting_waiver_checks_in() {
        let state = create_test_state();
        let user = add_user(&state, 20123456, 0, false, None);
        sent_to_waiver(&state, user.sid);

        let response = waiver_handler(State(state.clone()), request(user.sid, true))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["outcome"], "checked_in");
        assert_eq!(json["next"], "/success/checkin");

        let key = UserKey::new(user.sid, LOCATION);
        assert!(state.store.user(key).unwrap().has_signed_waiver());
        assert!(state.store.open_access(key).is_some());
    }

    #[tokio::test]
    async fn test_declining_waiver_changes_nothing() {
        let state = create_test_state();
        let user = add_user(&state, 20123456, 0, false, None);
        sent_to_waiver(&state, user.sid);

        let response = waiver_handler(State(state.clone()), request(user.sid, false))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["next"], "/");

        let key = UserKey::new(user.sid, LOCATION);
        assert!(!state.store.user(key).unwrap().has_signed_waiver());
        assert!(state.store.open_access(key).is_none());
    }

    #[tokio::test]
    async fn test_waiver_requires_pending_request() {
        let state = create_test_state();
        let user = add_user(&state, 20123456, 0, false, None);
        let key = UserKey::new(user.sid, LOCATION);

        let result = waiver_handler(State(state.clone()), request(user.sid, true)).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::FORBIDDEN);
        assert!(!state.store.user(key).unwrap().has_signed_waiver());
        assert!(state.store.open_access(key).is_none());
    }

    #[tokio::test]
    async fn test_pending_waiver_is_single_use() {
        let state = create_test_state();
        let user = add_user(&state, 20123456, 0, false, None);
        sent_to_waiver(&state, user.sid);

        waiver_handler(State(state.clone()), request(user.sid, false))
            .await
            .unwrap();
        let result = waiver_handler(State(state.clone()), request(user.sid, true)).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_waiver_for_unknown_user() {
        let state = create_test_state();
        sent_to_waiver(&state, 20999999);

        let result = waiver_handler(State(state), request(20999999, true)).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::NOT_FOUND);
    }
}
