use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::checkin::registration::{register, Registration};
use crate::checkin::resolver::Outcome;
use crate::core::error::KioskError;
use crate::core::state::AppState;
use crate::models::kiosk::{RegisterPrefill, RegisterQuery, RegisterRequest, RegisterResponse};
use crate::utils::time::now_millis;

/// Registration form data, prefilled from the directory when possible
///
/// GET /register?card_id=<card>
pub async fn register_form_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RegisterQuery>,
) -> impl IntoResponse {
    let mut prefill = RegisterPrefill {
        card_id: params.card_id,
        sid: None,
        name: String::new(),
    };

    if let Some(directory) = &state.directory {
        // A failed lookup only means the form starts empty
        match directory.lookup_card(params.card_id).await {
            Ok(Some(entry)) => {
                prefill.name = entry.full_name();
                prefill.sid = Some(entry.id);
            }
            Ok(None) => debug!(card = params.card_id, "Card not in directory"),
            Err(e) => warn!(card = params.card_id, error = %format!("{e:#}"), "Directory lookup failed"),
        }
    }

    (StatusCode::OK, Json(prefill))
}

/// Create the user and link the card, then continue to the waiver
///
/// POST /register  {sid, name, card_id, location_id}
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Response, KioskError> {
    let registration = Registration {
        sid: request.sid,
        name: request.name,
        card_number: request.card_id,
        location_id: request.location_id,
    };

    let user = register(&state.store, &registration, state.config.registration.min_sid)?;
    state.waivers.mark(user.key(), now_millis());

    Ok((
        StatusCode::OK,
        Json(RegisterResponse {
            success: true,
            sid: user.sid,
            name: user.name,
            next: Outcome::NeedsWaiver { user_id: user.sid }.next_path(),
        }),
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{body_json, create_test_state, LOCATION};
    use crate::models::user::UserKey;
    use crate::stores::repository::Repository;

    fn request(sid: i64, name: &str) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            sid,
            name: name.to_string(),
            card_id: 4242,
            location_id: LOCATION,
        })
    }

    #[tokio::test]
    async fn test_register_form_without_directory() {
        let state = create_test_state();

        let response = register_form_handler(State(state), Query(RegisterQuery { card_id: 4242 }))
            .await
            .into_response();
        let json = body_json(response).await;

        assert_eq!(json["card_id"], 4242);
        assert!(json["sid"].is_null());
        assert_eq!(json["name"], "");
    }

    #[tokio::test]
    async fn test_register_creates_user() {
        let state = create_test_state();

        let response = register_handler(State(state.clone()), request(20123456, "grace hopper"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["name"], "Grace Hopper");
        assert_eq!(json["next"], "/waiver?sid=20123456");

        let user = state.store.user(UserKey::new(20123456, LOCATION)).unwrap();
        assert!(user.waiver_signed.is_none());
        assert!(state.waivers.take(user.key(), now_millis()));
        assert_eq!(state.store.card(4242).unwrap().sid, Some(20123456));
    }

    #[tokio::test]
    async fn test_register_cannot_take_over_card_or_user() {
        let state = create_test_state();
        register_handler(State(state.clone()), request(20123456, "grace hopper"))
            .await
            .unwrap();

        // Another id with the same card
        let result = register_handler(State(state.clone()), request(20654321, "alan turing")).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.card(4242).unwrap().sid, Some(20123456));
        assert!(state.store.user(UserKey::new(20654321, LOCATION)).is_none());

        // The same id with a fresh card
        let mut again = request(20123456, "grace hopper");
        again.card_id = 9090;
        let result = register_handler(State(state.clone()), again).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::BAD_REQUEST);
        assert!(state.store.card(9090).is_none());
    }

    #[tokio::test]
    async fn test_register_validation_errors() {
        let state = create_test_state();

        let result = register_handler(State(state.clone()), request(1234, "Grace Hopper")).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::BAD_REQUEST);

        let result = register_handler(State(state.clone()), request(20123456, "")).await;
        assert_eq!(result.unwrap_err().into_response().status(), StatusCode::BAD_REQUEST);

        assert_eq!(state.store.user_count(), 0);
    }
}
